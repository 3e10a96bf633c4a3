//! Advisory anti-tamper check for the selected catalog id.
//!
//! `Idle -> Checking -> {Protected | Clear | Exhausted}`. Any change of catalog id
//! resets the attempt budget: a non-empty id is `Checking` as soon as it is set,
//! a cleared id is `Idle`. Failed probes are re-issued right away until three
//! attempts have been spent.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::CatalogId;
use crate::backend::{Backend, DrmNoticeLookup};
use crate::error::Result;
use crate::retry::RetryBudget;

pub const MAX_PROBE_ATTEMPTS: u8 = 3;

/// Case-insensitive substring that marks a probe response as protected.
pub const PROTECTION_MARKER: &str = "denuvo";

pub const PROTECTED_MESSAGE: &str = "This game contains Denuvo Anti-Tamper, you'll have to first manually crack the game's executable and afterwards use the program, otherwise the game won't work.";
pub const CLEAR_MESSAGE: &str = "No DRM detected.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProtectionStatus {
    #[default]
    Idle,
    Checking,
    Protected,
    Clear,
    Exhausted,
}

impl ProtectionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Protected | Self::Clear | Self::Exhausted)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionState {
    pub catalog_id: CatalogId,
    pub attempts: u8,
    pub status: ProtectionStatus,
    pub message: String,
}

pub fn has_protection_marker(text: &str) -> bool {
    text.to_lowercase().contains(PROTECTION_MARKER)
}

struct ProbeInner {
    catalog_id: CatalogId,
    generation: u64,
    budget: RetryBudget,
    status: ProtectionStatus,
    message: String,
    task: Option<JoinHandle<()>>,
}

impl ProbeInner {
    fn snapshot(&self) -> ProtectionState {
        ProtectionState {
            catalog_id: self.catalog_id.clone(),
            attempts: self.budget.attempts(),
            status: self.status,
            message: self.message.clone(),
        }
    }

    /// Claims the next attempt for `generation`. Refuses while another attempt is
    /// outstanding, after a terminal state, or once the budget is spent.
    fn begin_attempt(&mut self, generation: u64) -> Option<(CatalogId, u8)> {
        if self.generation != generation || self.status != ProtectionStatus::Idle {
            return None;
        }
        match self.budget.begin() {
            Some(attempt) => {
                self.status = ProtectionStatus::Checking;
                Some((self.catalog_id.clone(), attempt))
            }
            None => {
                self.status = ProtectionStatus::Exhausted;
                None
            }
        }
    }

    fn record_failure(&mut self, attempt: u8) {
        self.message = format!("check failed, attempt {} of {}", attempt, self.budget.max());
        self.status = if self.budget.is_exhausted() {
            ProtectionStatus::Exhausted
        } else {
            ProtectionStatus::Idle
        };
    }
}

struct Shared {
    inner: Mutex<ProbeInner>,
    updates: watch::Sender<ProtectionState>,
}

impl Shared {
    fn update<R>(&self, f: impl FnOnce(&mut ProbeInner) -> R) -> R {
        let mut inner = self.inner.lock();
        let out = f(&mut inner);
        self.updates.send_replace(inner.snapshot());
        out
    }
}

pub struct ProtectionProbe {
    backend: Arc<dyn Backend>,
    fallback: Option<Arc<dyn DrmNoticeLookup>>,
    shared: Arc<Shared>,
}

impl ProtectionProbe {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let inner = ProbeInner {
            catalog_id: CatalogId::default(),
            generation: 0,
            budget: RetryBudget::new(MAX_PROBE_ATTEMPTS),
            status: ProtectionStatus::Idle,
            message: String::new(),
            task: None,
        };
        let (updates, _) = watch::channel(inner.snapshot());
        Self {
            backend,
            fallback: None,
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                updates,
            }),
        }
    }

    /// Consults `lookup` when the primary probe reports no marker.
    pub fn with_fallback(mut self, lookup: Arc<dyn DrmNoticeLookup>) -> Self {
        self.fallback = Some(lookup);
        self
    }

    /// Records the current catalog id. A changed id resets the probe and, when
    /// non-empty, moves it straight to `Checking`. An unchanged id never re-probes.
    pub fn set_catalog_id(&self, catalog_id: &CatalogId) {
        let first = self.shared.update(|inner| {
            if inner.catalog_id == *catalog_id {
                return None;
            }
            if let Some(task) = inner.task.take() {
                task.abort();
            }
            inner.generation += 1;
            inner.catalog_id = catalog_id.clone();
            inner.budget.reset();
            inner.status = ProtectionStatus::Idle;
            inner.message.clear();
            if catalog_id.is_empty() {
                return None;
            }
            let generation = inner.generation;
            inner.begin_attempt(generation).map(|claim| (generation, claim))
        });

        let Some((generation, claim)) = first else {
            return;
        };

        let task = tokio::spawn(run_probe(
            Arc::clone(&self.shared),
            Arc::clone(&self.backend),
            self.fallback.clone(),
            generation,
            claim,
        ));

        let mut inner = self.shared.inner.lock();
        if inner.generation == generation {
            inner.task = Some(task);
        } else {
            task.abort();
        }
    }

    pub fn state(&self) -> ProtectionState {
        self.shared.updates.borrow().clone()
    }

    pub fn is_checking(&self) -> bool {
        self.shared.inner.lock().status == ProtectionStatus::Checking
    }

    pub fn changes(&self) -> watch::Receiver<ProtectionState> {
        self.shared.updates.subscribe()
    }

    /// Aborts any outstanding probe. The state stays as last published.
    pub fn shutdown(&self) {
        if let Some(task) = self.shared.inner.lock().task.take() {
            task.abort();
        }
    }
}

impl Drop for ProtectionProbe {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_probe(
    shared: Arc<Shared>,
    backend: Arc<dyn Backend>,
    fallback: Option<Arc<dyn DrmNoticeLookup>>,
    generation: u64,
    first: (CatalogId, u8),
) {
    let mut next = Some(first);

    while let Some((catalog_id, attempt)) = next.take() {
        tracing::debug!(%catalog_id, attempt, "protection probe");
        let outcome = probe_once(backend.as_ref(), fallback.as_deref(), &catalog_id).await;

        next = shared.update(|inner| {
            if inner.generation != generation {
                return None;
            }
            match outcome {
                Ok(true) => {
                    tracing::info!(%catalog_id, "protection marker found");
                    inner.status = ProtectionStatus::Protected;
                    inner.message = PROTECTED_MESSAGE.to_string();
                    None
                }
                Ok(false) => {
                    tracing::info!(%catalog_id, "no protection marker");
                    inner.status = ProtectionStatus::Clear;
                    inner.message = CLEAR_MESSAGE.to_string();
                    None
                }
                Err(e) => {
                    tracing::warn!(%catalog_id, attempt, error = %e, "protection probe failed");
                    inner.record_failure(attempt);
                    inner.begin_attempt(generation)
                }
            }
        });
    }
}

async fn probe_once(
    backend: &dyn Backend,
    fallback: Option<&dyn DrmNoticeLookup>,
    catalog_id: &CatalogId,
) -> Result<bool> {
    let status = backend.probe_protection(catalog_id).await?;
    if has_protection_marker(&status) {
        return Ok(true);
    }
    let Some(lookup) = fallback else {
        return Ok(false);
    };
    let notice = lookup.drm_notice(catalog_id).await?;
    Ok(notice.as_deref().is_some_and(has_protection_marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inner(id: &str) -> ProbeInner {
        ProbeInner {
            catalog_id: CatalogId::new(id),
            generation: 1,
            budget: RetryBudget::new(MAX_PROBE_ATTEMPTS),
            status: ProtectionStatus::Idle,
            message: String::new(),
            task: None,
        }
    }

    #[test]
    fn marker_match_ignores_case() {
        assert!(has_protection_marker("Protected by Denuvo Anti-Tamper"));
        assert!(has_protection_marker("DENUVO"));
        assert!(!has_protection_marker("No DRM notice listed"));
    }

    #[test]
    fn attempt_cannot_begin_while_checking() {
        let mut probe = inner("1030300");
        assert_eq!(probe.begin_attempt(1), Some((CatalogId::new("1030300"), 1)));
        assert_eq!(probe.begin_attempt(1), None);
        assert_eq!(probe.budget.attempts(), 1);
    }

    #[test]
    fn stale_generation_is_refused() {
        let mut probe = inner("1030300");
        assert_eq!(probe.begin_attempt(0), None);
        assert_eq!(probe.status, ProtectionStatus::Idle);
    }

    #[test]
    fn third_failure_exhausts() {
        let mut probe = inner("1030300");
        for n in 1..=3 {
            let (_, attempt) = probe.begin_attempt(1).unwrap();
            assert_eq!(attempt, n);
            probe.record_failure(attempt);
        }
        assert_eq!(probe.status, ProtectionStatus::Exhausted);
        assert_eq!(probe.message, "check failed, attempt 3 of 3");
        assert_eq!(probe.begin_attempt(1), None);
        assert_eq!(probe.budget.attempts(), 3);
    }
}
