//! Debounced title lookup with a direct numeric-entry shortcut.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::api::{CatalogEntry, CatalogId, SEARCH_LIMIT};
use crate::backend::Backend;
use crate::timer::TimerSlot;

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lookup {
    Idle,
    InFlight(String),
}

/// Observable resolver state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSnapshot {
    pub query: String,
    pub results: Vec<CatalogEntry>,
    /// The query `results` were found for; may lag behind `query` while a newer edit is pending.
    pub results_for: Option<String>,
    /// Set when the query is a bare numeric id: offer "use this ID" instead of results.
    pub direct: Option<CatalogId>,
    pub last_resolved: Option<String>,
    pub in_flight: Option<String>,
    /// Count of lookups that have settled, successfully or not.
    pub completed_lookups: u64,
}

struct ResolverState {
    query: String,
    last_resolved: Option<String>,
    results: Vec<CatalogEntry>,
    results_for: Option<String>,
    direct: Option<CatalogId>,
    lookup: Lookup,
    completed_lookups: u64,
}

impl ResolverState {
    fn snapshot(&self) -> SearchSnapshot {
        SearchSnapshot {
            query: self.query.clone(),
            results: self.results.clone(),
            results_for: self.results_for.clone(),
            direct: self.direct.clone(),
            last_resolved: self.last_resolved.clone(),
            in_flight: match &self.lookup {
                Lookup::Idle => None,
                Lookup::InFlight(q) => Some(q.clone()),
            },
            completed_lookups: self.completed_lookups,
        }
    }

    /// Test-and-set: claims the lookup slot for the current query if a lookup is due.
    fn claim_lookup(&mut self) -> Option<String> {
        let query = self.query.trim();
        if query.is_empty()
            || self.last_resolved.as_deref() == Some(query)
            || self.lookup != Lookup::Idle
        {
            return None;
        }
        let query = query.to_string();
        self.lookup = Lookup::InFlight(query.clone());
        Some(query)
    }
}

struct Shared {
    state: Mutex<ResolverState>,
    updates: watch::Sender<SearchSnapshot>,
}

impl Shared {
    fn update<R>(&self, f: impl FnOnce(&mut ResolverState) -> R) -> R {
        let mut state = self.state.lock();
        let out = f(&mut state);
        self.updates.send_replace(state.snapshot());
        out
    }
}

/// Releases the in-flight slot on every exit path, including cancellation.
struct InFlightGuard(Arc<Shared>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.update(|state| {
            state.lookup = Lookup::Idle;
            state.completed_lookups += 1;
        });
    }
}

pub struct SearchResolver {
    backend: Arc<dyn Backend>,
    shared: Arc<Shared>,
    timer: TimerSlot,
    delay: Duration,
}

impl SearchResolver {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_delay(backend, SEARCH_DEBOUNCE)
    }

    pub fn with_delay(backend: Arc<dyn Backend>, delay: Duration) -> Self {
        let state = ResolverState {
            query: String::new(),
            last_resolved: None,
            results: Vec::new(),
            results_for: None,
            direct: None,
            lookup: Lookup::Idle,
            completed_lookups: 0,
        };
        let (updates, _) = watch::channel(state.snapshot());
        Self {
            backend,
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                updates,
            }),
            timer: TimerSlot::new(),
            delay,
        }
    }

    /// Feeds the text field's current contents; call on every edit.
    pub fn input(&self, text: &str) {
        let trimmed = text.trim();

        if trimmed.is_empty() {
            self.timer.cancel();
            self.shared.update(|state| {
                state.query = text.to_string();
                state.results.clear();
                state.results_for = None;
                state.last_resolved = None;
                state.direct = None;
            });
            return;
        }

        if let Some(id) = CatalogId::parse_numeric(trimmed) {
            self.timer.cancel();
            self.shared.update(|state| {
                state.query = text.to_string();
                state.results.clear();
                state.results_for = None;
                state.direct = Some(id);
            });
            return;
        }

        self.shared.update(|state| {
            state.query = text.to_string();
            state.direct = None;
        });

        let shared = Arc::clone(&self.shared);
        let backend = Arc::clone(&self.backend);
        self.timer.schedule(self.delay, move || fire(shared, backend));
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        self.shared.updates.borrow().clone()
    }

    pub fn results(&self) -> Vec<CatalogEntry> {
        self.shared.state.lock().results.clone()
    }

    pub fn direct_candidate(&self) -> Option<CatalogId> {
        self.shared.state.lock().direct.clone()
    }

    pub fn is_searching(&self) -> bool {
        self.shared.state.lock().lookup != Lookup::Idle
    }

    pub fn is_debouncing(&self) -> bool {
        self.timer.is_pending()
    }

    pub fn changes(&self) -> watch::Receiver<SearchSnapshot> {
        self.shared.updates.subscribe()
    }
}

fn fire(shared: Arc<Shared>, backend: Arc<dyn Backend>) {
    let Some(query) = shared.update(ResolverState::claim_lookup) else {
        tracing::trace!("search debounce elapsed, no lookup due");
        return;
    };

    tokio::spawn(async move {
        let _guard = InFlightGuard(Arc::clone(&shared));
        tracing::debug!(query = %query, "catalog lookup");
        let outcome = backend.search_catalog(&query).await;

        shared.update(|state| {
            if state.query.trim().is_empty() {
                return;
            }
            match outcome {
                Ok(mut results) => {
                    results.truncate(SEARCH_LIMIT);
                    tracing::debug!(query = %query, count = results.len(), "catalog lookup resolved");
                    state.results = results;
                    state.results_for = Some(query.clone());
                    state.last_resolved = Some(query);
                }
                Err(e) => {
                    tracing::warn!(query = %query, error = %e, "catalog lookup failed");
                    state.results.clear();
                    state.results_for = None;
                }
            }
        });
    });
}
