//! Single-flight driver for the apply-task.
//!
//! A trigger either claims the session (test-and-set under one lock) and starts the
//! task, or is refused without side effects. The session is released when the task
//! settles, whether it returned an error, succeeded, or panicked.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::api::CatalogId;
use crate::backend::Backend;
use crate::notify::SuccessNotification;
use crate::probe::ProtectionProbe;
use crate::progress::{ProgressBridge, ProgressSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrackRequest {
    pub catalog_id: CatalogId,
    pub install_path: String,
    pub language: Option<String>,
}

impl CrackRequest {
    pub fn new(catalog_id: CatalogId, install_path: impl Into<String>) -> Self {
        Self {
            catalog_id,
            install_path: install_path.into(),
            language: None,
        }
    }

    pub fn language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrackSession {
    pub catalog_id: CatalogId,
    pub install_path: String,
    pub in_progress: bool,
    pub initiated: bool,
    pub last_error: Option<String>,
}

/// Why a trigger was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocked {
    MissingCatalogId,
    MissingInstallPath,
    AlreadyInitiated,
    ProbeChecking,
}

impl fmt::Display for Blocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Blocked::MissingCatalogId => "no catalog id selected",
            Blocked::MissingInstallPath => "no install directory selected",
            Blocked::AlreadyInitiated => "a patch is already running",
            Blocked::ProbeChecking => "protection check still running",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Succeeded(String),
    Failed(String),
}

/// Handle to a started apply-task. Dropping it does not cancel the task.
pub struct CrackTicket {
    handle: JoinHandle<Settlement>,
}

impl CrackTicket {
    pub async fn settled(self) -> Settlement {
        match self.handle.await {
            Ok(settlement) => settlement,
            Err(e) => Settlement::Failed(format!("apply task aborted: {e}")),
        }
    }
}

/// Returns the session to an idle, re-triggerable state when dropped.
struct SessionRelease(Arc<Mutex<CrackSession>>);

impl Drop for SessionRelease {
    fn drop(&mut self) {
        let mut session = self.0.lock();
        if std::thread::panicking() {
            session.last_error = Some("apply task panicked".to_string());
        }
        let last_error = session.last_error.take();
        *session = CrackSession {
            last_error,
            ..CrackSession::default()
        };
    }
}

pub struct CrackWorkflow {
    backend: Arc<dyn Backend>,
    progress: Arc<ProgressBridge>,
    probe: Option<Arc<ProtectionProbe>>,
    notification: Option<Arc<SuccessNotification>>,
    session: Arc<Mutex<CrackSession>>,
}

impl CrackWorkflow {
    pub fn new(backend: Arc<dyn Backend>, progress: Arc<ProgressBridge>) -> Self {
        Self {
            backend,
            progress,
            probe: None,
            notification: None,
            session: Arc::new(Mutex::new(CrackSession::default())),
        }
    }

    pub fn with_probe(mut self, probe: Arc<ProtectionProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_notification(mut self, notification: Arc<SuccessNotification>) -> Self {
        self.notification = Some(notification);
        self
    }

    /// Starts the apply-task if every precondition holds; otherwise a no-op.
    pub fn trigger(&self, request: CrackRequest) -> Result<CrackTicket, Blocked> {
        {
            let mut session = self.session.lock();
            let blocked = if request.catalog_id.is_empty() {
                Some(Blocked::MissingCatalogId)
            } else if request.install_path.trim().is_empty() {
                Some(Blocked::MissingInstallPath)
            } else if session.initiated {
                Some(Blocked::AlreadyInitiated)
            } else if self.probe.as_ref().is_some_and(|p| p.is_checking()) {
                Some(Blocked::ProbeChecking)
            } else {
                None
            };
            if let Some(reason) = blocked {
                tracing::debug!(%reason, "crack trigger ignored");
                return Err(reason);
            }

            *session = CrackSession {
                catalog_id: request.catalog_id.clone(),
                install_path: request.install_path.clone(),
                in_progress: true,
                initiated: true,
                last_error: None,
            };
        }

        self.progress.reset(ProgressSnapshot::started());
        tracing::info!(catalog_id = %request.catalog_id, path = %request.install_path, "crack started");

        let handle = tokio::spawn(run(
            Arc::clone(&self.backend),
            Arc::clone(&self.session),
            self.notification.clone(),
            request,
        ));
        Ok(CrackTicket { handle })
    }

    pub fn session(&self) -> CrackSession {
        self.session.lock().clone()
    }

    pub fn is_in_progress(&self) -> bool {
        self.session.lock().in_progress
    }

    pub fn is_initiated(&self) -> bool {
        self.session.lock().initiated
    }

    pub fn last_error(&self) -> Option<String> {
        self.session.lock().last_error.clone()
    }

    /// The line shown under the progress bar: the failure if the last run failed,
    /// otherwise the latest progress message.
    pub fn status_message(&self) -> String {
        match self.last_error() {
            Some(e) => format!("Error: {e}"),
            None => self.progress.snapshot().message,
        }
    }

    pub fn progress(&self) -> &ProgressBridge {
        &self.progress
    }
}

async fn run(
    backend: Arc<dyn Backend>,
    session: Arc<Mutex<CrackSession>>,
    notification: Option<Arc<SuccessNotification>>,
    request: CrackRequest,
) -> Settlement {
    let _release = SessionRelease(Arc::clone(&session));
    let install_path = PathBuf::from(&request.install_path);

    let outcome = backend
        .apply_patch(&request.catalog_id, &install_path, request.language.as_deref())
        .await;

    match outcome {
        Ok(result) => {
            tracing::info!(catalog_id = %request.catalog_id, "crack completed");
            if let Some(toast) = notification {
                toast.show();
            }
            Settlement::Succeeded(result)
        }
        Err(e) => {
            let detail = e.to_string();
            tracing::error!(catalog_id = %request.catalog_id, error = %detail, "crack failed");
            session.lock().last_error = Some(detail.clone());
            Settlement::Failed(detail)
        }
    }
}
