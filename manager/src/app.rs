use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{CatalogEntry, CatalogId};
use crate::backend::{Backend, DrmNoticeLookup};
use crate::config::{AppConfig, Settings, Theme};
use crate::error::Result;
use crate::events::EventHub;
use crate::notify::{SuccessNotification, DEFAULT_NOTIFICATION_DURATION};
use crate::probe::ProtectionProbe;
use crate::progress::ProgressBridge;
use crate::search::{SearchResolver, SEARCH_DEBOUNCE};
use crate::workflow::{Blocked, CrackRequest, CrackTicket, CrackWorkflow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub search_delay: Duration,
    pub notification: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            search_delay: SEARCH_DEBOUNCE,
            notification: DEFAULT_NOTIFICATION_DURATION,
        }
    }
}

impl From<&AppConfig> for Timings {
    fn from(config: &AppConfig) -> Self {
        Self {
            search_delay: config.search_delay(),
            notification: config.notification_duration(),
        }
    }
}

/// One user session: the selected title, its install directory, and the
/// components that act on them.
pub struct CrackManager {
    backend: Arc<dyn Backend>,
    search: SearchResolver,
    probe: Arc<ProtectionProbe>,
    progress: Arc<ProgressBridge>,
    notification: Arc<SuccessNotification>,
    workflow: CrackWorkflow,
    catalog_id: CatalogId,
    install_path: String,
    language: Option<String>,
    settings: Settings,
}

impl CrackManager {
    /// Must be called inside a tokio runtime; subscribes to the progress topic on `events`.
    pub fn new(backend: Arc<dyn Backend>, events: &EventHub, timings: Timings) -> Self {
        Self::build(backend, events, timings, None)
    }

    pub fn with_drm_fallback(
        backend: Arc<dyn Backend>,
        events: &EventHub,
        timings: Timings,
        fallback: Arc<dyn DrmNoticeLookup>,
    ) -> Self {
        Self::build(backend, events, timings, Some(fallback))
    }

    fn build(
        backend: Arc<dyn Backend>,
        events: &EventHub,
        timings: Timings,
        fallback: Option<Arc<dyn DrmNoticeLookup>>,
    ) -> Self {
        let search = SearchResolver::with_delay(Arc::clone(&backend), timings.search_delay);

        let mut probe = ProtectionProbe::new(Arc::clone(&backend));
        if let Some(lookup) = fallback {
            probe = probe.with_fallback(lookup);
        }
        let probe = Arc::new(probe);

        let progress = Arc::new(ProgressBridge::new());
        progress.activate(events);

        let notification = Arc::new(SuccessNotification::new(timings.notification));

        let workflow = CrackWorkflow::new(Arc::clone(&backend), Arc::clone(&progress))
            .with_probe(Arc::clone(&probe))
            .with_notification(Arc::clone(&notification));

        Self {
            backend,
            search,
            probe,
            progress,
            notification,
            workflow,
            catalog_id: CatalogId::default(),
            install_path: String::new(),
            language: None,
            settings: Settings::default(),
        }
    }

    /// Loads persisted settings; any failure falls back to the defaults.
    pub async fn load_settings(&mut self) -> Settings {
        self.settings = match self.backend.load_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load settings, using defaults");
                Settings::default()
            }
        };
        self.settings
    }

    pub async fn set_theme(&mut self, theme: Theme) -> Result<()> {
        let settings = Settings { theme };
        self.backend.save_settings(&settings).await?;
        self.settings = settings;
        Ok(())
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn set_search_query(&self, text: &str) {
        self.search.input(text);
    }

    /// Selecting a search result adopts its catalog id.
    pub fn choose_entry(&mut self, entry: &CatalogEntry) {
        self.set_catalog_id(entry.catalog_id.clone());
    }

    /// Adopts the numeric id typed into the search field, if there is one.
    pub fn use_direct_candidate(&mut self) -> Option<CatalogId> {
        let id = self.search.direct_candidate()?;
        self.set_catalog_id(id.clone());
        Some(id)
    }

    /// Resets the protection probe before it looks at the new id.
    pub fn set_catalog_id(&mut self, catalog_id: CatalogId) {
        self.probe.set_catalog_id(&catalog_id);
        self.catalog_id = catalog_id;
    }

    pub fn catalog_id(&self) -> &CatalogId {
        &self.catalog_id
    }

    pub fn set_install_path(&mut self, path: impl Into<String>) {
        self.install_path = path.into();
    }

    pub fn install_path(&self) -> &str {
        &self.install_path
    }

    pub fn set_language(&mut self, language: Option<String>) {
        self.language = language.filter(|l| !l.trim().is_empty());
    }

    /// Asks the backend for a directory. "None selected" keeps the current path.
    pub async fn browse_install_directory(&mut self) -> Result<Option<PathBuf>> {
        match self.backend.select_install_directory().await {
            Ok(Some(path)) => {
                tracing::info!(path = %path.display(), "install directory selected");
                self.install_path = path.to_string_lossy().to_string();
                Ok(Some(path))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                tracing::error!(error = %e, "failed to select install directory");
                Err(e)
            }
        }
    }

    pub fn start_crack(&self) -> Result<CrackTicket, Blocked> {
        let request = CrackRequest::new(self.catalog_id.clone(), self.install_path.clone())
            .language(self.language.clone());
        self.workflow.trigger(request)
    }

    pub fn search(&self) -> &SearchResolver {
        &self.search
    }

    pub fn probe(&self) -> &ProtectionProbe {
        &self.probe
    }

    pub fn progress(&self) -> &ProgressBridge {
        &self.progress
    }

    pub fn notification(&self) -> &SuccessNotification {
        &self.notification
    }

    pub fn workflow(&self) -> &CrackWorkflow {
        &self.workflow
    }
}

impl Drop for CrackManager {
    fn drop(&mut self) {
        self.progress.deactivate();
        self.probe.shutdown();
        self.notification.dismiss();
    }
}
