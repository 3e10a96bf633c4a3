//! Commands the orchestration core consumes, and the desktop implementation of them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::OnceCell;

use crate::api::{ApiClient, CatalogEntry, CatalogId, SEARCH_LIMIT};
use crate::catalog::{CatalogIndex, MIN_QUERY_LEN};
use crate::config::{load_config_from, save_config_to, AppConfig, Settings};
use crate::error::{Error, Result};
use crate::events::EventHub;
use crate::patcher::PatchTool;

#[async_trait]
pub trait Backend: Send + Sync {
    /// `Ok(None)` when the user selected nothing.
    async fn select_install_directory(&self) -> Result<Option<PathBuf>>;

    async fn load_settings(&self) -> Result<Settings>;

    async fn save_settings(&self, settings: &Settings) -> Result<()>;

    /// Free-text protection status; a protection marker inside it signals anti-tamper.
    async fn probe_protection(&self, catalog_id: &CatalogId) -> Result<String>;

    /// Long-running patch of `install_path`. Progress goes out on the progress topic.
    async fn apply_patch(
        &self,
        catalog_id: &CatalogId,
        install_path: &Path,
        language: Option<&str>,
    ) -> Result<String>;

    /// At most five candidates, most relevant first.
    async fn search_catalog(&self, title: &str) -> Result<Vec<CatalogEntry>>;
}

/// Secondary protection signal consulted when the primary probe finds no marker.
#[async_trait]
pub trait DrmNoticeLookup: Send + Sync {
    async fn drm_notice(&self, catalog_id: &CatalogId) -> Result<Option<String>>;
}

pub struct DesktopBackend {
    config_path: PathBuf,
    config: Mutex<AppConfig>,
    api: ApiClient,
    catalog: OnceCell<CatalogIndex>,
    events: EventHub,
}

impl DesktopBackend {
    pub fn new(config_path: PathBuf, config: AppConfig, api: ApiClient, events: EventHub) -> Self {
        Self {
            config_path,
            config: Mutex::new(config),
            api,
            catalog: OnceCell::new(),
            events,
        }
    }

    pub fn config(&self) -> AppConfig {
        self.config.lock().clone()
    }

    /// The app list is fetched on first use and kept for the life of the backend.
    /// A failed fetch is retried by the next search.
    async fn catalog(&self) -> Result<&CatalogIndex> {
        self.catalog
            .get_or_try_init(|| async {
                let apps = self.api.fetch_app_list().await?;
                tracing::info!(count = apps.len(), "app list cached");
                Ok::<_, Error>(CatalogIndex::new(apps))
            })
            .await
    }

    fn patch_tool(&self) -> Result<PatchTool> {
        let config = self.config.lock();
        if config.patcher_path.trim().is_empty() {
            return Err(Error::NotConfigured("patcher_path"));
        }
        Ok(PatchTool::new(&config.patcher_path, config.patcher_args.clone()))
    }
}

#[async_trait]
impl Backend for DesktopBackend {
    async fn select_install_directory(&self) -> Result<Option<PathBuf>> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(b"Game folder (leave empty to cancel): ").await?;
        stdout.flush().await?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Dialog(e.to_string()))?;

        let answer = line.trim();
        if answer.is_empty() {
            return Ok(None);
        }
        let path = PathBuf::from(answer);
        if !path.is_dir() {
            return Err(Error::Dialog(format!("{} is not a directory", path.display())));
        }
        Ok(Some(path))
    }

    async fn load_settings(&self) -> Result<Settings> {
        let loaded = load_config_from(&self.config_path)?;
        let settings = loaded.settings();
        *self.config.lock() = loaded;
        Ok(settings)
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        let snapshot = {
            let mut config = self.config.lock();
            config.apply_settings(*settings);
            config.clone()
        };
        save_config_to(&self.config_path, &snapshot)
    }

    async fn probe_protection(&self, catalog_id: &CatalogId) -> Result<String> {
        Ok(self
            .api
            .drm_notice(catalog_id)
            .await?
            .unwrap_or_else(|| "No DRM notice listed".to_string()))
    }

    async fn apply_patch(
        &self,
        catalog_id: &CatalogId,
        install_path: &Path,
        language: Option<&str>,
    ) -> Result<String> {
        let tool = self.patch_tool()?;
        let fallback_language = self.config.lock().language.clone();
        let language = language.or(fallback_language.as_deref());
        tool.run(catalog_id, install_path, language, &self.events).await
    }

    async fn search_catalog(&self, title: &str) -> Result<Vec<CatalogEntry>> {
        if title.trim().chars().count() < MIN_QUERY_LEN {
            return Ok(Vec::new());
        }
        Ok(self.catalog().await?.search(title, SEARCH_LIMIT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Theme;

    fn backend_at(path: PathBuf) -> DesktopBackend {
        DesktopBackend::new(path, AppConfig::default(), ApiClient::new().unwrap(), EventHub::new())
    }

    #[tokio::test]
    async fn settings_persist_through_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        let backend = backend_at(path.clone());

        backend.save_settings(&Settings { theme: Theme::Dark }).await.unwrap();
        assert_eq!(load_config_from(&path).unwrap().theme, Theme::Dark);

        let fresh = backend_at(path);
        assert_eq!(fresh.load_settings().await.unwrap(), Settings { theme: Theme::Dark });
    }

    #[tokio::test]
    async fn corrupt_settings_raise() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "[]").unwrap();

        assert!(backend_at(path).load_settings().await.is_err());
    }

    #[tokio::test]
    async fn short_search_skips_the_app_list() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = DesktopBackend::new(
            tmp.path().join("config.json"),
            AppConfig::default(),
            ApiClient::with_endpoints("http://127.0.0.1:9/apps.json", "http://127.0.0.1:9/details").unwrap(),
            EventHub::new(),
        );

        assert!(backend.search_catalog(" h ").await.unwrap().is_empty());
        assert!(backend.catalog.get().is_none());
        assert!(backend.search_catalog("hollow").await.is_err());
        assert!(backend.catalog.get().is_none());
    }

    #[tokio::test]
    async fn apply_without_patch_tool_is_not_configured() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = backend_at(tmp.path().join("config.json"));

        let err = backend
            .apply_patch(&CatalogId::new("1030300"), tmp.path(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConfigured("patcher_path")));
    }
}
