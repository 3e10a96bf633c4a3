#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autocrack_manager::config::Settings;
use autocrack_manager::{
    Backend, CatalogEntry, CatalogId, DrmNoticeLookup, Error, EventHub, ProgressSnapshot, Result,
    PROGRESS_TOPIC,
};
use parking_lot::Mutex;

pub enum ProbeReply {
    Status(&'static str),
    Fail(&'static str),
    Hang,
}

pub enum ApplyReply {
    Ok(&'static str),
    Fail(&'static str),
    Panic,
}

pub type ApplyCall = (CatalogId, PathBuf, Option<String>);

/// Scriptable stand-in for the desktop backend.
pub struct FakeBackend {
    pub events: EventHub,

    search_results: Mutex<HashMap<String, Vec<CatalogEntry>>>,
    search_fails: AtomicBool,
    search_delay: Mutex<Duration>,
    pub search_calls: Mutex<Vec<String>>,

    probe_script: Mutex<VecDeque<ProbeReply>>,
    pub probe_calls: AtomicUsize,

    apply_reply: Mutex<ApplyReply>,
    apply_delay: Mutex<Duration>,
    apply_progress: Mutex<Vec<ProgressSnapshot>>,
    pub apply_calls: Mutex<Vec<ApplyCall>>,

    settings: Mutex<Option<Settings>>,
    pub saved_settings: Mutex<Vec<Settings>>,
    directory: Mutex<std::result::Result<Option<PathBuf>, &'static str>>,
}

impl FakeBackend {
    pub fn new(events: EventHub) -> Arc<Self> {
        Arc::new(Self {
            events,
            search_results: Mutex::new(HashMap::new()),
            search_fails: AtomicBool::new(false),
            search_delay: Mutex::new(Duration::ZERO),
            search_calls: Mutex::new(Vec::new()),
            probe_script: Mutex::new(VecDeque::new()),
            probe_calls: AtomicUsize::new(0),
            apply_reply: Mutex::new(ApplyReply::Ok("Steamless: ok\nGoldberg: ok")),
            apply_delay: Mutex::new(Duration::ZERO),
            apply_progress: Mutex::new(Vec::new()),
            apply_calls: Mutex::new(Vec::new()),
            settings: Mutex::new(Some(Settings::default())),
            saved_settings: Mutex::new(Vec::new()),
            directory: Mutex::new(Ok(None)),
        })
    }

    pub fn set_search(&self, title: &str, results: Vec<CatalogEntry>) {
        self.search_results.lock().insert(title.to_string(), results);
    }

    pub fn fail_search(&self, fail: bool) {
        self.search_fails.store(fail, Ordering::SeqCst);
    }

    pub fn set_search_delay(&self, delay: Duration) {
        *self.search_delay.lock() = delay;
    }

    pub fn script_probe(&self, replies: impl IntoIterator<Item = ProbeReply>) {
        self.probe_script.lock().extend(replies);
    }

    pub fn probe_count(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn set_apply(&self, reply: ApplyReply) {
        *self.apply_reply.lock() = reply;
    }

    pub fn set_apply_delay(&self, delay: Duration) {
        *self.apply_delay.lock() = delay;
    }

    pub fn set_apply_progress(&self, events: Vec<ProgressSnapshot>) {
        *self.apply_progress.lock() = events;
    }

    pub fn set_settings(&self, settings: Option<Settings>) {
        *self.settings.lock() = settings;
    }

    pub fn set_directory(&self, reply: std::result::Result<Option<PathBuf>, &'static str>) {
        *self.directory.lock() = reply;
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn select_install_directory(&self) -> Result<Option<PathBuf>> {
        self.directory.lock().clone().map_err(|e| Error::Dialog(e.to_string()))
    }

    async fn load_settings(&self) -> Result<Settings> {
        (*self.settings.lock()).ok_or_else(|| Error::Other("settings unreadable".into()))
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.saved_settings.lock().push(*settings);
        *self.settings.lock() = Some(*settings);
        Ok(())
    }

    async fn probe_protection(&self, _catalog_id: &CatalogId) -> Result<String> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.probe_script.lock().pop_front();
        match reply {
            None => Ok("No DRM notice listed".to_string()),
            Some(ProbeReply::Status(text)) => Ok(text.to_string()),
            Some(ProbeReply::Fail(msg)) => Err(Error::Other(msg.to_string())),
            Some(ProbeReply::Hang) => std::future::pending().await,
        }
    }

    async fn apply_patch(
        &self,
        catalog_id: &CatalogId,
        install_path: &Path,
        language: Option<&str>,
    ) -> Result<String> {
        self.apply_calls.lock().push((
            catalog_id.clone(),
            install_path.to_path_buf(),
            language.map(str::to_string),
        ));

        let progress = self.apply_progress.lock().clone();
        for snapshot in &progress {
            self.events.emit(PROGRESS_TOPIC, snapshot)?;
        }

        let delay = *self.apply_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match &*self.apply_reply.lock() {
            ApplyReply::Ok(text) => Ok(text.to_string()),
            ApplyReply::Fail(msg) => Err(Error::Patch(msg.to_string())),
            ApplyReply::Panic => panic!("patch backend crashed"),
        }
    }

    async fn search_catalog(&self, title: &str) -> Result<Vec<CatalogEntry>> {
        self.search_calls.lock().push(title.to_string());
        let delay = *self.search_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.search_fails.load(Ordering::SeqCst) {
            return Err(Error::Other("store unreachable".into()));
        }
        Ok(self.search_results.lock().get(title).cloned().unwrap_or_default())
    }
}

/// Fallback lookup returning a fixed notice, or failing.
pub struct FakeNotice(pub std::result::Result<Option<&'static str>, &'static str>);

#[async_trait]
impl DrmNoticeLookup for FakeNotice {
    async fn drm_notice(&self, _catalog_id: &CatalogId) -> Result<Option<String>> {
        match self.0 {
            Ok(notice) => Ok(notice.map(str::to_string)),
            Err(msg) => Err(Error::Other(msg.to_string())),
        }
    }
}

pub fn entry(id: &str, name: &str) -> CatalogEntry {
    CatalogEntry::new(id, name)
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}
