use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::DrmNoticeLookup;
use crate::catalog::AppListEntry;
use crate::error::{Error, Result};

const APP_LIST_URL: &str =
    "https://raw.githubusercontent.com/0xSovereign/steamapplist/refs/heads/main/data/apps.json";
const APP_DETAILS_URL: &str = "https://store.steampowered.com/api/appdetails";

/// The catalog never returns more than this many candidates for one lookup.
pub const SEARCH_LIMIT: usize = 5;

/// Storefront catalog identifier, kept as text. Empty means unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId(String);

impl CatalogId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    /// Accepts direct numeric entry: a non-empty run of ASCII digits.
    pub fn parse_numeric(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(trimmed.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CatalogId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub catalog_id: CatalogId,
    pub display_name: String,
}

impl CatalogEntry {
    pub fn new(catalog_id: impl AsRef<str>, display_name: impl Into<String>) -> Self {
        Self {
            catalog_id: CatalogId::new(catalog_id),
            display_name: display_name.into(),
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    app_list_url: String,
    details_url: String,
}

impl ApiClient {
    pub fn new() -> Result<Self> {
        Self::with_endpoints(APP_LIST_URL, APP_DETAILS_URL)
    }

    pub fn with_endpoints(app_list_url: impl Into<String>, details_url: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("autocrack/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(25))
            .build()?;

        Ok(Self {
            client,
            app_list_url: app_list_url.into(),
            details_url: details_url.into(),
        })
    }

    /// The full storefront app list, as `[{"appid": 620, "name": "Portal 2"}, ...]`.
    pub async fn fetch_app_list(&self) -> Result<Vec<AppListEntry>> {
        let resp = self.client.get(&self.app_list_url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Api(format!("app list returned {}", resp.status())));
        }
        Ok(resp.json().await?)
    }

    /// The `drm_notice` field of the app-details record, when the store lists one.
    pub async fn drm_notice(&self, catalog_id: &CatalogId) -> Result<Option<String>> {
        let resp = self
            .client
            .get(&self.details_url)
            .query(&[("appids", catalog_id.as_str())])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Error::Api(format!("app details returned {}", resp.status())));
        }

        let root: Value = resp.json().await?;
        parse_drm_notice(&root, catalog_id)
    }
}

#[async_trait]
impl DrmNoticeLookup for ApiClient {
    async fn drm_notice(&self, catalog_id: &CatalogId) -> Result<Option<String>> {
        ApiClient::drm_notice(self, catalog_id).await
    }
}

// Shape: {"1030300": {"success": true, "data": {"drm_notice": "Denuvo Anti-tamper", ...}}}
fn parse_drm_notice(root: &Value, catalog_id: &CatalogId) -> Result<Option<String>> {
    let app = root
        .get(catalog_id.as_str())
        .ok_or_else(|| Error::Api(format!("no app-details record for {catalog_id}")))?;

    if app.get("success").and_then(Value::as_bool) != Some(true) {
        return Ok(None);
    }

    Ok(app
        .get("data")
        .and_then(|data| data.get("drm_notice"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|notice| !notice.is_empty())
        .map(str::to_string))
}
