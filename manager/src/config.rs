use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

pub const APP_FOLDER: &str = "autocrack";
pub const CONFIG_FILE: &str = "config.json";
pub const HOME_ENV: &str = "AUTOCRACK_HOME";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        })
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(Error::Other(format!("unknown theme '{other}'"))),
        }
    }
}

/// The part of the configuration exposed through the settings commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub theme: Theme,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub theme: Theme,

    #[serde(default = "default_steam_path")]
    pub steam_path: String,

    #[serde(default)]
    pub patcher_path: String,

    #[serde(default)]
    pub patcher_args: Vec<String>,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default = "default_search_delay_ms")]
    pub search_delay_ms: u64,

    #[serde(default = "default_notification_ms")]
    pub notification_ms: u64,
}

fn default_steam_path() -> String {
    find_default_steam().unwrap_or_default()
}

fn default_search_delay_ms() -> u64 {
    2000
}

fn default_notification_ms() -> u64 {
    4000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            steam_path: default_steam_path(),
            patcher_path: String::new(),
            patcher_args: Vec::new(),
            language: None,
            search_delay_ms: default_search_delay_ms(),
            notification_ms: default_notification_ms(),
        }
    }
}

impl AppConfig {
    pub fn settings(&self) -> Settings {
        Settings { theme: self.theme }
    }

    pub fn apply_settings(&mut self, settings: Settings) {
        self.theme = settings.theme;
    }

    pub fn search_delay(&self) -> Duration {
        Duration::from_millis(self.search_delay_ms)
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_millis(self.notification_ms)
    }
}

pub fn config_dir() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    match dirs::config_dir() {
        Some(dir) => dir.join(APP_FOLDER),
        None => PathBuf::from("."),
    }
}

pub fn get_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Strict load: a missing file yields defaults, unreadable or corrupt files raise.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Lenient load used at startup; never blocks on a bad file.
pub fn load_config(path: &Path) -> AppConfig {
    match load_config_from(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
            AppConfig::default()
        }
    }
}

pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(windows)]
fn find_default_steam() -> Option<String> {
    // 1. Registry
    let keys = [
        ("SOFTWARE\\WOW6432Node\\Valve\\Steam", "InstallPath"),
        ("SOFTWARE\\Valve\\Steam", "InstallPath"),
    ];

    for (key_path, value_name) in keys.iter() {
        if let Ok(out) = std::process::Command::new("reg")
            .args(["query", &format!("HKLM\\{}", key_path), "/v", value_name])
            .output()
        {
            let out = String::from_utf8_lossy(&out.stdout);
            // ... InstallPath    REG_SZ    C:\Program Files (x86)\Steam
            if let Some(pos) = out.find("REG_SZ") {
                let path_str = out[pos + 6..].trim().to_string();
                if Path::new(&path_str).exists() {
                    return Some(path_str);
                }
            }
        }
    }

    // 2. Common paths
    [r"C:\Program Files (x86)\Steam", r"C:\Program Files\Steam"]
        .into_iter()
        .find(|p| Path::new(p).exists())
        .map(str::to_string)
}

#[cfg(not(windows))]
fn find_default_steam() -> Option<String> {
    let home = dirs::home_dir()?;
    [".steam/steam", ".local/share/Steam", "Library/Application Support/Steam"]
        .into_iter()
        .map(|rel| home.join(rel))
        .find(|p| p.join("steamapps").is_dir())
        .map(|p| p.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"theme": "dark", "patcher_path": "/opt/patch"}"#).unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.theme, Theme::Dark);
        assert_eq!(cfg.patcher_path, "/opt/patch");
        assert_eq!(cfg.search_delay(), Duration::from_millis(2000));
        assert_eq!(cfg.notification_duration(), Duration::from_millis(4000));
    }

    #[test]
    fn corrupt_file_raises_strictly_and_falls_back_leniently() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(load_config_from(&path), Err(Error::Json(_))));
        assert_eq!(load_config(&path).theme, Theme::Light);
    }

    #[test]
    fn save_creates_parent_and_round_trips_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join(CONFIG_FILE);

        let mut cfg = AppConfig::default();
        cfg.apply_settings(Settings { theme: Theme::Dark });
        save_config_to(&path, &cfg).unwrap();

        assert_eq!(load_config_from(&path).unwrap().settings(), Settings { theme: Theme::Dark });
    }

    #[test]
    fn theme_parses_case_insensitively() {
        assert_eq!("Dark".parse::<Theme>().unwrap(), Theme::Dark);
        assert!("sepia".parse::<Theme>().is_err());
    }
}
