use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::api::CatalogId;

static LIBRARY_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""path"\s+"(.+?)""#).expect("library path pattern"));
static INSTALL_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""installdir"\s+"(.+?)""#).expect("installdir pattern"));

/// Locates installed titles across every Steam library folder.
pub struct GamePathFinder;

impl GamePathFinder {
    pub fn find_game_path(steam_path: &Path, catalog_id: &CatalogId) -> Option<PathBuf> {
        if catalog_id.is_empty() {
            return None;
        }

        for lib in Self::get_library_folders(steam_path) {
            let steamapps = lib.join("steamapps");
            let manifest_path = steamapps.join(format!("appmanifest_{}.acf", catalog_id));
            let Ok(content) = fs::read_to_string(&manifest_path) else {
                continue;
            };
            if let Some(install_dir) = Self::extract_install_dir(&content) {
                let full_path = steamapps.join("common").join(install_dir);
                if full_path.is_dir() {
                    tracing::debug!(%catalog_id, path = %full_path.display(), "install directory found");
                    return Some(full_path);
                }
            }
        }
        None
    }

    /// Main library first, then the extra libraries in `libraryfolders.vdf` order.
    pub fn get_library_folders(steam_path: &Path) -> Vec<PathBuf> {
        let main_steam = steam_path.to_path_buf();
        let mut folders = vec![main_steam.clone()];

        let vdf_path = main_steam.join("steamapps").join("libraryfolders.vdf");
        if let Ok(content) = fs::read_to_string(vdf_path) {
            for cap in LIBRARY_PATH_RE.captures_iter(&content) {
                if let Some(m) = cap.get(1) {
                    let p = PathBuf::from(m.as_str().replace("\\\\", "\\"));
                    if p != main_steam && !folders.contains(&p) {
                        folders.push(p);
                    }
                }
            }
        }
        folders
    }

    fn extract_install_dir(manifest_content: &str) -> Option<String> {
        INSTALL_DIR_RE
            .captures(manifest_content)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(lib: &Path, app_id: &str, install_dir: &str) {
        let steamapps = lib.join("steamapps");
        fs::create_dir_all(steamapps.join("common").join(install_dir)).unwrap();
        fs::write(
            steamapps.join(format!("appmanifest_{app_id}.acf")),
            format!("\"AppState\"\n{{\n\t\"appid\"\t\t\"{app_id}\"\n\t\"installdir\"\t\t\"{install_dir}\"\n}}\n"),
        )
        .unwrap();
    }

    #[test]
    fn finds_title_in_secondary_library() {
        let tmp = tempfile::tempdir().unwrap();
        let main = tmp.path().join("Steam");
        let extra = tmp.path().join("Games");
        fs::create_dir_all(main.join("steamapps")).unwrap();
        fs::write(
            main.join("steamapps").join("libraryfolders.vdf"),
            format!(
                "\"libraryfolders\"\n{{\n\t\"0\"\n\t{{\n\t\t\"path\"\t\t\"{}\"\n\t}}\n\t\"1\"\n\t{{\n\t\t\"path\"\t\t\"{}\"\n\t}}\n}}\n",
                main.display(),
                extra.display()
            ),
        )
        .unwrap();
        write_manifest(&extra, "1030300", "Hollow Knight Silksong");

        let libs = GamePathFinder::get_library_folders(&main);
        assert_eq!(libs, vec![main.clone(), extra.clone()]);

        let found = GamePathFinder::find_game_path(&main, &CatalogId::new("1030300"));
        assert_eq!(found, Some(extra.join("steamapps").join("common").join("Hollow Knight Silksong")));
    }

    #[test]
    fn missing_manifest_or_directory_yields_none() {
        let tmp = tempfile::tempdir().unwrap();
        let main = tmp.path().join("Steam");
        write_manifest(&main, "367520", "Hollow Knight");
        fs::remove_dir_all(main.join("steamapps").join("common").join("Hollow Knight")).unwrap();

        assert_eq!(GamePathFinder::find_game_path(&main, &CatalogId::new("367520")), None);
        assert_eq!(GamePathFinder::find_game_path(&main, &CatalogId::new("1")), None);
        assert_eq!(GamePathFinder::find_game_path(&main, &CatalogId::default()), None);
    }
}
