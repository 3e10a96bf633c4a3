//! Ranked title search over the cached storefront app list.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};

use crate::api::CatalogEntry;

/// Shorter queries return nothing.
pub const MIN_QUERY_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppListEntry {
    pub appid: u32,
    pub name: String,
}

pub struct CatalogIndex {
    apps: Vec<AppListEntry>,
}

impl CatalogIndex {
    pub fn new(apps: Vec<AppListEntry>) -> Self {
        Self { apps }
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Best `limit` matches for `query`, highest score first. Titles the fuzzy
    /// matcher rejects still match when every query word appears in them.
    pub fn search(&self, query: &str, limit: usize) -> Vec<CatalogEntry> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return Vec::new();
        }

        let matcher = SkimMatcherV2::default().smart_case();
        let query_lower = query.to_lowercase();
        let words: Vec<&str> = query_lower.split_whitespace().collect();

        let mut ranked: Vec<(i64, usize)> = self
            .apps
            .iter()
            .enumerate()
            .filter_map(|(idx, app)| {
                let score = match matcher.fuzzy_match(&app.name, query) {
                    Some(fuzzy) => fuzzy + bonus_score(&app.name, &query_lower, fuzzy),
                    None => {
                        let name = app.name.to_lowercase();
                        if !words.iter().all(|word| name.contains(word)) {
                            return None;
                        }
                        100 - app.name.len() as i64
                    }
                };
                Some((score, idx))
            })
            .collect();

        // Stable, so equal scores keep app-list order.
        ranked.sort_by(|a, b| b.0.cmp(&a.0));

        ranked
            .into_iter()
            .take(limit)
            .map(|(_, idx)| {
                let app = &self.apps[idx];
                CatalogEntry::new(app.appid.to_string(), app.name.clone())
            })
            .collect()
    }
}

/// Exact > prefix > whole word > substring, minus a capped penalty for extra length.
fn bonus_score(name: &str, query_lower: &str, fuzzy: i64) -> i64 {
    let name_lower = name.to_lowercase();

    let mut bonus = if name_lower == query_lower {
        10_000
    } else if name_lower.starts_with(query_lower) {
        5_000
    } else if name_lower.contains(&format!(" {query_lower} "))
        || name_lower.starts_with(&format!("{query_lower} "))
        || name_lower.ends_with(&format!(" {query_lower}"))
    {
        2_000
    } else if name_lower.contains(query_lower) {
        1_000
    } else {
        0
    };

    let length_penalty = (name.len() as i64).saturating_sub(query_lower.len() as i64);
    bonus -= length_penalty.min(500);
    bonus + fuzzy / 10
}
