use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::SourceKey;
use crate::error::EdgeError;

/// Per-run memo of resolved version tokens.
///
/// A fresh cache is created for every run; nothing here outlives the
/// process. The probe closure runs without holding the lock, so slow
/// remotes for one key never block lookups for another. When two workers
/// race on the same key the first stored token wins.
///
/// Probe pages shared by several aliases of one source are memoized by URL
/// alongside the tokens.
#[derive(Debug, Default)]
pub struct VersionCache {
    entries: RwLock<HashMap<SourceKey, String>>,
    pages: RwLock<HashMap<String, String>>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SourceKey) -> Option<String> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    pub fn get_or_probe<F>(&self, key: &SourceKey, probe: F) -> Result<String, EdgeError>
    where
        F: FnOnce() -> Result<String, EdgeError>,
    {
        if let Some(version) = self.get(key) {
            return Ok(version);
        }
        let version = probe()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| EdgeError::probe(key, "version cache lock poisoned"))?;
        Ok(entries.entry(key.clone()).or_insert(version).clone())
    }

    pub fn get_or_fetch_page<F>(&self, url: &str, fetch: F) -> Result<String, EdgeError>
    where
        F: FnOnce() -> Result<String, EdgeError>,
    {
        let cached = self
            .pages
            .read()
            .ok()
            .and_then(|pages| pages.get(url).cloned());
        if let Some(page) = cached {
            return Ok(page);
        }
        let page = fetch()?;
        let mut pages = self
            .pages
            .write()
            .map_err(|_| EdgeError::Http(format!("page cache lock poisoned for {url}")))?;
        Ok(pages.entry(url.to_string()).or_insert(page).clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
