use std::fs;
use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;

use crate::domain::{LocalState, SourceKey};
use crate::error::EdgeError;

/// On-disk layout of a data directory and the raw download cache.
#[derive(Debug, Clone)]
pub struct Store {
    data_root: Utf8PathBuf,
    cache_root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, EdgeError> {
        let cwd = std::env::current_dir().map_err(|err| EdgeError::Filesystem(err.to_string()))?;
        let data_root = Utf8PathBuf::from_path_buf(cwd.join(".kira-edges"))
            .map_err(|_| EdgeError::Filesystem("invalid data path".to_string()))?;

        Ok(Self {
            data_root,
            cache_root: default_cache_root()?,
        })
    }

    pub fn new_with_paths(data_root: Utf8PathBuf, cache_root: Utf8PathBuf) -> Self {
        Self {
            data_root,
            cache_root,
        }
    }

    /// Builds a store from optional configured locations, falling back to the
    /// defaults of [`Store::new`].
    pub fn from_config(data_dir: Option<&str>, cache_dir: Option<&str>) -> Result<Self, EdgeError> {
        let defaults = match (data_dir, cache_dir) {
            (Some(data), Some(cache)) => {
                return Ok(Self::new_with_paths(data.into(), cache.into()));
            }
            _ => Self::new()?,
        };
        Ok(Self {
            data_root: data_dir.map(Utf8PathBuf::from).unwrap_or(defaults.data_root),
            cache_root: cache_dir
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.cache_root),
        })
    }

    pub fn data_root(&self) -> &Utf8Path {
        &self.data_root
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn metadata_path(&self, key: &SourceKey) -> Utf8PathBuf {
        self.data_root
            .join("metadata")
            .join(&key.source)
            .join(format!("{}.json", key.alias))
    }

    pub fn records_path(&self, key: &SourceKey) -> Utf8PathBuf {
        self.data_root
            .join("records")
            .join(&key.source)
            .join(format!("{}.tsv", key.alias))
    }

    pub fn raw_dir(&self, key: &SourceKey) -> Utf8PathBuf {
        self.cache_root
            .join("raw")
            .join(&key.source)
            .join(&key.alias)
    }

    pub fn merged_path(&self) -> Utf8PathBuf {
        self.data_root.join("merged").join("edges.tsv")
    }

    pub fn work_dir(&self) -> Utf8PathBuf {
        self.data_root.join("tmp")
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), EdgeError> {
        fs::create_dir_all(path.as_std_path()).map_err(|err| EdgeError::Filesystem(err.to_string()))
    }

    pub fn ensure_data_root(&self) -> Result<(), EdgeError> {
        Self::ensure_dir(&self.data_root)
    }

    pub fn ensure_cache_root(&self) -> Result<(), EdgeError> {
        Self::ensure_dir(&self.cache_root)
    }

    /// Returns `None` when the alias was never fetched.
    pub fn read_local_state(&self, key: &SourceKey) -> Result<Option<LocalState>, EdgeError> {
        let path = self.metadata_path(key);
        let content = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(EdgeError::Filesystem(format!("read {path}: {err}"))),
        };
        let state = serde_json::from_str(&content)
            .map_err(|err| EdgeError::Filesystem(format!("parse {path}: {err}")))?;
        Ok(Some(state))
    }

    pub fn write_local_state(&self, key: &SourceKey, state: &LocalState) -> Result<(), EdgeError> {
        let content = serde_json::to_vec_pretty(state)
            .map_err(|err| EdgeError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(&self.metadata_path(key), &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), EdgeError> {
        if let Some(parent) = path.parent() {
            Self::ensure_dir(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| EdgeError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| EdgeError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// All state files currently on disk, keyed by source and alias.
    pub fn list_local_states(&self) -> Result<Vec<(SourceKey, LocalState)>, EdgeError> {
        let metadata_root = self.data_root.join("metadata");
        if !metadata_root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for source_dir in read_dir_sorted(&metadata_root)? {
            if !source_dir.as_std_path().is_dir() {
                continue;
            }
            let Some(source) = source_dir.file_name() else {
                continue;
            };
            for file in read_dir_sorted(&source_dir)? {
                if file.extension() != Some("json") {
                    continue;
                }
                let Some(alias) = file.file_stem() else {
                    continue;
                };
                let key = SourceKey::new(source, alias);
                if let Some(state) = self.read_local_state(&key)? {
                    entries.push((key, state));
                }
            }
        }
        Ok(entries)
    }
}

fn default_cache_root() -> Result<Utf8PathBuf, EdgeError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("kira-edges")).ok()
        })
        .ok_or_else(|| EdgeError::Filesystem("unable to resolve cache directory".to_string()))
}

fn read_dir_sorted(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, EdgeError> {
    let mut paths = Vec::new();
    let entries =
        fs::read_dir(dir.as_std_path()).map_err(|err| EdgeError::Filesystem(err.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|err| EdgeError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|path| EdgeError::Filesystem(format!("non-utf8 path {}", path.display())))?;
        paths.push(path);
    }
    paths.sort();
    Ok(paths)
}
