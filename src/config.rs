use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::EdgeError;
use crate::providers;

pub const DEFAULT_CONFIG_FILE: &str = "kira-edges.json";
pub const DEFAULT_CHUNK_LINES: usize = 1_000_000;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub merged_output: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub chunk_lines: Option<usize>,
    #[serde(default)]
    pub verify_merge: Option<bool>,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SourceEntry {
    Shorthand(String),
    Detailed(SourceEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SourceEntryObject {
    pub name: String,
    #[serde(default)]
    pub aliases: Option<Vec<String>>,
}

/// A source selected for a run together with the aliases to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    pub name: String,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub data_dir: Option<String>,
    pub cache_dir: Option<String>,
    pub merged_output: Option<String>,
    pub workers: usize,
    pub chunk_lines: usize,
    pub verify_merge: bool,
    pub sources: Vec<SourceRequest>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, EdgeError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(EdgeError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| EdgeError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| EdgeError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    /// Validates source and alias names against the provider registry.
    /// An empty source list selects every known source.
    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, EdgeError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let entries = if config.sources.is_empty() {
            providers::SOURCE_NAMES
                .iter()
                .map(|name| SourceEntry::Shorthand(name.to_string()))
                .collect()
        } else {
            config.sources
        };

        let mut sources = Vec::new();
        for entry in entries {
            let (name, aliases) = match entry {
                SourceEntry::Shorthand(name) => (name, None),
                SourceEntry::Detailed(obj) => (obj.name, obj.aliases),
            };
            let source = providers::source_definition(&name)?;
            let aliases = match aliases {
                Some(aliases) => {
                    for alias in &aliases {
                        source.key(alias)?;
                    }
                    aliases
                }
                None => source.aliases().keys().cloned().collect(),
            };
            if sources.iter().any(|req: &SourceRequest| req.name == name) {
                return Err(EdgeError::ConfigParse(format!(
                    "source listed more than once: {name}"
                )));
            }
            sources.push(SourceRequest { name, aliases });
        }

        let workers = config
            .workers
            .filter(|workers| *workers > 0)
            .unwrap_or_else(default_workers);
        let chunk_lines = config
            .chunk_lines
            .filter(|lines| *lines > 0)
            .unwrap_or(DEFAULT_CHUNK_LINES);

        Ok(ResolvedConfig {
            schema_version,
            data_dir: config.data_dir,
            cache_dir: config.cache_dir,
            merged_output: config.merged_output,
            workers,
            chunk_lines,
            verify_merge: config.verify_merge.unwrap_or(false),
            sources,
        })
    }
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4)
}
