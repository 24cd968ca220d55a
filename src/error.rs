use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum EdgeError {
    #[error("version probe failed for {key}: {message}")]
    Probe { key: String, message: String },

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("unknown alias {alias} for source {source_name}")]
    UnknownAlias { source_name: String, alias: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("remote returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("failed to normalize {key} at line {line}: {message}")]
    Normalization {
        key: String,
        line: usize,
        message: String,
    },

    #[error("merge failed: {0}")]
    MergeIo(String),

    #[error("missing config file kira-edges.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("invalid job list: {0}")]
    JobList(String),
}

impl EdgeError {
    pub fn probe(key: impl ToString, message: impl ToString) -> Self {
        EdgeError::Probe {
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    /// Short category label used in run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EdgeError::Probe { .. } => "probe",
            EdgeError::UnknownSource(_) | EdgeError::UnknownAlias { .. } => "config",
            EdgeError::Http(_) | EdgeError::HttpStatus { .. } => "fetch",
            EdgeError::Normalization { .. } => "normalization",
            EdgeError::MergeIo(_) => "merge",
            EdgeError::MissingConfig | EdgeError::ConfigRead(_) | EdgeError::ConfigParse(_) => {
                "config"
            }
            EdgeError::Filesystem(_) => "filesystem",
            EdgeError::JobList(_) => "jobs",
        }
    }
}
