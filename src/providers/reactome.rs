use std::path::Path;

use crate::adapter::{ProbeContext, SourceAdapter};
use crate::domain::{Record, Source};
use crate::error::EdgeError;
use crate::normalize::{RecordStream, line_records};

pub const NAME: &str = "reactome";

const VERSION_ENDPOINT: &str = "https://reactome.org/ContentService/data/database/version";

/// Reactome identifier-to-pathway mapping files.
pub struct Reactome {
    source: Source,
}

impl Reactome {
    pub fn new() -> Self {
        Self {
            source: definition(),
        }
    }
}

impl Default for Reactome {
    fn default() -> Self {
        Self::new()
    }
}

pub fn definition() -> Source {
    Source::new(
        NAME,
        "https://reactome.org",
        [
            (
                "UniProt2Reactome",
                "UniProt to lowest level pathway diagram",
            ),
            (
                "UniProt2Reactome_All_Levels",
                "UniProt to all pathways",
            ),
            ("ChEBI2Reactome", "ChEBI to lowest level pathway diagram"),
        ],
    )
}

/// The content service answers with a bare release number.
pub fn parse_version(body: &str) -> Option<String> {
    let trimmed = body.trim();
    (!trimmed.is_empty() && trimmed.chars().all(|ch| ch.is_ascii_digit()))
        .then(|| trimmed.to_string())
}

// identifier, pathway, url, pathway name, evidence, species
fn parse_line(line: &str) -> Result<Option<Record>, String> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let columns: Vec<&str> = line.split('\t').collect();
    if columns.len() != 6 {
        return Err(format!("expected 6 columns, found {}", columns.len()));
    }
    Ok(Some(Record::new(
        columns[0].trim(),
        columns[1].trim(),
        vec![
            columns[3].trim().to_string(),
            columns[4].trim().to_string(),
            columns[5].trim().to_string(),
        ],
    )))
}

impl SourceAdapter for Reactome {
    fn source(&self) -> &Source {
        &self.source
    }

    fn probe_version(&self, ctx: &ProbeContext<'_>, alias: &str) -> Result<String, EdgeError> {
        let key = self.key(alias)?;
        let body = ctx
            .transport
            .get_text(VERSION_ENDPOINT)
            .map_err(|err| EdgeError::probe(&key, err))?;
        parse_version(&body).ok_or_else(|| {
            EdgeError::probe(&key, format!("unexpected version response: {}", body.trim()))
        })
    }

    // Reactome only publishes the current release under a stable path.
    fn remote_url_for(&self, _version: &str, alias: &str) -> String {
        format!("{}/download/current/{alias}.txt", self.source.base_url())
    }

    fn normalize(&self, alias: &str, raw: &Path) -> Result<RecordStream, EdgeError> {
        line_records(self.key(alias)?, raw, parse_line)
    }

    fn file_name(&self, alias: &str) -> String {
        format!("{alias}.txt")
    }
}
