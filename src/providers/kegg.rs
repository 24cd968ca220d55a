use std::path::Path;

use crate::adapter::{ProbeContext, SourceAdapter};
use crate::domain::{Record, Source};
use crate::error::EdgeError;
use crate::normalize::{RecordStream, line_records};

pub const NAME: &str = "kegg";

/// KEGG REST does not version its link tables.
pub const SENTINEL_VERSION: &str = "current";

/// KEGG gene to pathway links, one alias per organism code.
pub struct Kegg {
    source: Source,
}

impl Kegg {
    pub fn new() -> Self {
        Self {
            source: definition(),
        }
    }
}

impl Default for Kegg {
    fn default() -> Self {
        Self::new()
    }
}

pub fn definition() -> Source {
    Source::new(
        NAME,
        "https://rest.kegg.jp",
        [
            ("hsa", "Homo sapiens"),
            ("mmu", "Mus musculus"),
            ("rno", "Rattus norvegicus"),
            ("dme", "Drosophila melanogaster"),
            ("sce", "Saccharomyces cerevisiae"),
            ("eco", "Escherichia coli K-12 MG1655"),
        ],
    )
}

fn parse_line(line: &str) -> Result<Option<Record>, String> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let (gene, pathway) = line
        .split_once('\t')
        .ok_or_else(|| "expected gene and pathway columns".to_string())?;
    if pathway.contains('\t') {
        return Err("expected exactly two columns".to_string());
    }
    Ok(Some(Record::new(gene.trim(), pathway.trim(), Vec::new())))
}

impl SourceAdapter for Kegg {
    fn source(&self) -> &Source {
        &self.source
    }

    fn probe_version(&self, _ctx: &ProbeContext<'_>, alias: &str) -> Result<String, EdgeError> {
        self.key(alias)?;
        Ok(SENTINEL_VERSION.to_string())
    }

    fn remote_url_for(&self, _version: &str, alias: &str) -> String {
        format!("{}/link/pathway/{alias}", self.source.base_url())
    }

    fn normalize(&self, alias: &str, raw: &Path) -> Result<RecordStream, EdgeError> {
        line_records(self.key(alias)?, raw, parse_line)
    }

    fn file_name(&self, alias: &str) -> String {
        format!("{alias}.pathway.links.tsv")
    }
}
