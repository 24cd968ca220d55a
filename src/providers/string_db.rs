use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

use crate::adapter::{ProbeContext, SourceAdapter};
use crate::domain::{Record, Source};
use crate::error::EdgeError;
use crate::normalize::{RecordStream, line_records};

pub const NAME: &str = "string";

const DOWNLOAD_PAGE: &str = "https://string-db.org/cgi/download";
const DOWNLOAD_ROOT: &str = "https://stringdb-downloads.org/download";

static VERSION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)this\s+is\s+version\s+([0-9]+(?:\.[0-9]+)*)\s+of\s+string")
        .expect("STRING version pattern")
});

static RELEASE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)released\s+(?:on\s+)?(\d{4}-\d{2}-\d{2})").expect("STRING release pattern")
});

const EVIDENCE_COLUMNS: [&str; 8] = [
    "neighborhood",
    "fusion",
    "cooccurence",
    "coexpression",
    "experimental",
    "database",
    "textmining",
    "combined_score",
];

/// STRING protein-protein links, one alias per NCBI taxonomy id.
pub struct StringDb {
    source: Source,
}

impl StringDb {
    pub fn new() -> Self {
        Self {
            source: definition(),
        }
    }
}

impl Default for StringDb {
    fn default() -> Self {
        Self::new()
    }
}

pub fn definition() -> Source {
    Source::new(
        NAME,
        "https://string-db.org",
        [
            ("9606", "Homo sapiens"),
            ("10090", "Mus musculus"),
            ("10116", "Rattus norvegicus"),
            ("7227", "Drosophila melanogaster"),
            ("6239", "Caenorhabditis elegans"),
            ("4932", "Saccharomyces cerevisiae"),
            ("511145", "Escherichia coli K-12 MG1655"),
        ],
    )
}

pub fn parse_version(html: &str) -> Option<String> {
    VERSION_MARKER
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn parse_release_date(html: &str) -> Option<DateTime<Utc>> {
    let caps = RELEASE_MARKER.captures(html)?;
    let date = NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

fn download_page(ctx: &ProbeContext<'_>) -> Result<String, EdgeError> {
    ctx.cache
        .get_or_fetch_page(DOWNLOAD_PAGE, || ctx.transport.get_text(DOWNLOAD_PAGE))
}

fn parse_line(line: &str) -> Result<Option<Record>, String> {
    let columns: Vec<&str> = line.split_whitespace().collect();
    if columns.is_empty() || columns[0] == "protein1" {
        return Ok(None);
    }
    if columns.len() != 2 + EVIDENCE_COLUMNS.len() {
        return Err(format!(
            "expected {} columns, found {}",
            2 + EVIDENCE_COLUMNS.len(),
            columns.len()
        ));
    }
    for (value, name) in columns[2..].iter().zip(EVIDENCE_COLUMNS) {
        value
            .parse::<u32>()
            .map_err(|_| format!("{name} is not an integer score: {value}"))?;
    }
    Ok(Some(Record::new(
        columns[0],
        columns[1],
        columns[2..].iter().map(|value| value.to_string()).collect(),
    )))
}

impl SourceAdapter for StringDb {
    fn source(&self) -> &Source {
        &self.source
    }

    fn probe_version(&self, ctx: &ProbeContext<'_>, alias: &str) -> Result<String, EdgeError> {
        let key = self.key(alias)?;
        let html = download_page(ctx).map_err(|err| EdgeError::probe(&key, err))?;
        parse_version(&html).ok_or_else(|| {
            EdgeError::probe(&key, format!("version marker not found on {DOWNLOAD_PAGE}"))
        })
    }

    fn get_source_version_date(
        &self,
        ctx: &ProbeContext<'_>,
        alias: &str,
    ) -> Result<Option<DateTime<Utc>>, EdgeError> {
        let key = self.key(alias)?;
        let html = download_page(ctx).map_err(|err| EdgeError::probe(&key, err))?;
        Ok(parse_release_date(&html))
    }

    fn remote_url_for(&self, version: &str, alias: &str) -> String {
        format!(
            "{DOWNLOAD_ROOT}/protein.links.detailed.v{version}/{alias}.protein.links.detailed.v{version}.txt.gz"
        )
    }

    fn normalize(&self, alias: &str, raw: &Path) -> Result<RecordStream, EdgeError> {
        line_records(self.key(alias)?, raw, parse_line)
    }

    fn file_name(&self, alias: &str) -> String {
        format!("{alias}.protein.links.detailed.txt.gz")
    }
}
