use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::EdgeError;

/// Static identity of an external data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    name: String,
    base_url: String,
    aliases: BTreeMap<String, String>,
}

impl Source {
    pub fn new<I, A, L>(name: &str, base_url: &str, aliases: I) -> Self
    where
        I: IntoIterator<Item = (A, L)>,
        A: Into<String>,
        L: Into<String>,
    {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            aliases: aliases
                .into_iter()
                .map(|(alias, label)| (alias.into(), label.into()))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    pub fn label(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    pub fn key(&self, alias: &str) -> Result<SourceKey, EdgeError> {
        if !self.aliases.contains_key(alias) {
            return Err(EdgeError::UnknownAlias {
                source_name: self.name.clone(),
                alias: alias.to_string(),
            });
        }
        Ok(SourceKey::new(&self.name, alias))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub source: String,
    pub alias: String,
}

impl SourceKey {
    pub fn new(source: &str, alias: &str) -> Self {
        Self {
            source: source.to_string(),
            alias: alias.to_string(),
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.alias)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: String,
    pub modified_time: Option<DateTime<Utc>>,
    pub size: Option<u64>,
}

impl VersionRecord {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            modified_time: None,
            size: None,
        }
    }
}

/// What a previous successful fetch left on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    pub version: String,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub fetched_at: Option<String>,
    #[serde(default)]
    pub records: Option<u64>,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
}

impl LocalState {
    pub fn from_remote(remote: &VersionRecord) -> Self {
        Self {
            version: remote.version.clone(),
            modified_time: remote.modified_time,
            size: remote.size,
            fetched_at: None,
            records: None,
            remote_url: None,
            tool: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StaleReason {
    NeverFetched,
    VersionChanged { local: String, remote: String },
    SizeChanged { local: Option<u64>, remote: u64 },
    ModifiedChanged {
        local: Option<DateTime<Utc>>,
        remote: DateTime<Utc>,
    },
    Fresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchDecision {
    pub stale: bool,
    #[serde(flatten)]
    pub reason: StaleReason,
}

impl FetchDecision {
    /// Compares the remote view against what is on disk.
    ///
    /// Size is checked whenever the remote reports it, so a source that
    /// republishes corrected data under the same version token is still
    /// picked up. The modified time only participates when the remote
    /// exposes one.
    pub fn compare(remote: &VersionRecord, local: Option<&LocalState>) -> Self {
        let Some(local) = local else {
            return Self::stale(StaleReason::NeverFetched);
        };

        if remote.version != local.version {
            return Self::stale(StaleReason::VersionChanged {
                local: local.version.clone(),
                remote: remote.version.clone(),
            });
        }

        if let Some(size) = remote.size {
            if local.size != Some(size) {
                return Self::stale(StaleReason::SizeChanged {
                    local: local.size,
                    remote: size,
                });
            }
        }

        if let Some(modified) = remote.modified_time {
            if local.modified_time != Some(modified) {
                return Self::stale(StaleReason::ModifiedChanged {
                    local: local.modified_time,
                    remote: modified,
                });
            }
        }

        Self {
            stale: false,
            reason: StaleReason::Fresh,
        }
    }

    fn stale(reason: StaleReason) -> Self {
        Self {
            stale: true,
            reason,
        }
    }
}

/// One canonical edge line: `node1 \t node2 \t extras... \t table_hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub node1: String,
    pub node2: String,
    pub extras: Vec<String>,
}

impl Record {
    pub fn new(node1: impl Into<String>, node2: impl Into<String>, extras: Vec<String>) -> Self {
        Self {
            node1: node1.into(),
            node2: node2.into(),
            extras,
        }
    }

    fn fields(&self) -> impl Iterator<Item = &str> {
        [self.node1.as_str(), self.node2.as_str()]
            .into_iter()
            .chain(self.extras.iter().map(String::as_str))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.node1.is_empty() || self.node2.is_empty() {
            return Err("empty node identifier".to_string());
        }
        if let Some(bad) = self
            .fields()
            .find(|field| field.contains(['\t', '\n', '\r']))
        {
            return Err(format!("field contains a tab or newline: {bad:?}"));
        }
        Ok(())
    }

    /// Hex SHA-256 of the data columns joined by tabs.
    pub fn table_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for (idx, field) in self.fields().enumerate() {
            if idx > 0 {
                hasher.update(b"\t");
            }
            hasher.update(field.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// The line body without its terminator.
    pub fn to_row(&self) -> String {
        let mut row = self.fields().collect::<Vec<_>>().join("\t");
        row.push('\t');
        row.push_str(&self.table_hash());
        row
    }

    pub fn to_line(&self) -> String {
        let mut line = self.to_row();
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    fn local(version: &str, size: Option<u64>) -> LocalState {
        LocalState {
            size,
            ..LocalState::from_remote(&VersionRecord::new(version))
        }
    }

    #[test]
    fn never_fetched_is_stale() {
        let decision = FetchDecision::compare(&VersionRecord::new("12.0"), None);
        assert!(decision.stale);
        assert_eq!(decision.reason, StaleReason::NeverFetched);
    }

    #[test]
    fn equal_on_all_fields_is_fresh() {
        let modified = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let remote = VersionRecord {
            version: "12.0".to_string(),
            modified_time: Some(modified),
            size: Some(42),
        };
        let decision = FetchDecision::compare(&remote, Some(&LocalState::from_remote(&remote)));
        assert!(!decision.stale);
    }

    #[test]
    fn size_overrides_equal_version() {
        let remote = VersionRecord {
            size: Some(100),
            ..VersionRecord::new("92")
        };
        let decision = FetchDecision::compare(&remote, Some(&local("92", Some(99))));
        assert!(decision.stale);
        assert_matches!(decision.reason, StaleReason::SizeChanged { remote: 100, .. });
    }

    #[test]
    fn missing_remote_metadata_falls_back_to_version() {
        let decision = FetchDecision::compare(&VersionRecord::new("current"), Some(&local("current", None)));
        assert!(!decision.stale);

        let decision = FetchDecision::compare(&VersionRecord::new("93"), Some(&local("92", Some(1))));
        assert_matches!(decision.reason, StaleReason::VersionChanged { .. });
    }

    #[test]
    fn changed_modified_time_is_stale() {
        let before = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut state = local("v1", None);
        state.modified_time = Some(before);
        let remote = VersionRecord {
            modified_time: Some(after),
            ..VersionRecord::new("v1")
        };
        assert_matches!(
            FetchDecision::compare(&remote, Some(&state)).reason,
            StaleReason::ModifiedChanged { .. }
        );
    }

    #[test]
    fn record_line_ends_with_hash() {
        let record = Record::new("a", "b", vec!["700".to_string()]);
        let line = record.to_line();
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        assert_eq!(&fields[..3], &["a", "b", "700"]);
        assert_eq!(fields[3].len(), 64);
        assert_eq!(fields[3], record.table_hash());
    }

    #[test]
    fn record_rejects_embedded_tabs() {
        let record = Record::new("a\tx", "b", Vec::new());
        assert!(record.validate().is_err());
    }
}
