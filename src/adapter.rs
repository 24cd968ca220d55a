use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::cache::VersionCache;
use crate::domain::{FetchDecision, LocalState, Source, SourceKey, VersionRecord};
use crate::error::EdgeError;
use crate::http::{HttpTransport, RemoteMeta};
use crate::normalize::RecordStream;
use crate::store::Store;

/// Everything an adapter may touch while probing, owned by the run.
pub struct ProbeContext<'a> {
    pub transport: &'a dyn HttpTransport,
    pub cache: &'a VersionCache,
    pub store: &'a Store,
}

impl<'a> ProbeContext<'a> {
    pub fn new(transport: &'a dyn HttpTransport, cache: &'a VersionCache, store: &'a Store) -> Self {
        Self {
            transport,
            cache,
            store,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub source: String,
    pub base_url: String,
    pub aliases: Vec<CleanAlias>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanAlias {
    pub alias: String,
    pub label: String,
    pub version: Option<String>,
    pub version_date: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Contract shared by every external source.
///
/// Implementors supply the source identity, a raw version probe, the URL
/// builder and the normalizer. Caching, local state lookup, remote metadata
/// and the staleness decision come from the provided methods, which
/// adapters may override when a source exposes something better.
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> &Source;

    /// Uncached version lookup against the remote.
    fn probe_version(&self, ctx: &ProbeContext<'_>, alias: &str) -> Result<String, EdgeError>;

    /// Pure URL builder; must not touch the network.
    fn remote_url_for(&self, version: &str, alias: &str) -> String;

    fn normalize(&self, alias: &str, raw: &Path) -> Result<RecordStream, EdgeError>;

    /// File name used for the raw download of `alias`.
    fn file_name(&self, alias: &str) -> String;

    fn key(&self, alias: &str) -> Result<SourceKey, EdgeError> {
        self.source().key(alias)
    }

    fn get_source_version(&self, ctx: &ProbeContext<'_>, alias: &str) -> Result<String, EdgeError> {
        let key = self.key(alias)?;
        ctx.cache
            .get_or_probe(&key, || self.probe_version(ctx, alias))
    }

    fn get_source_version_date(
        &self,
        _ctx: &ProbeContext<'_>,
        alias: &str,
    ) -> Result<Option<DateTime<Utc>>, EdgeError> {
        self.key(alias)?;
        Ok(None)
    }

    fn get_local_file_info(
        &self,
        ctx: &ProbeContext<'_>,
        alias: &str,
    ) -> Result<Option<LocalState>, EdgeError> {
        ctx.store.read_local_state(&self.key(alias)?)
    }

    fn get_remote_url(&self, ctx: &ProbeContext<'_>, alias: &str) -> Result<String, EdgeError> {
        let version = self.get_source_version(ctx, alias)?;
        Ok(self.remote_url_for(&version, alias))
    }

    /// One `HEAD` against the remote URL.
    fn get_remote_meta(&self, ctx: &ProbeContext<'_>, alias: &str) -> Result<RemoteMeta, EdgeError> {
        let key = self.key(alias)?;
        let url = self.get_remote_url(ctx, alias)?;
        ctx.transport
            .head(&url)
            .map_err(|err| EdgeError::probe(&key, err))
    }

    fn get_remote_file_size(&self, ctx: &ProbeContext<'_>, alias: &str) -> Result<u64, EdgeError> {
        let key = self.key(alias)?;
        self.get_remote_meta(ctx, alias)?
            .content_length
            .ok_or_else(|| EdgeError::probe(&key, "remote reports no content length"))
    }

    fn get_remote_file_modified(
        &self,
        ctx: &ProbeContext<'_>,
        alias: &str,
    ) -> Result<DateTime<Utc>, EdgeError> {
        let key = self.key(alias)?;
        self.get_remote_meta(ctx, alias)?
            .last_modified
            .ok_or_else(|| EdgeError::probe(&key, "remote reports no modification time"))
    }

    /// The version is required; size and modified time degrade to unknown.
    /// Both come from a single `HEAD`.
    fn remote_version_record(
        &self,
        ctx: &ProbeContext<'_>,
        alias: &str,
    ) -> Result<VersionRecord, EdgeError> {
        let key = self.key(alias)?;
        let version = self.get_source_version(ctx, alias)?;
        let meta = match self.get_remote_meta(ctx, alias) {
            Ok(meta) => meta,
            Err(err) => {
                debug!(key = %key, error = %err, "remote metadata unsupported");
                RemoteMeta::default()
            }
        };
        if meta.content_length.is_none() {
            debug!(key = %key, "remote size unsupported");
        }
        if meta.last_modified.is_none() {
            debug!(key = %key, "remote modified time unsupported");
        }
        Ok(VersionRecord {
            version,
            modified_time: meta.last_modified,
            size: meta.content_length,
        })
    }

    /// Remote view plus the decision derived from it, so callers that go on
    /// to fetch can persist what they compared against.
    fn assess(
        &self,
        ctx: &ProbeContext<'_>,
        alias: &str,
    ) -> Result<(VersionRecord, FetchDecision), EdgeError> {
        let local = self.get_local_file_info(ctx, alias)?;
        let remote = self.remote_version_record(ctx, alias)?;
        let decision = FetchDecision::compare(&remote, local.as_ref());
        Ok((remote, decision))
    }

    fn is_stale(&self, ctx: &ProbeContext<'_>, alias: &str) -> Result<FetchDecision, EdgeError> {
        self.assess(ctx, alias).map(|(_, decision)| decision)
    }

    /// Smoke test for a new adapter: probes every alias and records the
    /// outcome instead of failing.
    fn clean(&self, ctx: &ProbeContext<'_>) -> CleanReport {
        let source = self.source();
        let aliases = source
            .aliases()
            .iter()
            .map(|(alias, label)| {
                let mut entry = CleanAlias {
                    alias: alias.clone(),
                    label: label.clone(),
                    version: None,
                    version_date: None,
                    error: None,
                };
                match self.get_source_version(ctx, alias) {
                    Ok(version) => entry.version = Some(version),
                    Err(err) => entry.error = Some(err.to_string()),
                }
                match self.get_source_version_date(ctx, alias) {
                    Ok(date) => entry.version_date = date,
                    Err(err) => {
                        entry.error.get_or_insert_with(|| err.to_string());
                    }
                }
                entry
            })
            .collect();
        CleanReport {
            source: source.name().to_string(),
            base_url: source.base_url().to_string(),
            aliases,
        }
    }
}

impl std::fmt::Debug for dyn SourceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceAdapter")
            .field("source", self.source())
            .finish_non_exhaustive()
    }
}
