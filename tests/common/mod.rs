#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use kira_edges::app::{ProgressEvent, ProgressSink};
use kira_edges::error::EdgeError;
use kira_edges::http::{HttpTransport, RemoteMeta};
use kira_edges::store::Store;

pub const STRING_PAGE: &str = "https://string-db.org/cgi/download";
pub const REACTOME_VERSION: &str = "https://reactome.org/ContentService/data/database/version";

/// In-memory stand-in for the network.
#[derive(Default)]
pub struct MockTransport {
    pages: Mutex<HashMap<String, String>>,
    heads: Mutex<HashMap<String, RemoteMeta>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    calls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, url: &str, body: &str) -> Self {
        self.set_page(url, body);
        self
    }

    pub fn set_page(&self, url: &str, body: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
    }

    pub fn file(self, url: &str, content: Vec<u8>) -> Self {
        self.set_file(url, content);
        self
    }

    pub fn set_file(&self, url: &str, content: Vec<u8>) {
        self.files.lock().unwrap().insert(url.to_string(), content);
    }

    pub fn head_meta(self, url: &str, meta: RemoteMeta) -> Self {
        self.heads.lock().unwrap().insert(url.to_string(), meta);
        self
    }

    pub fn calls_to(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, verb: &str, url: &str) {
        self.calls.lock().unwrap().push(format!("{verb} {url}"));
    }
}

impl HttpTransport for MockTransport {
    fn get_text(&self, url: &str) -> Result<String, EdgeError> {
        self.record("GET", url);
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| EdgeError::HttpStatus {
                status: 503,
                message: format!("no page for {url}"),
            })
    }

    fn head(&self, url: &str) -> Result<RemoteMeta, EdgeError> {
        self.record("HEAD", url);
        Ok(self
            .heads
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_default())
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u64, EdgeError> {
        self.record("DOWNLOAD", url);
        let content = self
            .files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| EdgeError::HttpStatus {
                status: 404,
                message: format!("no file for {url}"),
            })?;
        std::fs::write(destination, &content).map_err(|err| EdgeError::Filesystem(err.to_string()))?;
        Ok(content.len() as u64)
    }
}

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

pub fn temp_store() -> (tempfile::TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let store = Store::new_with_paths(root.join("data"), root.join("cache"));
    (temp, store)
}

pub fn gzip(content: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

pub fn string_url(version: &str, taxon: &str) -> String {
    format!(
        "https://stringdb-downloads.org/download/protein.links.detailed.v{version}/{taxon}.protein.links.detailed.v{version}.txt.gz"
    )
}

pub fn string_page(version: &str) -> String {
    format!("<html><body><p>This is version {version} of STRING.</p></body></html>")
}

pub const STRING_LINKS: &str = "protein1 protein2 neighborhood fusion cooccurence coexpression experimental database textmining combined_score\n\
9606.ENSP2 9606.ENSP3 0 0 0 0 0 0 300 300\n\
9606.ENSP1 9606.ENSP2 0 0 0 62 0 0 150 181\n\
9606.ENSP1 9606.ENSP2 0 0 0 62 0 0 150 181\n";

pub const KEGG_HSA: &str = "hsa:10458\tpath:hsa04520\nhsa:10458\tpath:hsa04810\nhsa:1\tpath:hsa00010\n";
