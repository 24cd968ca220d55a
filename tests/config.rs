mod common;

use assert_matches::assert_matches;

use kira_edges::app::App;
use kira_edges::config::ConfigLoader;
use kira_edges::error::EdgeError;

use common::{MockTransport, temp_store};

fn write_config(dir: &tempfile::TempDir, body: &str) -> String {
    let path = dir.path().join("kira-edges.json");
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn resolves_mixed_source_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "workers": 3,
            "chunk_lines": 500,
            "verify_merge": true,
            "merged_output": "out/edges.tsv",
            "sources": ["kegg", {"name": "string", "aliases": ["9606", "10090"]}]
        }"#,
    );

    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();
    assert_eq!(resolved.workers, 3);
    assert_eq!(resolved.chunk_lines, 500);
    assert!(resolved.verify_merge);
    assert_eq!(resolved.sources[0].name, "kegg");
    assert_eq!(resolved.sources[0].aliases.len(), 6);
    assert_eq!(resolved.sources[1].aliases, ["9606", "10090"]);
}

#[test]
fn empty_source_list_selects_every_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "{}");

    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();
    let names: Vec<&str> = resolved.sources.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["string", "reactome", "kegg"]);
    assert!(resolved.workers > 0);
}

#[test]
fn config_errors_are_typed() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(Some(&missing.to_string_lossy())),
        Err(EdgeError::ConfigRead(_))
    );

    let path = write_config(&dir, "{ not json");
    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(EdgeError::ConfigParse(_))
    );

    let path = write_config(&dir, r#"{"sources": ["biogrid"]}"#);
    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(EdgeError::UnknownSource(name)) if name == "biogrid"
    );

    let path = write_config(&dir, r#"{"sources": ["kegg", "kegg"]}"#);
    assert_matches!(
        ConfigLoader::resolve(Some(&path)),
        Err(EdgeError::ConfigParse(_))
    );
}

#[test]
fn app_from_config_registers_requested_sources() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"{"merged_output": "/tmp/custom-edges.tsv", "sources": [{"name": "kegg", "aliases": ["hsa"]}]}"#,
    );
    let resolved = ConfigLoader::resolve(Some(&path)).unwrap();
    let (_temp, store) = temp_store();

    let app = App::from_config(store, MockTransport::new(), &resolved).unwrap();
    assert_eq!(app.merged_output().as_str(), "/tmp/custom-edges.tsv");
    assert!(app.clean("kegg").is_ok());
    assert_matches!(app.clean("string"), Err(EdgeError::UnknownSource(_)));
}
