pub mod kegg;
pub mod reactome;
pub mod string_db;

use std::sync::Arc;

use crate::adapter::SourceAdapter;
use crate::domain::Source;
use crate::error::EdgeError;

pub const SOURCE_NAMES: [&str; 3] = [string_db::NAME, reactome::NAME, kegg::NAME];

pub fn source_definition(name: &str) -> Result<Source, EdgeError> {
    match name {
        string_db::NAME => Ok(string_db::definition()),
        reactome::NAME => Ok(reactome::definition()),
        kegg::NAME => Ok(kegg::definition()),
        other => Err(EdgeError::UnknownSource(other.to_string())),
    }
}

pub fn build(name: &str) -> Result<Arc<dyn SourceAdapter>, EdgeError> {
    match name {
        string_db::NAME => Ok(Arc::new(string_db::StringDb::new())),
        reactome::NAME => Ok(Arc::new(reactome::Reactome::new())),
        kegg::NAME => Ok(Arc::new(kegg::Kegg::new())),
        other => Err(EdgeError::UnknownSource(other.to_string())),
    }
}
