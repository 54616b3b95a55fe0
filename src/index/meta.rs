use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::Schema;
use crate::error::Result;

pub const FIRST_SEGMENT_SUFFIX: u64 = 1000;

/// Persistent state of an index, stored as `{name}.meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMeta {
    pub name: String,
    pub schema: Schema,
    pub start_doc_id: u64,
    pub max_doc_id: u64,
    #[serde(default)]
    pub deleted_since_merge: u64,
    pub next_segment_suffix: u64,
    #[serde(default)]
    pub segment_names: Vec<String>,
}

impl IndexMeta {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            schema: Schema::new(),
            start_doc_id: 0,
            max_doc_id: 0,
            deleted_since_merge: 0,
            next_segment_suffix: FIRST_SEGMENT_SUFFIX,
            segment_names: Vec::new(),
        }
    }

    pub fn path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.meta"))
    }

    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let bytes = fs::read(Self::path(dir, name))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Writes the meta file atomically (temp file + rename).
    pub fn store(&self, dir: &Path) -> Result<()> {
        let path = Self::path(dir, &self.name);
        let tmp = path.with_extension("meta.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Reserves the directory name for the next segment.
    pub fn next_segment_name(&mut self) -> String {
        let name = format!("{}_{}", self.name, self.next_segment_suffix);
        self.next_segment_suffix += 1;
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FieldType;
    use tempfile::TempDir;

    #[test]
    fn test_meta_roundtrip_and_suffixes() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let mut meta = IndexMeta::new("books");
        assert_eq!(meta.next_segment_name(), "books_1000");
        assert_eq!(meta.next_segment_name(), "books_1001");
        meta.schema.fields.insert("year".into(), FieldType::Number);
        meta.max_doc_id = 7;
        meta.store(dir.path())?;

        let loaded = IndexMeta::load(dir.path(), "books")?;
        assert_eq!(loaded, meta);

        let json = fs::read_to_string(IndexMeta::path(dir.path(), "books"))?;
        assert!(json.contains("\"nextSegmentSuffix\": 1002"));
        assert!(json.contains("\"maxDocId\": 7"));
        Ok(())
    }
}
