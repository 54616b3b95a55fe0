pub mod config;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::analysis::{Tokenizer, UnicodeTokenizer};
use crate::data::{Document, FieldType};
use crate::error::{Result, TesseraError};
use crate::index::Index;
use crate::search::{SearchRequest, SearchResult};

use self::config::IndexConfig;

const ENGINE_META_FILE: &str = "engine.idm.meta";

/// Persistent list of managed indexes: name to directory relative to the root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct EngineMeta {
    indexes: BTreeMap<String, String>,
}

impl EngineMeta {
    fn load(root: &Path) -> Result<Self> {
        let path = root.join(ENGINE_META_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    fn store(&self, root: &Path) -> Result<()> {
        let path = root.join(ENGINE_META_FILE);
        let tmp = path.with_extension("meta.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Manages the named indexes living under one root directory.
///
/// Every index gets its own sub-directory `{root}/{name}/`. All indexes share
/// the engine's [`IndexConfig`] and tokenizer.
#[derive(Debug)]
pub struct Engine {
    root: PathBuf,
    config: IndexConfig,
    tokenizer: Arc<dyn Tokenizer>,
    indexes: RwLock<BTreeMap<String, Arc<Index>>>,
}

impl Engine {
    /// Open (or create) the engine rooted at `root` with the default tokenizer.
    pub fn open<P: AsRef<Path>>(root: P, config: IndexConfig) -> Result<Self> {
        Self::open_with_tokenizer(root, config, Arc::new(UnicodeTokenizer::new()))
    }

    /// Open the engine and reopen every index listed in its metadata.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory holding `engine.idm.meta` and one directory per index.
    /// * `config` - Configuration applied to every index.
    /// * `tokenizer` - Splits `Text` fields and query strings into terms.
    pub fn open_with_tokenizer<P: AsRef<Path>>(
        root: P,
        config: IndexConfig,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let meta = EngineMeta::load(&root)?;

        let mut indexes = BTreeMap::new();
        for (name, dir) in &meta.indexes {
            let index = Index::open(root.join(dir), name, config.clone(), Arc::clone(&tokenizer))?;
            indexes.insert(name.clone(), Arc::new(index));
        }
        log::info!(
            "engine opened at {} with {} indexes",
            root.display(),
            indexes.len()
        );

        Ok(Self {
            root,
            config,
            tokenizer,
            indexes: RwLock::new(indexes),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn store_meta(&self, indexes: &BTreeMap<String, Arc<Index>>) -> Result<()> {
        EngineMeta {
            indexes: indexes
                .keys()
                .map(|name| (name.clone(), name.clone()))
                .collect(),
        }
        .store(&self.root)
    }

    /// Create an index with an initial set of fields.
    pub fn create_index(&self, name: &str, fields: &[(&str, FieldType)]) -> Result<Arc<Index>> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(TesseraError::invalid_argument(format!(
                "invalid index name {name:?}"
            )));
        }
        let mut indexes = self.indexes.write();
        if indexes.contains_key(name) {
            return Err(TesseraError::index(format!("index `{name}` already exists")));
        }

        let index = Index::create(
            self.root.join(name),
            name,
            self.config.clone(),
            Arc::clone(&self.tokenizer),
        )?;
        for (field, field_type) in fields {
            index.add_field(field, *field_type)?;
        }
        let index = Arc::new(index);
        indexes.insert(name.to_string(), Arc::clone(&index));
        self.store_meta(&indexes)?;
        Ok(index)
    }

    pub fn index(&self, name: &str) -> Option<Arc<Index>> {
        self.indexes.read().get(name).cloned()
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indexes.read().keys().cloned().collect()
    }

    fn require(&self, name: &str) -> Result<Arc<Index>> {
        self.index(name)
            .ok_or_else(|| TesseraError::not_found(format!("index `{name}` not found")))
    }

    pub fn add_field(&self, index: &str, field: &str, field_type: FieldType) -> Result<()> {
        self.require(index)?.add_field(field, field_type)
    }

    pub fn delete_field(&self, index: &str, field: &str) -> Result<()> {
        self.require(index)?.delete_field(field)
    }

    pub fn add_document(&self, index: &str, doc: &Document) -> Result<u64> {
        self.require(index)?.add_document(doc)
    }

    pub fn update_document(&self, index: &str, doc: &Document) -> Result<u64> {
        self.require(index)?.update_document(doc)
    }

    pub fn delete_document(&self, index: &str, primary_key: &str) -> Result<bool> {
        self.require(index)?.delete_document(primary_key)
    }

    pub fn get_document(&self, index: &str, doc_id: u64) -> Result<Option<Document>> {
        self.require(index)?.get_document(doc_id)
    }

    /// Seal the index's mutable segment.
    pub fn sync(&self, index: &str) -> Result<bool> {
        self.require(index)?.sync_memory_segment()
    }

    /// Merge the index's small trailing segments.
    pub fn merge(&self, index: &str) -> Result<bool> {
        self.require(index)?.merge_segments(None)
    }

    /// Search with request parameters such as `title=rust`, `~year=2000,2010`
    /// or `curPage=2`. See [`SearchRequest::parse`].
    pub fn search(&self, index: &str, params: &[(String, String)]) -> Result<SearchResult> {
        let index = self.require(index)?;
        let request = SearchRequest::parse(
            params.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            &index.schema(),
            index.tokenizer(),
            self.config.default_page_size,
        )?;
        index.search(&request)
    }

    /// Close an index and delete its files.
    pub fn drop_index(&self, name: &str) -> Result<()> {
        let mut indexes = self.indexes.write();
        let index = indexes
            .remove(name)
            .ok_or_else(|| TesseraError::not_found(format!("index `{name}` not found")))?;
        self.store_meta(&indexes)?;
        index.destroy()?;

        let dir = index.dir().to_path_buf();
        drop(index);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        log::info!("dropped index {name}");
        Ok(())
    }

    /// Merge every index whose trailing small segments reached the
    /// configured count. Returns the number of indexes merged.
    pub fn maintain(&self) -> Result<usize> {
        let indexes: Vec<Arc<Index>> = self.indexes.read().values().cloned().collect();
        let mut merged = 0;
        for index in indexes {
            if index.check_merge() && index.merge_segments(None)? {
                merged += 1;
            }
        }
        Ok(merged)
    }

    /// Close every index. Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        for index in self.indexes.read().values() {
            index.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_meta_lists_indexes() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open(dir.path(), IndexConfig::default())?;
        engine.create_index("books", &[("id", FieldType::PrimaryKey)])?;
        engine.create_index("films", &[])?;

        let meta = EngineMeta::load(dir.path())?;
        assert_eq!(
            meta.indexes.keys().cloned().collect::<Vec<_>>(),
            vec!["books".to_string(), "films".to_string()]
        );
        assert!(engine.create_index("books", &[]).is_err());
        assert!(engine.create_index("../x", &[]).is_err());
        assert!(engine.add_document("missing", &Document::new()).is_err());
        Ok(())
    }
}
