//! Segments: self-contained shards covering a contiguous docId range.
//!
//! A segment starts mutable and in memory, receives documents through
//! [`Segment::add_document`], and is sealed by [`Segment::serialize`] into a
//! directory of immutable, memory-mapped files:
//!
//! ```text
//! {index}_{suffix}/
//!   seg.meta                    JSON: docId range, field types
//!   seg.bt                      B+Tree: range buckets, B+Tree term dictionaries
//!   {field}_invert.fst / .idx   term dictionary + postings
//!   {field}_profile.pfl         forward-store slots / string offsets
//!   {field}_detail.dtl          string payloads
//!   {field}_profileindex.pfi    range-index buckets
//! ```
//!
//! Sealed segments are shared as `Arc<Segment>`. [`Segment::destroy`] only
//! marks a segment; its directory is removed when the last handle drops.

pub mod field;
pub mod invert;
pub mod merge;
pub mod profile;
pub mod profile_index;
pub mod term_index;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::analysis::{SuggestionSink, Tokenizer};
use crate::data::{Document, FieldType, Posting};
use crate::error::{Result, TesseraError};
use crate::storage::{BTreeStore, Tombstones};

use self::field::{Field, FieldMeta};
use self::term_index::TermIndexKind;

pub const SEGMENT_META_FILE: &str = "seg.meta";
pub const SEGMENT_BTREE_FILE: &str = "seg.bt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMeta {
    pub start_doc_id: u64,
    pub max_doc_id: u64,
    pub segment_name: String,
    pub fields: BTreeMap<String, FieldMeta>,
}

impl SegmentMeta {
    pub fn load(dir: &Path) -> Result<Self> {
        let bytes = fs::read(dir.join(SEGMENT_META_FILE))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn store(&self, dir: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(dir.join(SEGMENT_META_FILE), bytes)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Segment {
    name: String,
    dir: PathBuf,
    start_doc_id: u64,
    max_doc_id: u64,
    fields: BTreeMap<String, Field>,
    is_memory: bool,
    doomed: AtomicBool,
}

impl Segment {
    /// Creates an empty mutable segment whose first document will be `start_doc_id`.
    pub fn new(dir: PathBuf, start_doc_id: u64, schema: &BTreeMap<String, FieldType>) -> Self {
        let fields = schema
            .iter()
            .filter(|(_, t)| t.is_stored())
            .map(|(name, t)| (name.clone(), Field::new(name, *t, start_doc_id)))
            .collect();
        Self {
            name: dir_name(&dir),
            dir,
            start_doc_id,
            max_doc_id: start_doc_id,
            fields,
            is_memory: true,
            doomed: AtomicBool::new(false),
        }
    }

    /// Opens a sealed segment directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let meta = SegmentMeta::load(&dir)?;
        let btree = Arc::new(BTreeStore::open(dir.join(SEGMENT_BTREE_FILE))?);
        let mut fields = BTreeMap::new();
        for (name, field_meta) in &meta.fields {
            let field = Field::open(
                name,
                field_meta,
                meta.start_doc_id,
                meta.max_doc_id,
                &dir,
                &btree,
            )?;
            fields.insert(name.clone(), field);
        }
        log::debug!(
            "opened segment {} [{}, {})",
            dir.display(),
            meta.start_doc_id,
            meta.max_doc_id
        );
        Ok(Self {
            name: meta.segment_name,
            dir,
            start_doc_id: meta.start_doc_id,
            max_doc_id: meta.max_doc_id,
            fields,
            is_memory: false,
            doomed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn start_doc_id(&self) -> u64 {
        self.start_doc_id
    }

    pub fn max_doc_id(&self) -> u64 {
        self.max_doc_id
    }

    pub fn doc_count(&self) -> u64 {
        self.max_doc_id - self.start_doc_id
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count() == 0
    }

    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    pub fn contains(&self, doc_id: u64) -> bool {
        doc_id >= self.start_doc_id && doc_id < self.max_doc_id
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn schema(&self) -> BTreeMap<String, FieldType> {
        self.fields
            .iter()
            .map(|(name, field)| (name.clone(), field.field_type()))
            .collect()
    }

    /// Appends a document. All fields are parsed and tokenized before any is
    /// written, so a failing call leaves the segment unchanged.
    pub fn add_document(
        &mut self,
        doc_id: u64,
        doc: &Document,
        tokenizer: &dyn Tokenizer,
        sink: &dyn SuggestionSink,
    ) -> Result<()> {
        if !self.is_memory {
            return Err(TesseraError::invalid_operation(format!(
                "segment {} is sealed",
                self.name
            )));
        }
        if doc_id != self.max_doc_id {
            return Err(TesseraError::invalid_operation(format!(
                "segment {} expected docId {}, got {doc_id}",
                self.name, self.max_doc_id
            )));
        }

        let prepared: Vec<_> = self
            .fields
            .values()
            .map(|field| field.prepare(doc.get(field.name()), tokenizer))
            .collect();

        for (field, value) in self.fields.values_mut().zip(&prepared) {
            field.add_document(doc_id, value)?;
            if field.field_type() == FieldType::Text {
                for (term, _) in &value.terms {
                    sink.insert(term);
                }
            }
        }
        self.max_doc_id += 1;
        Ok(())
    }

    /// Writes this mutable segment to its directory and returns the sealed,
    /// memory-mapped segment. On failure the partial directory is removed and
    /// `self` is left intact.
    pub fn serialize(&self, kind: TermIndexKind) -> Result<Segment> {
        if !self.is_memory {
            return Err(TesseraError::invalid_operation(format!(
                "segment {} is already sealed",
                self.name
            )));
        }
        if let Err(e) = self.write_files(kind) {
            log::error!("failed to serialize segment {}: {e}", self.name);
            if let Err(cleanup) = fs::remove_dir_all(&self.dir) {
                log::warn!("failed to remove {}: {cleanup}", self.dir.display());
            }
            return Err(e);
        }
        log::info!(
            "sealed segment {} with {} documents",
            self.name,
            self.doc_count()
        );
        Segment::open(&self.dir)
    }

    fn write_files(&self, kind: TermIndexKind) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let btree = Arc::new(BTreeStore::open(self.dir.join(SEGMENT_BTREE_FILE))?);
        let mut fields = BTreeMap::new();
        for (name, field) in &self.fields {
            fields.insert(name.clone(), field.serialize(&self.dir, kind, &btree)?);
        }
        SegmentMeta {
            start_doc_id: self.start_doc_id,
            max_doc_id: self.max_doc_id,
            segment_name: self.name.clone(),
            fields,
        }
        .store(&self.dir)
    }

    /// Stored values of `doc_id`, tombstoned or not. `None` outside this segment.
    pub fn get_document(&self, doc_id: u64) -> Result<Option<Document>> {
        if !self.contains(doc_id) {
            return Ok(None);
        }
        let mut doc = Document::new();
        for (name, field) in &self.fields {
            if let Some(value) = field.get(doc_id)? {
                doc.insert(name.clone(), value);
            }
        }
        Ok(Some(doc))
    }

    /// Live postings of `term` in `field`.
    pub fn search_doc_ids(
        &self,
        field: &str,
        term: &str,
        tombstones: &Tombstones,
    ) -> Result<Vec<Posting>> {
        let Some(field) = self.fields.get(field) else {
            return Ok(Vec::new());
        };
        let mut postings = field.search(term)?;
        postings.retain(|p| !tombstones.is_deleted(p.doc_id));
        Ok(postings)
    }

    /// Live docIds whose `field` value lies in `[min, max]`.
    pub fn search_doc_filter(
        &self,
        field: &str,
        min: i64,
        max: i64,
        tombstones: &Tombstones,
    ) -> Result<Vec<u64>> {
        let Some(field) = self.fields.get(field) else {
            return Ok(Vec::new());
        };
        let mut ids = field.filter(min, max)?;
        ids.retain(|id| !tombstones.is_deleted(*id));
        Ok(ids)
    }

    /// Merges sealed `inputs` into a new segment at `dir`. See [`merge::merge_segments`].
    pub fn merge(
        dir: PathBuf,
        schema: &BTreeMap<String, FieldType>,
        inputs: &[Arc<Segment>],
        tombstones: &Tombstones,
        kind: TermIndexKind,
    ) -> Result<Segment> {
        merge::merge_segments(dir, schema, inputs, tombstones, kind)
    }

    /// Marks the segment for deletion; files go when the last handle drops.
    pub fn destroy(&self) {
        self.doomed.store(true, Ordering::SeqCst);
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        if self.doomed.load(Ordering::SeqCst) && self.dir.exists() {
            match fs::remove_dir_all(&self.dir) {
                Ok(()) => log::debug!("removed segment {}", self.dir.display()),
                Err(e) => log::warn!("failed to remove segment {}: {e}", self.dir.display()),
            }
        }
    }
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
