//! The `Index`: an ordered list of sealed segments plus one mutable segment,
//! a tombstone bitmap and a primary-key tree.
//!
//! Files kept in the index directory:
//!
//! ```text
//! {name}.meta          JSON index metadata (see [`IndexMeta`])
//! {name}.bitmap        tombstone bitmap
//! {name}.del           deleted-docId log since the last merge
//! {name}_primary.pk    primary key -> docId tree
//! {name}_{suffix}/     one directory per sealed segment
//! ```
//!
//! Writers are serialized by an internal mutex. Readers lock the mutable
//! segment only long enough to query it and snapshot the sealed list; the
//! sealed segments are then read without locks.

pub mod meta;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};

use crate::analysis::{NoopSuggestionSink, SuggestionSink, Tokenizer};
use crate::data::{Document, FieldType, Posting, Schema};
use crate::engine::config::IndexConfig;
use crate::error::{Result, TesseraError};
use crate::search::query::{SearchFilter, TermQuery};
use crate::search::{SearchRequest, SearchResult};
use crate::segment::Segment;
use crate::storage::{BTreeStore, DeletedLog, Tombstones};

pub use self::meta::IndexMeta;

type SegmentList = Arc<Vec<Arc<Segment>>>;

#[derive(Debug)]
struct WriterState {
    meta: IndexMeta,
    primary: Option<BTreeStore>,
    pk_buffer: AHashMap<i64, u64>,
    pending_tombstones: usize,
    closed: bool,
}

#[derive(Debug)]
pub struct Index {
    name: String,
    dir: PathBuf,
    config: IndexConfig,
    tokenizer: Arc<dyn Tokenizer>,
    sink: Arc<dyn SuggestionSink>,
    writer: Mutex<WriterState>,
    schema: RwLock<Schema>,
    memory: RwLock<Segment>,
    sealed: RwLock<SegmentList>,
    tombstones: RwLock<Tombstones>,
    deleted_log: DeletedLog,
}

fn bitmap_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.bitmap"))
}

fn deleted_log_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.del"))
}

fn primary_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}_primary.pk"))
}

/// Whether `segment` holds `field` with the type the schema currently declares.
fn field_matches(segment: &Segment, schema: &Schema, field: &str) -> bool {
    match (segment.field(field), schema.field_type(field)) {
        (Some(stored), Some(declared)) => stored.field_type() == declared,
        _ => false,
    }
}

/// Parses a primary-key value.
pub fn parse_primary_key(raw: &str) -> Result<i64> {
    raw.trim().parse::<i64>().map_err(|e| {
        TesseraError::invalid_argument(format!("invalid primary key {raw:?}: {e}"))
    })
}

impl Index {
    /// Creates a new, empty index named `name` inside `dir`.
    pub fn create<P: AsRef<Path>>(
        dir: P,
        name: &str,
        config: IndexConfig,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        if IndexMeta::path(&dir, name).exists() {
            return Err(TesseraError::index(format!(
                "index `{name}` already exists in {}",
                dir.display()
            )));
        }

        let mut meta = IndexMeta::new(name);
        let memory_dir = dir.join(meta.next_segment_name());
        meta.store(&dir)?;
        let memory = Segment::new(memory_dir, 0, &meta.schema.stored_fields());

        log::info!("created index {name} in {}", dir.display());
        Ok(Self::assemble(
            dir,
            config,
            tokenizer,
            meta,
            None,
            memory,
            Vec::new(),
            Tombstones::new(),
        ))
    }

    /// Reopens an index written by [`Index::create`].
    ///
    /// Documents of a mutable segment that was never sealed are gone: their
    /// primary keys are dropped and their docIds tombstoned. The new mutable
    /// segment starts at the persisted `max_doc_id`.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        name: &str,
        config: IndexConfig,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut meta = IndexMeta::load(&dir, name)?;

        let mut sealed = Vec::with_capacity(meta.segment_names.len());
        for segment_name in &meta.segment_names {
            sealed.push(Arc::new(Segment::open(dir.join(segment_name))?));
        }
        if let Some(last) = sealed.last() {
            if last.max_doc_id() > meta.max_doc_id {
                log::warn!(
                    "index {name}: segment {} ends at {} beyond maxDocId {}",
                    last.name(),
                    last.max_doc_id(),
                    meta.max_doc_id
                );
                meta.max_doc_id = last.max_doc_id();
            }
        }

        // Deletions logged after the last bitmap flush.
        let mut tombstones = Tombstones::load(bitmap_path(&dir, name))?;
        let log = DeletedLog::new(deleted_log_path(&dir, name));
        let mut replayed = 0;
        for doc_id in log.read_all()? {
            if tombstones.delete(doc_id) {
                replayed += 1;
            }
        }
        if replayed > 0 {
            log::debug!("index {name}: replayed {replayed} deletions from the log");
        }

        let primary = match &meta.schema.primary_key {
            Some(field) => {
                let store = BTreeStore::open(primary_path(&dir, name))?;
                store.create_tree(field)?;
                Some(store)
            }
            None => None,
        };

        // DocIds issued to a mutable segment that was never sealed.
        let sealed_end = sealed.last().map_or(0, |s| s.max_doc_id());
        let lost_start = meta.start_doc_id.max(sealed_end);
        let mut lost = 0;
        if lost_start < meta.max_doc_id {
            log::warn!(
                "index {name}: documents [{lost_start}, {}) were never sealed and are lost",
                meta.max_doc_id
            );
            if let (Some(store), Some(field)) = (&primary, &meta.schema.primary_key) {
                let purged = store.remove_where(field, |_, doc_id| doc_id >= lost_start)?;
                log::debug!("index {name}: dropped {purged} primary keys of lost documents");
            }
            for doc_id in lost_start..meta.max_doc_id {
                if tombstones.delete(doc_id) {
                    lost += 1;
                }
            }
        }
        if replayed + lost > 0 {
            tombstones.save(bitmap_path(&dir, name))?;
        }

        let memory_name = meta.next_segment_name();
        let memory_dir = dir.join(&memory_name);
        if memory_dir.exists() {
            log::warn!("index {name}: removing orphaned segment directory {memory_name}");
            fs::remove_dir_all(&memory_dir)?;
        }
        meta.start_doc_id = meta.max_doc_id;
        meta.store(&dir)?;
        let memory = Segment::new(memory_dir, meta.max_doc_id, &meta.schema.stored_fields());

        log::info!(
            "opened index {name}: {} segments, maxDocId {}, {} deleted",
            sealed.len(),
            meta.max_doc_id,
            tombstones.deleted_count()
        );
        Ok(Self::assemble(
            dir, config, tokenizer, meta, primary, memory, sealed, tombstones,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        dir: PathBuf,
        config: IndexConfig,
        tokenizer: Arc<dyn Tokenizer>,
        meta: IndexMeta,
        primary: Option<BTreeStore>,
        memory: Segment,
        sealed: Vec<Arc<Segment>>,
        tombstones: Tombstones,
    ) -> Self {
        let name = meta.name.clone();
        let schema = meta.schema.clone();
        Self {
            deleted_log: DeletedLog::new(deleted_log_path(&dir, &name)),
            name,
            dir,
            config,
            tokenizer,
            sink: Arc::new(NoopSuggestionSink),
            writer: Mutex::new(WriterState {
                meta,
                primary,
                pk_buffer: AHashMap::new(),
                pending_tombstones: 0,
                closed: false,
            }),
            schema: RwLock::new(schema),
            memory: RwLock::new(memory),
            sealed: RwLock::new(Arc::new(sealed)),
            tombstones: RwLock::new(tombstones),
        }
    }

    /// Routes every term indexed into a `Text` field to `sink`.
    pub fn with_suggestion_sink(mut self, sink: Arc<dyn SuggestionSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    pub fn schema(&self) -> Schema {
        self.schema.read().clone()
    }

    /// The next docId to be issued.
    pub fn max_doc_id(&self) -> u64 {
        self.writer.lock().meta.max_doc_id
    }

    /// Number of sealed segments.
    pub fn segment_count(&self) -> usize {
        self.sealed.read().len()
    }

    /// Names of the sealed segments, in docId order.
    pub fn segment_names(&self) -> Vec<String> {
        self.sealed.read().iter().map(|s| s.name().to_string()).collect()
    }

    pub fn is_deleted(&self, doc_id: u64) -> bool {
        self.tombstones.read().is_deleted(doc_id)
    }

    /// Documents held by all segments minus tombstoned ones.
    pub fn live_doc_count(&self) -> u64 {
        let memory = self.memory.read();
        let sealed = Arc::clone(&self.sealed.read());
        let tombstones = self.tombstones.read();
        let live = |segment: &Segment| {
            segment.doc_count()
                - tombstones.deleted_in(segment.start_doc_id(), segment.max_doc_id())
        };
        live(&*memory) + sealed.iter().map(|s| live(s.as_ref())).sum::<u64>()
    }

    fn ensure_open(state: &WriterState) -> Result<()> {
        if state.closed {
            return Err(TesseraError::invalid_operation("index is closed"));
        }
        Ok(())
    }

    /// Adds `name` to the schema. Declaring a `PrimaryKey` field also
    /// initializes the primary-key tree.
    pub fn add_field(&self, name: &str, field_type: FieldType) -> Result<()> {
        let mut state = self.writer.lock();
        Self::ensure_open(&state)?;
        if state.meta.schema.contains(name) {
            return Err(TesseraError::schema(format!("field `{name}` already exists")));
        }
        let mut schema = state.meta.schema.clone();
        if field_type == FieldType::PrimaryKey {
            if let Some(existing) = &schema.primary_key {
                return Err(TesseraError::schema(format!(
                    "primary key already declared as `{existing}`"
                )));
            }
            let store = BTreeStore::open(primary_path(&self.dir, &self.name))?;
            store.create_tree(name)?;
            state.primary = Some(store);
            schema.primary_key = Some(name.to_string());
        }
        schema.fields.insert(name.to_string(), field_type);

        self.apply_schema(&mut state, schema)?;
        log::info!("index {}: added field {name} ({field_type:?})", self.name);
        Ok(())
    }

    /// Removes `name` from the schema. Values already written stay in their
    /// sealed segments but are no longer returned.
    pub fn delete_field(&self, name: &str) -> Result<()> {
        let mut state = self.writer.lock();
        Self::ensure_open(&state)?;
        if !state.meta.schema.contains(name) {
            return Err(TesseraError::schema(format!("field `{name}` does not exist")));
        }
        if state.meta.schema.primary_key.as_deref() == Some(name) {
            return Err(TesseraError::schema(format!(
                "primary key field `{name}` cannot be deleted"
            )));
        }
        let mut schema = state.meta.schema.clone();
        schema.fields.remove(name);

        self.apply_schema(&mut state, schema)?;
        log::info!("index {}: deleted field {name}", self.name);
        Ok(())
    }

    fn apply_schema(&self, state: &mut WriterState, schema: Schema) -> Result<()> {
        self.rotate(state, &schema)?;
        state.meta.schema = schema.clone();
        self.flush(state)?;
        *self.schema.write() = schema;
        Ok(())
    }

    /// Replaces the mutable segment with an empty one built for `schema`,
    /// sealing it first if it holds documents.
    fn rotate(&self, state: &mut WriterState, schema: &Schema) -> Result<()> {
        let mut memory = self.memory.write();
        if memory.is_empty() {
            *memory = Segment::new(
                memory.dir().to_path_buf(),
                memory.start_doc_id(),
                &schema.stored_fields(),
            );
            return Ok(());
        }

        let sealed = Arc::new(memory.serialize(self.config.term_index)?);
        let start = sealed.max_doc_id();
        let next_dir = self.dir.join(state.meta.next_segment_name());
        state.meta.segment_names.push(sealed.name().to_string());
        state.meta.start_doc_id = start;
        {
            let mut list = self.sealed.write();
            let mut segments = list.as_ref().clone();
            segments.push(sealed);
            *list = Arc::new(segments);
        }
        *memory = Segment::new(next_dir, start, &schema.stored_fields());
        Ok(())
    }

    /// Writes buffered primary keys, the tombstone bitmap and the metadata.
    fn flush(&self, state: &mut WriterState) -> Result<()> {
        self.flush_primary_keys(state)?;
        self.flush_tombstones(state)?;
        state.meta.store(&self.dir)
    }

    fn flush_primary_keys(&self, state: &mut WriterState) -> Result<()> {
        if state.pk_buffer.is_empty() {
            return Ok(());
        }
        if let (Some(primary), Some(tree)) = (&state.primary, &state.meta.schema.primary_key) {
            primary.set_batch(tree, state.pk_buffer.iter().map(|(k, v)| (*k, *v)))?;
        }
        log::debug!(
            "index {}: flushed {} primary keys",
            self.name,
            state.pk_buffer.len()
        );
        state.pk_buffer.clear();
        Ok(())
    }

    fn flush_tombstones(&self, state: &mut WriterState) -> Result<()> {
        if state.pending_tombstones == 0 {
            return Ok(());
        }
        self.tombstones
            .read()
            .save(bitmap_path(&self.dir, &self.name))?;
        log::debug!(
            "index {}: flushed {} tombstones",
            self.name,
            state.pending_tombstones
        );
        state.pending_tombstones = 0;
        Ok(())
    }

    fn lookup_primary_key(&self, state: &WriterState, key: i64) -> Result<Option<u64>> {
        if let Some(doc_id) = state.pk_buffer.get(&key) {
            return Ok(Some(*doc_id));
        }
        match (&state.primary, &state.meta.schema.primary_key) {
            (Some(primary), Some(tree)) => primary.get(tree, key),
            _ => Ok(None),
        }
    }

    fn primary_key_of(&self, state: &WriterState, doc: &Document) -> Result<Option<i64>> {
        let Some(field) = &state.meta.schema.primary_key else {
            return Ok(None);
        };
        let raw = doc.get(field).ok_or_else(|| {
            TesseraError::invalid_argument(format!("document is missing primary key `{field}`"))
        })?;
        parse_primary_key(raw).map(Some)
    }

    /// Appends `doc` under a fresh docId and records its primary key.
    fn append(&self, state: &mut WriterState, doc: &Document, key: Option<i64>) -> Result<u64> {
        let doc_id = state.meta.max_doc_id;
        self.memory
            .write()
            .add_document(doc_id, doc, self.tokenizer.as_ref(), self.sink.as_ref())?;
        state.meta.max_doc_id += 1;

        if let Some(key) = key {
            state.pk_buffer.insert(key, doc_id);
            if state.pk_buffer.len() >= self.config.primary_key_batch_size {
                self.flush_primary_keys(state)?;
                state.meta.store(&self.dir)?;
            }
        }
        Ok(doc_id)
    }

    fn tombstone(&self, state: &mut WriterState, doc_id: u64) -> Result<()> {
        if self.tombstones.read().is_deleted(doc_id) {
            return Ok(());
        }
        self.deleted_log.append(doc_id)?;
        self.tombstones.write().delete(doc_id);
        state.meta.deleted_since_merge += 1;
        state.pending_tombstones += 1;
        if state.pending_tombstones >= self.config.tombstone_batch_size {
            self.flush_tombstones(state)?;
        }
        Ok(())
    }

    /// Adds a document and returns its docId.
    ///
    /// Fails if the schema is empty, or if the document's primary key already
    /// belongs to a live document (use [`Index::update_document`] for that).
    pub fn add_document(&self, doc: &Document) -> Result<u64> {
        let mut state = self.writer.lock();
        Self::ensure_open(&state)?;
        if state.meta.schema.is_empty() {
            return Err(TesseraError::schema(format!(
                "index `{}` has no fields",
                self.name
            )));
        }
        let key = self.primary_key_of(&state, doc)?;
        if let Some(key) = key {
            if let Some(existing) = self.lookup_primary_key(&state, key)? {
                if !self.is_deleted(existing) {
                    return Err(TesseraError::invalid_operation(format!(
                        "primary key {key} already maps to live document {existing}"
                    )));
                }
            }
        }
        self.append(&mut state, doc, key)
    }

    /// Replaces the document with the same primary key. The new content gets
    /// a fresh docId; the old docId is tombstoned.
    pub fn update_document(&self, doc: &Document) -> Result<u64> {
        let mut state = self.writer.lock();
        Self::ensure_open(&state)?;
        let key = self.primary_key_of(&state, doc)?.ok_or_else(|| {
            TesseraError::invalid_operation(format!("index `{}` has no primary key", self.name))
        })?;
        let old = self
            .lookup_primary_key(&state, key)?
            .ok_or_else(|| TesseraError::not_found(format!("no document with primary key {key}")))?;
        if self.is_deleted(old) {
            return Err(TesseraError::not_found(format!(
                "document with primary key {key} was deleted"
            )));
        }

        let doc_id = self.append(&mut state, doc, Some(key))?;
        self.tombstone(&mut state, old)?;
        log::debug!("index {}: updated key {key}: {old} -> {doc_id}", self.name);
        Ok(doc_id)
    }

    /// Tombstones the document with primary key `key`. Returns `false` when
    /// no document ever had that key; deleting twice succeeds.
    pub fn delete_document(&self, key: &str) -> Result<bool> {
        let mut state = self.writer.lock();
        Self::ensure_open(&state)?;
        if state.meta.schema.primary_key.is_none() {
            return Err(TesseraError::invalid_operation(format!(
                "index `{}` has no primary key",
                self.name
            )));
        }
        let key = parse_primary_key(key)?;
        match self.lookup_primary_key(&state, key)? {
            Some(doc_id) => {
                self.tombstone(&mut state, doc_id)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stored fields of `doc_id`, including soft-deleted documents. Fields
    /// no longer in the schema, or re-declared with another type, are left out.
    pub fn get_document(&self, doc_id: u64) -> Result<Option<Document>> {
        let schema = self.schema();
        let visible = |segment: &Segment| -> Result<Option<Document>> {
            Ok(segment.get_document(doc_id)?.map(|mut doc| {
                doc.fields
                    .retain(|name, _| field_matches(segment, &schema, name));
                doc
            }))
        };

        let memory = self.memory.read();
        if memory.contains(doc_id) {
            return visible(&*memory);
        }
        let sealed = Arc::clone(&self.sealed.read());
        drop(memory);
        match sealed.iter().find(|s| s.contains(doc_id)) {
            Some(segment) => visible(segment.as_ref()),
            None => Ok(None),
        }
    }

    /// Queries the mutable segment and snapshots the sealed list while the
    /// mutable segment is read-locked.
    fn snapshot<T>(
        &self,
        f: impl FnOnce(&Segment, &Tombstones) -> Result<T>,
    ) -> Result<(SegmentList, T)> {
        let memory = self.memory.read();
        let sealed = Arc::clone(&self.sealed.read());
        let value = f(&*memory, &*self.tombstones.read())?;
        Ok((sealed, value))
    }

    /// Live postings of one term across every segment, in docId order.
    pub fn search_key_doc_ids(&self, query: &TermQuery) -> Result<Vec<Posting>> {
        let schema = self.schema();
        let lookup = |segment: &Segment, tombstones: &Tombstones| -> Result<Vec<Posting>> {
            if !field_matches(segment, &schema, &query.field) {
                return Ok(Vec::new());
            }
            segment.search_doc_ids(&query.field, &query.term, tombstones)
        };

        let (sealed, tail) = self.snapshot(|memory, tombstones| lookup(memory, tombstones))?;
        let tombstones = self.tombstones.read();
        let mut postings = Vec::new();
        for segment in sealed.iter() {
            postings.extend(lookup(segment.as_ref(), &*tombstones)?);
        }
        postings.extend(tail);
        Ok(postings)
    }

    /// Live docIds matching `filter`, sorted and deduplicated.
    pub fn search_filter_doc_ids(&self, filter: &SearchFilter) -> Result<Vec<u64>> {
        let schema = self.schema();
        let ranges = filter.ranges();
        let collect =
            |segment: &Segment, tombstones: &Tombstones, out: &mut Vec<u64>| -> Result<()> {
                if !field_matches(segment, &schema, &filter.field) {
                    return Ok(());
                }
                for (min, max) in &ranges {
                    out.extend(segment.search_doc_filter(&filter.field, *min, *max, tombstones)?);
                }
                Ok(())
            };

        let (sealed, mut ids) = self.snapshot(|memory, tombstones| {
            let mut ids = Vec::new();
            collect(memory, tombstones, &mut ids)?;
            Ok(ids)
        })?;
        let tombstones = self.tombstones.read();
        for segment in sealed.iter() {
            collect(segment.as_ref(), &*tombstones, &mut ids)?;
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Runs a parsed request through the ranking pipeline.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        crate::search::search(self, request)
    }

    /// Seals the mutable segment if it holds documents and flushes every
    /// buffer. Returns whether a segment was sealed.
    pub fn sync_memory_segment(&self) -> Result<bool> {
        let mut state = self.writer.lock();
        Self::ensure_open(&state)?;
        self.sync_locked(&mut state)
    }

    fn sync_locked(&self, state: &mut WriterState) -> Result<bool> {
        let sealed = !self.memory.read().is_empty();
        if sealed {
            let schema = state.meta.schema.clone();
            self.rotate(state, &schema)?;
        }
        self.flush(state)?;
        Ok(sealed)
    }

    /// Merges sealed segments `start..` into one.
    ///
    /// `None` starts at the first segment smaller than
    /// `merge_size_threshold`. Returns `false` when there was nothing to merge.
    pub fn merge_segments(&self, start: Option<usize>) -> Result<bool> {
        let mut state = self.writer.lock();
        Self::ensure_open(&state)?;
        self.flush(&mut state)?;

        let sealed = Arc::clone(&self.sealed.read());
        if sealed.len() <= 1 {
            return Ok(false);
        }
        let start = match start {
            Some(start) if start >= sealed.len() => {
                return Err(TesseraError::invalid_argument(format!(
                    "merge start {start} out of range for {} segments",
                    sealed.len()
                )));
            }
            Some(start) => start,
            None => match sealed
                .iter()
                .position(|s| s.doc_count() < self.config.merge_size_threshold)
            {
                Some(start) => start,
                None => {
                    log::debug!("index {}: no segment below the merge threshold", self.name);
                    return Ok(false);
                }
            },
        };
        let inputs = &sealed[start..];

        // 1. Reserve the output directory
        let merged_name = state.meta.next_segment_name();
        state.meta.store(&self.dir)?;
        log::info!(
            "index {}: merging {} segments into {merged_name}",
            self.name,
            inputs.len()
        );

        // 2. Build the merged segment from the current tombstones
        let schema = state.meta.schema.stored_fields();
        let merged = {
            let tombstones = self.tombstones.read();
            Segment::merge(
                self.dir.join(&merged_name),
                &schema,
                inputs,
                &tombstones,
                self.config.term_index,
            )
        };
        let merged = match merged {
            Ok(merged) => Arc::new(merged),
            Err(e) => {
                log::error!("index {}: merge failed: {e}", self.name);
                return Err(e);
            }
        };

        // 3. Persist the new segment list before anything is removed
        let mut segments: Vec<Arc<Segment>> = sealed[..start].to_vec();
        segments.push(Arc::clone(&merged));
        let previous_names = std::mem::replace(
            &mut state.meta.segment_names,
            segments.iter().map(|s| s.name().to_string()).collect(),
        );
        let previous_deleted = std::mem::take(&mut state.meta.deleted_since_merge);
        if let Err(e) = state.meta.store(&self.dir) {
            state.meta.segment_names = previous_names;
            state.meta.deleted_since_merge = previous_deleted;
            merged.destroy();
            return Err(e);
        }

        // 4. Swap, then retire the inputs
        *self.sealed.write() = Arc::new(segments);
        for segment in inputs {
            segment.destroy();
        }
        self.deleted_log.clear()?;

        log::info!(
            "index {}: merged into {merged_name} [{}, {})",
            self.name,
            merged.start_doc_id(),
            merged.max_doc_id()
        );
        Ok(true)
    }

    /// Whether at least `merge_min_segments` trailing sealed segments are
    /// below `merge_size_threshold`.
    pub fn check_merge(&self) -> bool {
        let sealed = Arc::clone(&self.sealed.read());
        let small = sealed
            .iter()
            .rev()
            .take_while(|s| s.doc_count() < self.config.merge_size_threshold)
            .count();
        small >= self.config.merge_min_segments
    }

    /// Seals pending documents, flushes buffers and refuses further writes.
    /// Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.writer.lock();
        if state.closed {
            return Ok(());
        }
        self.sync_locked(&mut state)?;
        state.closed = true;
        log::info!("closed index {}", self.name);
        Ok(())
    }

    /// Closes the index and deletes all of its files.
    pub fn destroy(&self) -> Result<()> {
        self.close()?;
        let mut state = self.writer.lock();
        state.primary = None;

        let sealed = std::mem::take(&mut *self.sealed.write());
        for segment in sealed.iter() {
            segment.destroy();
        }
        let memory_dir = self.memory.read().dir().to_path_buf();
        if memory_dir.exists() {
            fs::remove_dir_all(&memory_dir)?;
        }
        for path in [
            IndexMeta::path(&self.dir, &self.name),
            bitmap_path(&self.dir, &self.name),
            deleted_log_path(&self.dir, &self.name),
            primary_path(&self.dir, &self.name),
        ] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        log::info!("destroyed index {}", self.name);
        Ok(())
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("failed to close index {}: {e}", self.name);
        }
    }
}
