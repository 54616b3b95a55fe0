//! Sorted term → postings-offset dictionaries for sealed inverted fields.
//!
//! The engine only talks to [`TermIndex`] / [`TermIndexWriter`]; two
//! encodings exist:
//!
//! - [`FstTermIndex`]: an `fst::Map` in `{field}_invert.fst`, memory-mapped.
//! - [`BTreeTermIndex`]: a string-keyed tree `{field}.terms` inside the
//!   segment's `seg.bt`.
//!
//! Both iterate terms in strictly increasing byte order, which is what the
//! k-way merge relies on. Segments sealed with different encodings can be
//! merged together.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use fst::{Map, MapBuilder, Streamer};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::storage::BTreeStore;

const BTREE_FLUSH_BATCH: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermIndexKind {
    #[default]
    Fst,
    BTree,
}

pub fn fst_file_name(field: &str) -> String {
    format!("{field}_invert.fst")
}

pub fn terms_tree_name(field: &str) -> String {
    format!("{field}.terms")
}

/// Forward-only iteration over `(term, offset)` pairs in increasing term order.
pub trait TermCursor {
    fn next_term(&mut self) -> Result<Option<(Vec<u8>, u64)>>;
}

pub trait TermIndex: Send + Sync + fmt::Debug {
    /// Postings offset of `term`, if present.
    fn get(&self, term: &str) -> Result<Option<u64>>;

    fn cursor(&self) -> Result<Box<dyn TermCursor + '_>>;

    fn len(&self) -> Result<u64>;
}

/// Builds a term dictionary. Terms must arrive in strictly increasing order.
pub trait TermIndexWriter {
    fn insert(&mut self, term: &[u8], offset: u64) -> Result<()>;

    fn finish(self: Box<Self>) -> Result<()>;
}

pub fn open_term_index(
    kind: TermIndexKind,
    dir: &Path,
    field: &str,
    btree: &Arc<BTreeStore>,
) -> Result<Box<dyn TermIndex>> {
    match kind {
        TermIndexKind::Fst => Ok(Box::new(FstTermIndex::open(dir.join(fst_file_name(field)))?)),
        TermIndexKind::BTree => Ok(Box::new(BTreeTermIndex::new(
            Arc::clone(btree),
            terms_tree_name(field),
        ))),
    }
}

pub fn create_term_writer(
    kind: TermIndexKind,
    dir: &Path,
    field: &str,
    btree: &Arc<BTreeStore>,
) -> Result<Box<dyn TermIndexWriter>> {
    match kind {
        TermIndexKind::Fst => Ok(Box::new(FstTermWriter::create(
            dir.join(fst_file_name(field)),
        )?)),
        TermIndexKind::BTree => Ok(Box::new(BTreeTermWriter::create(
            Arc::clone(btree),
            terms_tree_name(field),
        )?)),
    }
}

pub struct FstTermIndex {
    map: Map<Mmap>,
}

impl fmt::Debug for FstTermIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FstTermIndex")
            .field("terms", &self.map.len())
            .finish()
    }
}

impl FstTermIndex {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: the FST file is written once at seal/merge time and never modified.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            map: Map::new(mmap)?,
        })
    }
}

impl TermIndex for FstTermIndex {
    fn get(&self, term: &str) -> Result<Option<u64>> {
        Ok(self.map.get(term.as_bytes()))
    }

    fn cursor(&self) -> Result<Box<dyn TermCursor + '_>> {
        Ok(Box::new(FstCursor {
            stream: self.map.stream(),
        }))
    }

    fn len(&self) -> Result<u64> {
        Ok(self.map.len() as u64)
    }
}

struct FstCursor<'a> {
    stream: fst::map::Stream<'a>,
}

impl TermCursor for FstCursor<'_> {
    fn next_term(&mut self) -> Result<Option<(Vec<u8>, u64)>> {
        Ok(self.stream.next().map(|(term, offset)| (term.to_vec(), offset)))
    }
}

pub struct FstTermWriter {
    builder: MapBuilder<BufWriter<File>>,
}

impl FstTermWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        Ok(Self {
            builder: MapBuilder::new(writer)?,
        })
    }
}

impl TermIndexWriter for FstTermWriter {
    fn insert(&mut self, term: &[u8], offset: u64) -> Result<()> {
        self.builder.insert(term, offset)?;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let mut writer = self.builder.into_inner()?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct BTreeTermIndex {
    store: Arc<BTreeStore>,
    tree: String,
}

impl BTreeTermIndex {
    pub fn new(store: Arc<BTreeStore>, tree: String) -> Self {
        Self { store, tree }
    }
}

impl TermIndex for BTreeTermIndex {
    fn get(&self, term: &str) -> Result<Option<u64>> {
        self.store.get_str(&self.tree, term)
    }

    fn cursor(&self) -> Result<Box<dyn TermCursor + '_>> {
        Ok(Box::new(BTreeCursor {
            index: self,
            last: None,
            exhausted: false,
        }))
    }

    fn len(&self) -> Result<u64> {
        self.store.str_len(&self.tree)
    }
}

struct BTreeCursor<'a> {
    index: &'a BTreeTermIndex,
    last: Option<String>,
    exhausted: bool,
}

impl TermCursor for BTreeCursor<'_> {
    fn next_term(&mut self) -> Result<Option<(Vec<u8>, u64)>> {
        if self.exhausted {
            return Ok(None);
        }
        let entry = match &self.last {
            None => self.index.store.first_str(&self.index.tree)?,
            Some(last) => self.index.store.next_str(&self.index.tree, last)?,
        };
        match entry {
            Some((term, offset)) => {
                let bytes = term.as_bytes().to_vec();
                self.last = Some(term);
                Ok(Some((bytes, offset)))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }
}

pub struct BTreeTermWriter {
    store: Arc<BTreeStore>,
    tree: String,
    pending: Vec<(String, u64)>,
    last: Option<Vec<u8>>,
}

impl BTreeTermWriter {
    pub fn create(store: Arc<BTreeStore>, tree: String) -> Result<Self> {
        store.create_str_tree(&tree)?;
        Ok(Self {
            store,
            tree,
            pending: Vec::new(),
            last: None,
        })
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.store.set_str_batch(
            &self.tree,
            self.pending.iter().map(|(t, o)| (t.as_str(), *o)),
        )?;
        self.pending.clear();
        Ok(())
    }
}

impl TermIndexWriter for BTreeTermWriter {
    fn insert(&mut self, term: &[u8], offset: u64) -> Result<()> {
        if self.last.as_deref().is_some_and(|last| last >= term) {
            return Err(TesseraError::invalid_operation(format!(
                "term {:?} inserted out of order",
                String::from_utf8_lossy(term)
            )));
        }
        let text = std::str::from_utf8(term)
            .map_err(|e| TesseraError::field(format!("term is not valid UTF-8: {e}")))?;
        self.pending.push((text.to_string(), offset));
        self.last = Some(term.to_vec());
        if self.pending.len() >= BTREE_FLUSH_BATCH {
            self.flush()?;
        }
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.flush()
    }
}
