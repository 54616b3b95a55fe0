//! Range index for numeric, float and date fields: value → docIds.
//!
//! Sealed layout: `{field}_profileindex.pfi` holds one bucket per distinct
//! value (`u64` count + `count` × `u64` docId) and the segment's `seg.bt`
//! maps each value to its bucket offset in a tree named after the field.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::data::ABSENT;
use crate::error::{Result, TesseraError};
use crate::storage::{BTreeStore, MappedFile};

const BUCKET_FLUSH_BATCH: usize = 10_000;

pub fn profile_index_file_name(field: &str) -> String {
    format!("{field}_profileindex.pfi")
}

fn read_bucket(file: &MappedFile, offset: u64) -> Result<Vec<u64>> {
    let offset = offset as usize;
    let count = file.read_u64(offset)? as usize;
    let body = file.slice(offset + 8, count.saturating_mul(8))?;
    Ok(body.chunks_exact(8).map(LittleEndian::read_u64).collect())
}

#[derive(Debug)]
enum ProfileIndexState {
    Memory(BTreeMap<i64, Vec<u64>>),
    Disk {
        buckets: MappedFile,
        btree: Arc<BTreeStore>,
    },
}

#[derive(Debug)]
pub struct ProfileIndex {
    field: String,
    state: ProfileIndexState,
}

impl ProfileIndex {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            state: ProfileIndexState::Memory(BTreeMap::new()),
        }
    }

    pub fn open(field: &str, dir: &Path, btree: &Arc<BTreeStore>) -> Result<Self> {
        let buckets = MappedFile::open(dir.join(profile_index_file_name(field)))?;
        Ok(Self {
            field: field.to_string(),
            state: ProfileIndexState::Disk {
                buckets,
                btree: Arc::clone(btree),
            },
        })
    }

    /// Indexes `slot` for `doc_id`. Absent values are not indexed.
    pub fn add(&mut self, doc_id: u64, slot: i64) -> Result<()> {
        let ProfileIndexState::Memory(map) = &mut self.state else {
            return Err(TesseraError::invalid_operation(format!(
                "range index `{}` is sealed",
                self.field
            )));
        };
        if slot != ABSENT {
            map.entry(slot).or_default().push(doc_id);
        }
        Ok(())
    }

    /// DocIds whose value lies in `[min, max]`, grouped by ascending value.
    pub fn range(&self, min: i64, max: i64) -> Result<Vec<u64>> {
        if min > max {
            return Ok(Vec::new());
        }
        match &self.state {
            ProfileIndexState::Memory(map) => {
                Ok(map.range(min..=max).flat_map(|(_, ids)| ids.iter().copied()).collect())
            }
            ProfileIndexState::Disk { buckets, btree } => {
                let mut ids = Vec::new();
                for (_, offset) in btree.range(&self.field, min, max)? {
                    ids.extend(read_bucket(buckets, offset)?);
                }
                Ok(ids)
            }
        }
    }

    pub fn buckets(&self) -> Result<BucketCursor<'_>> {
        match &self.state {
            ProfileIndexState::Disk { buckets, btree } => Ok(BucketCursor {
                field: &self.field,
                buckets,
                btree,
                last: None,
                exhausted: false,
            }),
            ProfileIndexState::Memory(_) => Err(TesseraError::invalid_operation(format!(
                "range index `{}` has not been sealed",
                self.field
            ))),
        }
    }

    pub fn serialize(&self, dir: &Path, btree: &Arc<BTreeStore>) -> Result<()> {
        let ProfileIndexState::Memory(map) = &self.state else {
            return Err(TesseraError::invalid_operation(format!(
                "range index `{}` is already sealed",
                self.field
            )));
        };
        let mut writer = ProfileIndexWriter::create(&self.field, dir, btree)?;
        for (value, ids) in map {
            writer.push(*value, ids)?;
        }
        writer.finish()
    }
}

/// Walks a sealed range index bucket by bucket in ascending value order.
pub struct BucketCursor<'a> {
    field: &'a str,
    buckets: &'a MappedFile,
    btree: &'a BTreeStore,
    last: Option<i64>,
    exhausted: bool,
}

impl BucketCursor<'_> {
    pub fn next_bucket(&mut self) -> Result<Option<(i64, Vec<u64>)>> {
        if self.exhausted {
            return Ok(None);
        }
        let entry = match self.last {
            None => self.btree.first(self.field)?,
            Some(last) => self.btree.next(self.field, last)?,
        };
        match entry {
            Some((value, offset)) => {
                self.last = Some(value);
                Ok(Some((value, read_bucket(self.buckets, offset)?)))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }
}

/// Writes buckets in ascending value order, shared by sealing and merging.
pub struct ProfileIndexWriter {
    field: String,
    file: BufWriter<File>,
    offset: u64,
    pending: Vec<(i64, u64)>,
    btree: Arc<BTreeStore>,
}

impl ProfileIndexWriter {
    pub fn create(field: &str, dir: &Path, btree: &Arc<BTreeStore>) -> Result<Self> {
        btree.create_tree(field)?;
        Ok(Self {
            field: field.to_string(),
            file: BufWriter::new(File::create(dir.join(profile_index_file_name(field)))?),
            offset: 0,
            pending: Vec::new(),
            btree: Arc::clone(btree),
        })
    }

    pub fn push(&mut self, value: i64, doc_ids: &[u64]) -> Result<()> {
        if doc_ids.is_empty() {
            return Ok(());
        }
        self.file.write_u64::<LittleEndian>(doc_ids.len() as u64)?;
        for id in doc_ids {
            self.file.write_u64::<LittleEndian>(*id)?;
        }
        self.pending.push((value, self.offset));
        self.offset += 8 + 8 * doc_ids.len() as u64;
        if self.pending.len() >= BUCKET_FLUSH_BATCH {
            self.btree
                .set_batch(&self.field, std::mem::take(&mut self.pending))?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.file.flush()?;
        if !self.pending.is_empty() {
            self.btree
                .set_batch(&self.field, std::mem::take(&mut self.pending))?;
        }
        log::debug!("serialized range index `{}`: {} bytes", self.field, self.offset);
        Ok(())
    }
}
