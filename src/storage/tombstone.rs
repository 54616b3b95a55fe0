//! Soft-delete bookkeeping: the tombstone bitmap and the deleted-entry log.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use bit_vec::BitVec;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::Result;

/// One bit per docId ever issued: 0 = live, 1 = deleted.
#[derive(Debug, Clone, Default)]
pub struct Tombstones {
    bits: BitVec,
    deleted: u64,
}

impl Tombstones {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a bitmap written by [`Tombstones::save`]; a missing file is an empty bitmap.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = fs::read(path)?;
        let bits = BitVec::from_bytes(&bytes);
        let deleted = bits.iter().filter(|b| *b).count() as u64;
        Ok(Self { bits, deleted })
    }

    /// Writes the bitmap atomically (temp file + rename).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("bitmap.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&self.bits.to_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Marks `doc_id` deleted. Returns `false` if it already was.
    pub fn delete(&mut self, doc_id: u64) -> bool {
        let idx = doc_id as usize;
        if idx >= self.bits.len() {
            let grow_by = idx + 1 - self.bits.len();
            self.bits.grow(grow_by, false);
        }
        if self.bits.get(idx).unwrap_or(false) {
            return false;
        }
        self.bits.set(idx, true);
        self.deleted += 1;
        true
    }

    pub fn is_deleted(&self, doc_id: u64) -> bool {
        self.bits.get(doc_id as usize).unwrap_or(false)
    }

    pub fn deleted_count(&self) -> u64 {
        self.deleted
    }

    /// Deleted docIds in `start..end`.
    pub fn deleted_in(&self, start: u64, end: u64) -> u64 {
        let end = (end as usize).min(self.bits.len());
        let start = (start as usize).min(end);
        (start..end).filter(|i| self.bits.get(*i).unwrap_or(false)).count() as u64
    }
}

/// Append-only log of deleted docIds (little-endian u64 each), consumed by merge.
#[derive(Debug)]
pub struct DeletedLog {
    path: PathBuf,
}

impl DeletedLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn append(&self, doc_id: u64) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        writer.write_u64::<LittleEndian>(doc_id)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<u64>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut bytes = Vec::new();
        File::open(&self.path)?.read_to_end(&mut bytes)?;
        // A torn trailing record from a crash mid-append is ignored.
        let mut reader = &bytes[..bytes.len() - bytes.len() % 8];
        let mut ids = Vec::with_capacity(reader.len() / 8);
        while !reader.is_empty() {
            ids.push(reader.read_u64::<LittleEndian>()?);
        }
        Ok(ids)
    }

    /// Empties the log after a merge has consumed it.
    pub fn clear(&self) -> Result<()> {
        File::create(&self.path)?;
        Ok(())
    }
}
