//! Read-only memory-mapped files for sealed segment data.

use std::fs::File;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapOptions};

use crate::error::{Result, TesseraError};

/// An immutable file mapped into memory. Empty files are not mapped.
#[derive(Debug)]
pub struct MappedFile {
    path: PathBuf,
    mmap: Option<Mmap>,
}

impl MappedFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            TesseraError::storage(format!("failed to open {}: {e}", path.display()))
        })?;
        let len = file.metadata()?.len();
        let mmap = if len == 0 {
            None
        } else {
            // SAFETY: sealed segment files are never written after they are mapped.
            let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|e| {
                TesseraError::storage(format!("failed to mmap {}: {e}", path.display()))
            })?;
            Some(mmap)
        };
        Ok(Self { path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.mmap.as_ref().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= self.len())
            .ok_or_else(|| {
                TesseraError::storage(format!(
                    "read of {len} bytes at {offset} is past the end of {} ({} bytes)",
                    self.path.display(),
                    self.len()
                ))
            })?;
        Ok(&self.as_slice()[offset..end])
    }

    pub fn read_u64(&self, offset: usize) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.slice(offset, 8)?))
    }

    pub fn read_i64(&self, offset: usize) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.slice(offset, 8)?))
    }
}
