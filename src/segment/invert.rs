//! Inverted storage: term → posting list.
//!
//! While a segment is mutable the postings live in a sorted in-memory map.
//! Sealing writes them to `{field}_invert.idx` as length-prefixed records
//! (`u64` count, then `count` × (`u64` docId, `f64` tf), little endian) and
//! records each list's byte offset in a [`TermIndex`].

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::analysis::Tokenizer;
use crate::data::{FieldType, POSTING_SIZE, Posting};
use crate::error::{Result, TesseraError};
use crate::segment::term_index::{
    TermCursor, TermIndex, TermIndexKind, create_term_writer, open_term_index,
};
use crate::storage::{BTreeStore, MappedFile};

pub fn postings_file_name(field: &str) -> String {
    format!("{field}_invert.idx")
}

/// Extracts `(term, term frequency)` pairs from a raw field value.
///
/// Keyword values are a single term with frequency 1. Text values are cut by
/// the tokenizer and each term's frequency is its share of the field's terms.
pub fn extract_terms(
    field_type: FieldType,
    raw: &str,
    tokenizer: &dyn Tokenizer,
) -> Vec<(String, f64)> {
    match field_type {
        FieldType::Keyword if !raw.is_empty() => vec![(raw.to_string(), 1.0)],
        FieldType::Text => {
            let words = tokenizer.cut(raw);
            if words.is_empty() {
                return Vec::new();
            }
            let total = words.len() as f64;
            let mut counts: AHashMap<String, usize> = AHashMap::new();
            let mut order = Vec::new();
            for word in words {
                let count = counts.entry(word.clone()).or_insert(0);
                if *count == 0 {
                    order.push(word);
                }
                *count += 1;
            }
            order
                .into_iter()
                .map(|word| {
                    let tf = counts[&word] as f64 / total;
                    (word, tf)
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Appends one length-prefixed posting list, returning the bytes written.
pub(crate) fn write_postings<W: Write>(writer: &mut W, postings: &[Posting]) -> Result<u64> {
    writer.write_u64::<LittleEndian>(postings.len() as u64)?;
    for posting in postings {
        writer.write_u64::<LittleEndian>(posting.doc_id)?;
        writer.write_f64::<LittleEndian>(posting.term_frequency)?;
    }
    Ok(8 + (postings.len() * POSTING_SIZE) as u64)
}

pub(crate) fn read_postings(file: &MappedFile, offset: u64) -> Result<Vec<Posting>> {
    let offset = offset as usize;
    let count = file.read_u64(offset)? as usize;
    let body = file.slice(offset + 8, count.saturating_mul(POSTING_SIZE))?;
    let mut postings = Vec::with_capacity(count);
    for record in body.chunks_exact(POSTING_SIZE) {
        let doc_id = LittleEndian::read_u64(&record[..8]);
        let tf = LittleEndian::read_f64(&record[8..]);
        postings.push(Posting::new(doc_id, tf));
    }
    Ok(postings)
}

#[derive(Debug)]
enum InvertState {
    Memory(BTreeMap<String, Vec<Posting>>),
    Disk {
        terms: Box<dyn TermIndex>,
        postings: MappedFile,
    },
}

#[derive(Debug)]
pub struct InvertIndex {
    field: String,
    state: InvertState,
}

impl InvertIndex {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            state: InvertState::Memory(BTreeMap::new()),
        }
    }

    pub fn open(
        field: &str,
        dir: &Path,
        kind: TermIndexKind,
        btree: &Arc<BTreeStore>,
    ) -> Result<Self> {
        let terms = open_term_index(kind, dir, field, btree)?;
        let postings = MappedFile::open(dir.join(postings_file_name(field)))?;
        Ok(Self {
            field: field.to_string(),
            state: InvertState::Disk { terms, postings },
        })
    }

    pub fn is_memory(&self) -> bool {
        matches!(self.state, InvertState::Memory(_))
    }

    pub fn add(&mut self, doc_id: u64, terms: &[(String, f64)]) -> Result<()> {
        let InvertState::Memory(map) = &mut self.state else {
            return Err(TesseraError::invalid_operation(format!(
                "inverted field `{}` is sealed",
                self.field
            )));
        };
        for (term, tf) in terms {
            map.entry(term.clone())
                .or_default()
                .push(Posting::new(doc_id, *tf));
        }
        Ok(())
    }

    pub fn search(&self, term: &str) -> Result<Vec<Posting>> {
        match &self.state {
            InvertState::Memory(map) => Ok(map.get(term).cloned().unwrap_or_default()),
            InvertState::Disk { terms, postings } => match terms.get(term)? {
                Some(offset) => read_postings(postings, offset),
                None => Ok(Vec::new()),
            },
        }
    }

    /// Sorted `(term, offset)` iteration over a sealed field.
    pub fn cursor(&self) -> Result<Box<dyn TermCursor + '_>> {
        match &self.state {
            InvertState::Disk { terms, .. } => terms.cursor(),
            InvertState::Memory(_) => Err(TesseraError::invalid_operation(format!(
                "inverted field `{}` has not been sealed",
                self.field
            ))),
        }
    }

    pub fn postings_at(&self, offset: u64) -> Result<Vec<Posting>> {
        match &self.state {
            InvertState::Disk { postings, .. } => read_postings(postings, offset),
            InvertState::Memory(_) => Err(TesseraError::invalid_operation(format!(
                "inverted field `{}` has not been sealed",
                self.field
            ))),
        }
    }

    /// Writes the in-memory postings and term dictionary into `dir`.
    pub fn serialize(
        &self,
        dir: &Path,
        kind: TermIndexKind,
        btree: &Arc<BTreeStore>,
    ) -> Result<()> {
        let InvertState::Memory(map) = &self.state else {
            return Err(TesseraError::invalid_operation(format!(
                "inverted field `{}` is already sealed",
                self.field
            )));
        };
        let mut postings = BufWriter::new(File::create(dir.join(postings_file_name(&self.field)))?);
        let mut terms = create_term_writer(kind, dir, &self.field, btree)?;
        let mut offset = 0u64;
        for (term, list) in map {
            terms.insert(term.as_bytes(), offset)?;
            offset += write_postings(&mut postings, list)?;
        }
        postings.flush()?;
        terms.finish()?;
        log::debug!(
            "serialized inverted field `{}`: {} terms, {offset} bytes",
            self.field,
            map.len()
        );
        Ok(())
    }
}
