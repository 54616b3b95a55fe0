//! Forward store: one value per docId, addressed by `doc_id - start_doc_id`.
//!
//! Numeric, float and date fields use an 8-byte little-endian slot per
//! document in `{field}_profile.pfl`. String fields store an 8-byte offset per
//! document in the `.pfl` file, pointing at a `u64` length + bytes entry in
//! `{field}_detail.dtl`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::data::{ABSENT, FieldType, FieldValue};
use crate::error::{Result, TesseraError};
use crate::storage::MappedFile;

pub fn profile_file_name(field: &str) -> String {
    format!("{field}_profile.pfl")
}

pub fn detail_file_name(field: &str) -> String {
    format!("{field}_detail.dtl")
}

#[derive(Debug)]
enum ProfileState {
    Numeric(Vec<i64>),
    Text(Vec<String>),
    NumericDisk(MappedFile),
    TextDisk {
        offsets: MappedFile,
        details: MappedFile,
    },
}

#[derive(Debug)]
pub struct Profile {
    field: String,
    field_type: FieldType,
    start_doc_id: u64,
    state: ProfileState,
}

impl Profile {
    pub fn new(field: &str, field_type: FieldType, start_doc_id: u64) -> Self {
        let state = if field_type.is_numeric() {
            ProfileState::Numeric(Vec::new())
        } else {
            ProfileState::Text(Vec::new())
        };
        Self {
            field: field.to_string(),
            field_type,
            start_doc_id,
            state,
        }
    }

    pub fn open(
        field: &str,
        field_type: FieldType,
        start_doc_id: u64,
        dir: &Path,
    ) -> Result<Self> {
        let offsets = MappedFile::open(dir.join(profile_file_name(field)))?;
        let state = if field_type.is_numeric() {
            ProfileState::NumericDisk(offsets)
        } else {
            let details = MappedFile::open(dir.join(detail_file_name(field)))?;
            ProfileState::TextDisk { offsets, details }
        };
        Ok(Self {
            field: field.to_string(),
            field_type,
            start_doc_id,
            state,
        })
    }

    pub fn add(&mut self, value: &FieldValue) -> Result<()> {
        match (&mut self.state, value) {
            (
                ProfileState::Numeric(slots),
                FieldValue::Int(v) | FieldValue::Float(v) | FieldValue::Date(v),
            ) => {
                slots.push(*v);
                Ok(())
            }
            (ProfileState::Text(values), FieldValue::Str(s)) => {
                values.push(s.clone());
                Ok(())
            }
            (ProfileState::NumericDisk(_) | ProfileState::TextDisk { .. }, _) => {
                Err(TesseraError::invalid_operation(format!(
                    "profile field `{}` is sealed",
                    self.field
                )))
            }
            (_, value) => Err(TesseraError::field(format!(
                "value {value:?} does not fit {:?} field `{}`",
                self.field_type, self.field
            ))),
        }
    }

    fn position(&self, doc_id: u64) -> Option<usize> {
        doc_id.checked_sub(self.start_doc_id).map(|p| p as usize)
    }

    /// Raw numeric slot of `doc_id` (`ABSENT` when missing).
    pub fn slot(&self, doc_id: u64) -> Result<i64> {
        let Some(pos) = self.position(doc_id) else {
            return Ok(ABSENT);
        };
        match &self.state {
            ProfileState::Numeric(slots) => Ok(slots.get(pos).copied().unwrap_or(ABSENT)),
            ProfileState::NumericDisk(file) => {
                if (pos + 1) * 8 > file.len() {
                    return Ok(ABSENT);
                }
                file.read_i64(pos * 8)
            }
            _ => Err(TesseraError::field(format!(
                "field `{}` has no numeric slots",
                self.field
            ))),
        }
    }

    /// Raw string value of `doc_id`; empty when missing.
    pub fn text(&self, doc_id: u64) -> Result<String> {
        let Some(pos) = self.position(doc_id) else {
            return Ok(String::new());
        };
        match &self.state {
            ProfileState::Text(values) => Ok(values.get(pos).cloned().unwrap_or_default()),
            ProfileState::TextDisk { offsets, details } => {
                if (pos + 1) * 8 > offsets.len() {
                    return Ok(String::new());
                }
                let offset = offsets.read_u64(pos * 8)? as usize;
                let len = details.read_u64(offset)? as usize;
                let bytes = details.slice(offset + 8, len)?;
                String::from_utf8(bytes.to_vec()).map_err(|e| {
                    TesseraError::storage(format!("corrupt detail entry in `{}`: {e}", self.field))
                })
            }
            _ => Err(TesseraError::field(format!(
                "field `{}` has no string values",
                self.field
            ))),
        }
    }

    /// Rendered value of `doc_id`; `None` when absent or empty.
    pub fn get(&self, doc_id: u64) -> Result<Option<String>> {
        if self.field_type.is_numeric() {
            Ok(FieldValue::render_slot(self.field_type, self.slot(doc_id)?))
        } else {
            let text = self.text(doc_id)?;
            Ok((!text.is_empty()).then_some(text))
        }
    }

    pub fn serialize(&self, dir: &Path) -> Result<()> {
        let mut writer = ProfileWriter::create(&self.field, self.field_type, dir)?;
        match &self.state {
            ProfileState::Numeric(slots) => {
                for slot in slots {
                    writer.push_slot(*slot)?;
                }
            }
            ProfileState::Text(values) => {
                for value in values {
                    writer.push_text(value)?;
                }
            }
            _ => {
                return Err(TesseraError::invalid_operation(format!(
                    "profile field `{}` is already sealed",
                    self.field
                )));
            }
        }
        writer.finish()
    }
}

/// Sequential writer for profile files, shared by sealing and merging.
pub struct ProfileWriter {
    numeric: bool,
    slots: BufWriter<File>,
    details: Option<BufWriter<File>>,
    detail_offset: u64,
}

impl ProfileWriter {
    pub fn create(field: &str, field_type: FieldType, dir: &Path) -> Result<Self> {
        let numeric = field_type.is_numeric();
        let slots = BufWriter::new(File::create(dir.join(profile_file_name(field)))?);
        let details = if numeric {
            None
        } else {
            Some(BufWriter::new(File::create(dir.join(detail_file_name(field)))?))
        };
        Ok(Self {
            numeric,
            slots,
            details,
            detail_offset: 0,
        })
    }

    pub fn push_slot(&mut self, slot: i64) -> Result<()> {
        self.slots.write_i64::<LittleEndian>(slot)?;
        Ok(())
    }

    pub fn push_text(&mut self, value: &str) -> Result<()> {
        let Some(details) = self.details.as_mut() else {
            return Err(TesseraError::field("numeric profile cannot hold text"));
        };
        self.slots.write_u64::<LittleEndian>(self.detail_offset)?;
        details.write_u64::<LittleEndian>(value.len() as u64)?;
        details.write_all(value.as_bytes())?;
        self.detail_offset += 8 + value.len() as u64;
        Ok(())
    }

    /// Writes the empty value used for tombstoned documents and docId gaps.
    pub fn push_placeholder(&mut self) -> Result<()> {
        if self.numeric {
            self.push_slot(ABSENT)
        } else {
            self.push_text("")
        }
    }

    pub fn finish(mut self) -> Result<()> {
        self.slots.flush()?;
        if let Some(details) = self.details.as_mut() {
            details.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_numeric_profile_roundtrip_through_disk() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let mut profile = Profile::new("price", FieldType::Float, 10);
        profile.add(&FieldValue::Float(1999))?;
        profile.add(&FieldValue::Float(ABSENT))?;
        assert_eq!(profile.get(10)?.as_deref(), Some("19.99"));
        assert_eq!(profile.get(11)?, None);

        profile.serialize(dir.path())?;
        let sealed = Profile::open("price", FieldType::Float, 10, dir.path())?;
        assert_eq!(sealed.slot(10)?, 1999);
        assert_eq!(sealed.get(11)?, None);
        assert_eq!(sealed.get(9)?, None);
        assert_eq!(sealed.get(12)?, None);
        Ok(())
    }

    #[test]
    fn test_text_profile_roundtrip_through_disk() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let mut profile = Profile::new("title", FieldType::Text, 0);
        profile.add(&FieldValue::Str("伟大的胜利".into()))?;
        profile.add(&FieldValue::Str(String::new()))?;
        profile.add(&FieldValue::Str("改革开放".into()))?;
        profile.serialize(dir.path())?;

        let mut sealed = Profile::open("title", FieldType::Text, 0, dir.path())?;
        assert_eq!(sealed.get(0)?.as_deref(), Some("伟大的胜利"));
        assert_eq!(sealed.get(1)?, None);
        assert_eq!(sealed.get(2)?.as_deref(), Some("改革开放"));
        assert!(sealed.add(&FieldValue::Str("late".into())).is_err());
        Ok(())
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let mut profile = Profile::new("year", FieldType::Number, 0);
        assert!(profile.add(&FieldValue::Str("x".into())).is_err());
    }
}
