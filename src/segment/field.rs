use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::Tokenizer;
use crate::data::{FieldType, FieldValue, Posting};
use crate::error::{Result, TesseraError};
use crate::segment::invert::{InvertIndex, extract_terms};
use crate::segment::profile::Profile;
use crate::segment::profile_index::ProfileIndex;
use crate::segment::term_index::TermIndexKind;
use crate::storage::BTreeStore;

/// Per-field entry of `seg.meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMeta {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_index: Option<TermIndexKind>,
}

/// A field value parsed and tokenized, ready to be committed.
#[derive(Debug, Clone)]
pub struct PreparedValue {
    pub value: FieldValue,
    pub terms: Vec<(String, f64)>,
}

/// One schema field of a segment, covering `[start_doc_id, max_doc_id)`.
///
/// Which storage strategies are present depends on the declared type; a
/// placeholder has none and answers every lookup with nothing.
#[derive(Debug)]
pub struct Field {
    name: String,
    field_type: FieldType,
    start_doc_id: u64,
    max_doc_id: u64,
    invert: Option<InvertIndex>,
    profile: Option<Profile>,
    profile_index: Option<ProfileIndex>,
    term_index: Option<TermIndexKind>,
}

impl Field {
    pub fn new(name: &str, field_type: FieldType, start_doc_id: u64) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            start_doc_id,
            max_doc_id: start_doc_id,
            invert: field_type.is_inverted().then(|| InvertIndex::new(name)),
            profile: field_type
                .is_stored()
                .then(|| Profile::new(name, field_type, start_doc_id)),
            profile_index: field_type.is_numeric().then(|| ProfileIndex::new(name)),
            term_index: None,
        }
    }

    /// An empty field spanning `[start_doc_id, max_doc_id)` with no data.
    pub fn placeholder(
        name: &str,
        field_type: FieldType,
        start_doc_id: u64,
        max_doc_id: u64,
    ) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            start_doc_id,
            max_doc_id,
            invert: None,
            profile: None,
            profile_index: None,
            term_index: None,
        }
    }

    pub fn open(
        name: &str,
        meta: &FieldMeta,
        start_doc_id: u64,
        max_doc_id: u64,
        dir: &Path,
        btree: &Arc<BTreeStore>,
    ) -> Result<Self> {
        let field_type = meta.field_type;
        let invert = if field_type.is_inverted() {
            let kind = meta.term_index.unwrap_or_default();
            Some(InvertIndex::open(name, dir, kind, btree)?)
        } else {
            None
        };
        let profile = if field_type.is_stored() {
            Some(Profile::open(name, field_type, start_doc_id, dir)?)
        } else {
            None
        };
        let profile_index = if field_type.is_numeric() {
            Some(ProfileIndex::open(name, dir, btree)?)
        } else {
            None
        };
        Ok(Self {
            name: name.to_string(),
            field_type,
            start_doc_id,
            max_doc_id,
            invert,
            profile,
            profile_index,
            term_index: meta.term_index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn start_doc_id(&self) -> u64 {
        self.start_doc_id
    }

    pub fn max_doc_id(&self) -> u64 {
        self.max_doc_id
    }

    pub fn is_placeholder(&self) -> bool {
        self.invert.is_none() && self.profile.is_none() && self.profile_index.is_none()
    }

    pub(crate) fn invert(&self) -> Option<&InvertIndex> {
        self.invert.as_ref()
    }

    pub(crate) fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub(crate) fn profile_index(&self) -> Option<&ProfileIndex> {
        self.profile_index.as_ref()
    }

    /// Parses and tokenizes `raw` without touching the field. Missing values
    /// become the type's empty value.
    pub fn prepare(&self, raw: Option<&str>, tokenizer: &dyn Tokenizer) -> PreparedValue {
        let raw = raw.unwrap_or("");
        PreparedValue {
            value: FieldValue::parse(self.field_type, raw),
            terms: extract_terms(self.field_type, raw, tokenizer),
        }
    }

    /// Appends `doc_id`. The id must equal the field's current `max_doc_id`.
    pub fn add_document(&mut self, doc_id: u64, prepared: &PreparedValue) -> Result<()> {
        if doc_id != self.max_doc_id {
            return Err(TesseraError::invalid_operation(format!(
                "field `{}` expected docId {}, got {doc_id}",
                self.name, self.max_doc_id
            )));
        }
        if self.is_placeholder() {
            return Err(TesseraError::invalid_operation(format!(
                "placeholder field `{}` cannot take documents",
                self.name
            )));
        }
        if let Some(invert) = self.invert.as_mut() {
            invert.add(doc_id, &prepared.terms)?;
        }
        if let Some(profile) = self.profile.as_mut() {
            profile.add(&prepared.value)?;
        }
        if let (Some(index), Some(slot)) = (self.profile_index.as_mut(), prepared.value.slot()) {
            index.add(doc_id, slot)?;
        }
        self.max_doc_id += 1;
        Ok(())
    }

    pub fn get(&self, doc_id: u64) -> Result<Option<String>> {
        if doc_id < self.start_doc_id || doc_id >= self.max_doc_id {
            return Ok(None);
        }
        match &self.profile {
            Some(profile) => profile.get(doc_id),
            None => Ok(None),
        }
    }

    pub fn search(&self, term: &str) -> Result<Vec<Posting>> {
        match &self.invert {
            Some(invert) => invert.search(term),
            None => Ok(Vec::new()),
        }
    }

    /// DocIds whose value lies in `[min, max]` (unsorted across values).
    pub fn filter(&self, min: i64, max: i64) -> Result<Vec<u64>> {
        match &self.profile_index {
            Some(index) => index.range(min, max),
            None => Ok(Vec::new()),
        }
    }

    pub fn serialize(
        &self,
        dir: &Path,
        kind: TermIndexKind,
        btree: &Arc<BTreeStore>,
    ) -> Result<FieldMeta> {
        if let Some(invert) = &self.invert {
            invert.serialize(dir, kind, btree)?;
        }
        if let Some(profile) = &self.profile {
            profile.serialize(dir)?;
        }
        if let Some(index) = &self.profile_index {
            index.serialize(dir, btree)?;
        }
        Ok(FieldMeta {
            field_type: self.field_type,
            term_index: self.field_type.is_inverted().then_some(kind),
        })
    }

    pub fn term_index_kind(&self) -> Option<TermIndexKind> {
        self.term_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::WhitespaceTokenizer;

    #[test]
    fn test_sequential_doc_ids_enforced() -> Result<()> {
        let tokenizer = WhitespaceTokenizer::new();
        let mut field = Field::new("year", FieldType::Number, 5);
        let prepared = field.prepare(Some("1977"), &tokenizer);
        assert!(field.add_document(6, &prepared).is_err());
        field.add_document(5, &prepared)?;
        assert_eq!(field.max_doc_id(), 6);
        assert_eq!(field.get(5)?.as_deref(), Some("1977"));
        assert_eq!(field.filter(1977, 1977)?, vec![5]);
        Ok(())
    }

    #[test]
    fn test_missing_value_is_empty() -> Result<()> {
        let tokenizer = WhitespaceTokenizer::new();
        let mut field = Field::new("title", FieldType::Text, 0);
        let prepared = field.prepare(None, &tokenizer);
        field.add_document(0, &prepared)?;
        assert_eq!(field.get(0)?, None);
        assert!(field.search("")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_placeholder_answers_nothing() -> Result<()> {
        let field = Field::placeholder("year", FieldType::Number, 0, 10);
        assert!(field.is_placeholder());
        assert_eq!(field.get(3)?, None);
        assert!(field.filter(i64::MIN, i64::MAX)?.is_empty());
        assert!(field.search("x")?.is_empty());
        Ok(())
    }
}
