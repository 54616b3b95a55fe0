use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Slot value stored for a numeric field that has no (parseable) value.
///
/// A real value whose slot encoding equals this marker is indistinguishable
/// from a missing one: it is not returned and not range-indexed.
pub const ABSENT: i64 = -1;

/// Size in bytes of one on-disk posting record: docId (u64) + term frequency (f64).
pub const POSTING_SIZE: usize = 16;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Declared type of a schema field.
///
/// The type selects which storage strategies a field gets:
///
/// | Type         | inverted | profile | range index |
/// |--------------|----------|---------|-------------|
/// | `Keyword`    | yes      | yes     | no          |
/// | `Text`       | yes      | yes     | no          |
/// | `Number`     | no       | yes     | yes         |
/// | `Float`      | no       | yes     | yes         |
/// | `Date`       | no       | yes     | yes         |
/// | `PrimaryKey` | no       | no      | no          |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Whole-value match: the entire string is one term.
    Keyword,
    /// Tokenized text: the string is cut into terms by the tokenizer.
    Text,
    /// Signed 64-bit integer. `-1` is the absent marker and cannot be stored.
    Number,
    /// Decimal number stored as fixed-point with two fractional digits.
    /// `-0.01` encodes to the absent marker and cannot be stored.
    Float,
    /// Date or datetime stored as a unix timestamp (seconds, UTC).
    /// `1969-12-31 23:59:59` encodes to the absent marker and cannot be stored.
    Date,
    /// Primary key. Maps an integer key to the latest docId, never stored in segments.
    PrimaryKey,
}

impl FieldType {
    pub fn is_inverted(self) -> bool {
        matches!(self, FieldType::Keyword | FieldType::Text)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Number | FieldType::Float | FieldType::Date)
    }

    /// Whether values of this type live in segments at all.
    pub fn is_stored(self) -> bool {
        self != FieldType::PrimaryKey
    }
}

/// A typed field value, selected by the field's declared type at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(i64),
    /// Fixed-point, hundredths.
    Float(i64),
    Str(String),
    /// Unix timestamp in seconds.
    Date(i64),
}

impl FieldValue {
    /// Parses `raw` according to `field_type`, returning `None` when the text is
    /// not a valid value of that type.
    pub fn parse_strict(field_type: FieldType, raw: &str) -> Option<FieldValue> {
        let trimmed = raw.trim();
        match field_type {
            FieldType::Keyword | FieldType::Text => Some(FieldValue::Str(raw.to_string())),
            FieldType::Number | FieldType::PrimaryKey => {
                trimmed.parse::<i64>().ok().map(FieldValue::Int)
            }
            FieldType::Float => trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| FieldValue::Float((f * 100.0).round() as i64)),
            FieldType::Date => parse_date(trimmed).map(FieldValue::Date),
        }
    }

    /// Lenient variant used at ingestion: unparseable numeric input becomes the
    /// absent sentinel.
    pub fn parse(field_type: FieldType, raw: &str) -> FieldValue {
        if let Some(value) = Self::parse_strict(field_type, raw) {
            if value.slot() == Some(ABSENT) {
                log::warn!("{raw:?} is the absent marker for {field_type:?}, storing as absent");
            }
            return value;
        }
        if !raw.trim().is_empty() {
            log::warn!("cannot parse {raw:?} as {field_type:?}, storing as absent");
        }
        match field_type {
            FieldType::Float => FieldValue::Float(ABSENT),
            FieldType::Date => FieldValue::Date(ABSENT),
            _ => FieldValue::Int(ABSENT),
        }
    }

    /// The 8-byte slot encoding of numeric values.
    pub fn slot(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) | FieldValue::Float(v) | FieldValue::Date(v) => Some(*v),
            FieldValue::Str(_) => None,
        }
    }

    /// Renders a stored slot back to text. Absent slots render as `None`.
    pub fn render_slot(field_type: FieldType, slot: i64) -> Option<String> {
        if slot == ABSENT {
            return None;
        }
        match field_type {
            FieldType::Float => Some((slot as f64 / 100.0).to_string()),
            FieldType::Date => format_date(slot),
            _ => Some(slot.to_string()),
        }
    }
}

/// Parses `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` or a raw unix timestamp into
/// seconds since the epoch (UTC).
pub fn parse_date(raw: &str) -> Option<i64> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT) {
        return Some(dt.and_utc().timestamp());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp());
    }
    raw.parse::<i64>().ok()
}

pub fn format_date(timestamp: i64) -> Option<String> {
    DateTime::from_timestamp(timestamp, 0).map(|dt| dt.format(DATETIME_FORMAT).to_string())
}

/// One (docId, term frequency) record of a posting list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Posting {
    pub doc_id: u64,
    pub term_frequency: f64,
}

impl Posting {
    pub fn new(doc_id: u64, term_frequency: f64) -> Self {
        Self {
            doc_id,
            term_frequency,
        }
    }
}

/// Field name to type mapping plus the optional primary-key field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub fields: BTreeMap<String, FieldType>,
    #[serde(default)]
    pub primary_key: Option<String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The subset of fields stored in segments (everything but the primary key).
    pub fn stored_fields(&self) -> BTreeMap<String, FieldType> {
        self.fields
            .iter()
            .filter(|(_, t)| t.is_stored())
            .map(|(n, t)| (n.clone(), *t))
            .collect()
    }
}

/// A document: field name to raw string value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub fields: BTreeMap<String, String>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field to the document.
    pub fn add_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Get a field's raw value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_encoding_to_absent_marker_are_absent() {
        for (field_type, raw) in [
            (FieldType::Number, "-1"),
            (FieldType::Float, "-0.01"),
            (FieldType::Date, "1969-12-31 23:59:59"),
        ] {
            let slot = FieldValue::parse(field_type, raw).slot();
            assert_eq!(slot, Some(ABSENT), "{field_type:?} {raw}");
            assert_eq!(FieldValue::render_slot(field_type, ABSENT), None);
        }
        assert_eq!(FieldValue::parse(FieldType::Number, "-2").slot(), Some(-2));
    }

    #[test]
    fn test_float_is_fixed_point() {
        let value = FieldValue::parse(FieldType::Float, "3.14159");
        assert_eq!(value, FieldValue::Float(314));
        assert_eq!(
            FieldValue::render_slot(FieldType::Float, 350).as_deref(),
            Some("3.5")
        );
    }

    #[test]
    fn test_unparseable_number_is_absent() {
        assert_eq!(
            FieldValue::parse(FieldType::Number, "nineteen"),
            FieldValue::Int(ABSENT)
        );
        assert_eq!(FieldValue::render_slot(FieldType::Number, ABSENT), None);
        assert!(FieldValue::parse_strict(FieldType::Number, "nineteen").is_none());
    }

    #[test]
    fn test_date_formats() {
        let full = parse_date("2020-01-02 03:04:05").unwrap();
        let day = parse_date("2020-01-02").unwrap();
        assert_eq!(full - day, 3 * 3600 + 4 * 60 + 5);
        assert_eq!(parse_date("1577934245"), Some(1577934245));
        assert_eq!(format_date(day).as_deref(), Some("2020-01-02 00:00:00"));
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn test_schema_stored_fields_skip_primary_key() {
        let mut schema = Schema::new();
        schema.fields.insert("id".into(), FieldType::PrimaryKey);
        schema.fields.insert("year".into(), FieldType::Number);
        schema.primary_key = Some("id".into());

        let stored = schema.stored_fields();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.get("year"), Some(&FieldType::Number));
    }

    #[test]
    fn test_document_builder() {
        let doc = Document::new()
            .add_field("year", "1977")
            .add_field("title", "hello");
        assert_eq!(doc.get("year"), Some("1977"));
        assert_eq!(doc.len(), 2);

        let collected: Document = [("a", "1")].into_iter().collect();
        assert_eq!(collected.get("a"), Some("1"));
    }
}
