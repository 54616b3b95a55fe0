use serde::{Deserialize, Serialize};

use crate::segment::term_index::TermIndexKind;

/// Per-index tuning knobs.
///
/// The two batch sizes define the durability window: up to
/// `primary_key_batch_size` key mappings and `tombstone_batch_size` deletions
/// may be lost on a crash. Both are flushed unconditionally on sync, merge and close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Buffered primary-key mappings that trigger a B+Tree flush.
    pub primary_key_batch_size: usize,
    /// Deletions that trigger a tombstone bitmap flush.
    pub tombstone_batch_size: usize,
    /// Segments with fewer documents than this are merge candidates.
    pub merge_size_threshold: u64,
    /// Trailing small segments needed before `check_merge` reports true.
    pub merge_min_segments: usize,
    /// Term dictionary encoding for sealed inverted fields.
    pub term_index: TermIndexKind,
    /// Fields whose term weights are multiplied by `title_boost`.
    pub title_fields: Vec<String>,
    pub title_boost: f64,
    pub default_page_size: usize,
}

impl IndexConfig {
    pub fn new() -> Self {
        Self {
            primary_key_batch_size: 50_000,
            tombstone_batch_size: 1_000,
            merge_size_threshold: 1_000_000,
            merge_min_segments: 4,
            term_index: TermIndexKind::Fst,
            title_fields: vec!["title".to_string()],
            title_boost: 10.0,
            default_page_size: 10,
        }
    }

    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::default()
    }

    /// Boost applied to term weights of `field`.
    pub fn field_boost(&self, field: &str) -> f64 {
        if self.title_fields.iter().any(|f| f == field) {
            self.title_boost
        } else {
            1.0
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    pub fn primary_key_batch_size(mut self, size: usize) -> Self {
        self.config.primary_key_batch_size = size.max(1);
        self
    }

    pub fn tombstone_batch_size(mut self, size: usize) -> Self {
        self.config.tombstone_batch_size = size.max(1);
        self
    }

    pub fn merge_size_threshold(mut self, docs: u64) -> Self {
        self.config.merge_size_threshold = docs;
        self
    }

    pub fn merge_min_segments(mut self, count: usize) -> Self {
        self.config.merge_min_segments = count.max(2);
        self
    }

    pub fn term_index(mut self, kind: TermIndexKind) -> Self {
        self.config.term_index = kind;
        self
    }

    pub fn title_field(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.config.title_fields.contains(&name) {
            self.config.title_fields.push(name);
        }
        self
    }

    pub fn title_boost(mut self, boost: f64) -> Self {
        self.config.title_boost = boost;
        self
    }

    pub fn default_page_size(mut self, size: usize) -> Self {
        self.config.default_page_size = size.max(1);
        self
    }

    pub fn build(self) -> IndexConfig {
        self.config
    }
}
