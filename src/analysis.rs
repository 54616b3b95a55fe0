//! Text analysis capabilities consumed by the engine.
//!
//! The engine does not segment text itself. Anything implementing
//! [`Tokenizer`] can be plugged into an [`Index`](crate::Index); the default is
//! [`UnicodeTokenizer`], which splits on UAX #29 word boundaries.
//!
//! ```
//! use tessera::analysis::{Tokenizer, UnicodeTokenizer};
//!
//! let tokenizer = UnicodeTokenizer::new();
//! assert_eq!(tokenizer.cut("Hello, World!"), vec!["hello", "world"]);
//! ```

use std::fmt;

use unicode_segmentation::UnicodeSegmentation;

/// Splits raw text into an ordered sequence of terms.
pub trait Tokenizer: Send + Sync + fmt::Debug {
    fn cut(&self, text: &str) -> Vec<String>;
}

/// Unicode word-boundary tokenizer that lowercases its output.
#[derive(Clone, Debug, Default)]
pub struct UnicodeTokenizer;

impl UnicodeTokenizer {
    pub fn new() -> Self {
        UnicodeTokenizer
    }
}

impl Tokenizer for UnicodeTokenizer {
    fn cut(&self, text: &str) -> Vec<String> {
        text.unicode_words().map(|w| w.to_lowercase()).collect()
    }
}

/// Splits on whitespace and keeps terms verbatim.
#[derive(Clone, Debug, Default)]
pub struct WhitespaceTokenizer;

impl WhitespaceTokenizer {
    pub fn new() -> Self {
        WhitespaceTokenizer
    }
}

impl Tokenizer for WhitespaceTokenizer {
    fn cut(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }
}

/// Append-only receiver of indexed terms, e.g. an autocomplete trie.
pub trait SuggestionSink: Send + Sync + fmt::Debug {
    fn insert(&self, term: &str);
}

/// Sink that discards every term.
#[derive(Clone, Debug, Default)]
pub struct NoopSuggestionSink;

impl SuggestionSink for NoopSuggestionSink {
    fn insert(&self, _term: &str) {}
}
