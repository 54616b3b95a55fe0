//! Search request model and request-parameter parsing.
//!
//! Parameters are `(key, value)` pairs whose key carries a sigil:
//!
//! | key            | meaning                                          |
//! |----------------|--------------------------------------------------|
//! | `-field=a,b`   | value ∈ {a, b}                                   |
//! | `>field=v`     | value ≥ v                                        |
//! | `<field=v`     | value ≤ v                                        |
//! | `~field=a,b`   | a ≤ value ≤ b                                    |
//! | `_field=text`  | exclude docs containing any term of `text`       |
//! | `field=text`   | positive query terms                             |
//!
//! `pageSize` and `curPage` select the page; `index` and `sort` are ignored.

use crate::analysis::Tokenizer;
use crate::data::{FieldType, FieldValue, Schema};
use crate::error::{Result, TesseraError};

/// A single term looked up in one inverted field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermQuery {
    pub field: String,
    pub term: String,
}

impl TermQuery {
    pub fn new(field: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            term: term.into(),
        }
    }
}

/// Numeric filter bounds, in the field's stored encoding. All bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKind {
    Equal(Vec<i64>),
    Over(i64),
    Less(i64),
    Range(i64, i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    pub field: String,
    pub kind: FilterKind,
}

impl SearchFilter {
    pub fn new(field: impl Into<String>, kind: FilterKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }

    pub fn range(field: impl Into<String>, min: i64, max: i64) -> Self {
        Self::new(field, FilterKind::Range(min, max))
    }

    pub fn equal(field: impl Into<String>, values: Vec<i64>) -> Self {
        Self::new(field, FilterKind::Equal(values))
    }

    pub fn over(field: impl Into<String>, min: i64) -> Self {
        Self::new(field, FilterKind::Over(min))
    }

    pub fn less(field: impl Into<String>, max: i64) -> Self {
        Self::new(field, FilterKind::Less(max))
    }

    /// The filter as a list of inclusive `(min, max)` ranges.
    pub fn ranges(&self) -> Vec<(i64, i64)> {
        match &self.kind {
            FilterKind::Equal(values) => values.iter().map(|v| (*v, *v)).collect(),
            FilterKind::Over(min) => vec![(*min, i64::MAX)],
            FilterKind::Less(max) => vec![(i64::MIN, *max)],
            FilterKind::Range(min, max) if min <= max => vec![(*min, *max)],
            FilterKind::Range(..) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub queries: Vec<TermQuery>,
    pub filters: Vec<SearchFilter>,
    pub excludes: Vec<TermQuery>,
    /// 1-based page number.
    pub page: usize,
    pub page_size: usize,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            queries: Vec::new(),
            filters: Vec::new(),
            excludes: Vec::new(),
            page: 1,
            page_size: 10,
        }
    }
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, field: impl Into<String>, term: impl Into<String>) -> Self {
        self.queries.push(TermQuery::new(field, term));
        self
    }

    pub fn filter(mut self, filter: SearchFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn exclude(mut self, field: impl Into<String>, term: impl Into<String>) -> Self {
        self.excludes.push(TermQuery::new(field, term));
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Builds a request from sigil-prefixed parameters against `schema`.
    pub fn parse<I, K, V>(
        params: I,
        schema: &Schema,
        tokenizer: &dyn Tokenizer,
        default_page_size: usize,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut request = SearchRequest::new().page_size(default_page_size);
        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "index" | "sort" => continue,
                "pageSize" => {
                    request.page_size = parse_positive(value).unwrap_or(default_page_size.max(1));
                    continue;
                }
                "curPage" => {
                    request.page = parse_positive(value).unwrap_or(1);
                    continue;
                }
                _ => {}
            }

            let (sigil, name) = match key.chars().next() {
                Some(c @ ('-' | '>' | '<' | '~' | '_')) => (Some(c), &key[1..]),
                _ => (None, key),
            };
            let Some(field_type) = schema.field_type(name) else {
                log::debug!("ignoring search parameter for unknown field `{name}`");
                continue;
            };

            match sigil {
                Some('_') => {
                    for term in query_terms(name, field_type, value, tokenizer)? {
                        request.excludes.push(term);
                    }
                }
                Some(sigil) => {
                    let kind = parse_filter(sigil, name, field_type, value)?;
                    request.filters.push(SearchFilter::new(name, kind));
                }
                None => {
                    for term in query_terms(name, field_type, value, tokenizer)? {
                        request.queries.push(term);
                    }
                }
            }
        }
        Ok(request)
    }
}

fn parse_positive(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok().filter(|v| *v > 0)
}

fn query_terms(
    field: &str,
    field_type: FieldType,
    value: &str,
    tokenizer: &dyn Tokenizer,
) -> Result<Vec<TermQuery>> {
    match field_type {
        FieldType::Text => Ok(tokenizer
            .cut(value)
            .into_iter()
            .map(|term| TermQuery::new(field, term))
            .collect()),
        FieldType::Keyword => Ok(vec![TermQuery::new(field, value)]),
        _ => Err(TesseraError::query(format!(
            "field `{field}` is not full-text searchable; filter it with one of \
             -{field}, >{field}, <{field} or ~{field}"
        ))),
    }
}

fn filter_value(field: &str, field_type: FieldType, raw: &str) -> Result<i64> {
    FieldValue::parse_strict(field_type, raw)
        .and_then(|v| v.slot())
        .ok_or_else(|| {
            TesseraError::query(format!(
                "invalid {field_type:?} value {raw:?} for field `{field}`"
            ))
        })
}

fn parse_filter(
    sigil: char,
    field: &str,
    field_type: FieldType,
    value: &str,
) -> Result<FilterKind> {
    if !field_type.is_numeric() {
        return Err(TesseraError::query(format!(
            "field `{field}` is not numeric and cannot be filtered"
        )));
    }
    match sigil {
        '-' => Ok(FilterKind::Equal(
            value
                .split(',')
                .map(|v| filter_value(field, field_type, v))
                .collect::<Result<Vec<_>>>()?,
        )),
        '>' => Ok(FilterKind::Over(filter_value(field, field_type, value)?)),
        '<' => Ok(FilterKind::Less(filter_value(field, field_type, value)?)),
        _ => {
            let Some((min, max)) = value.split_once(',') else {
                return Err(TesseraError::query(format!(
                    "range filter on `{field}` expects min,max, got {value:?}"
                )));
            };
            Ok(FilterKind::Range(
                filter_value(field, field_type, min)?,
                filter_value(field, field_type, max)?,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::WhitespaceTokenizer;

    fn schema() -> Schema {
        let mut schema = Schema::new();
        schema.fields.insert("id".into(), FieldType::PrimaryKey);
        schema.fields.insert("year".into(), FieldType::Number);
        schema.fields.insert("price".into(), FieldType::Float);
        schema.fields.insert("title".into(), FieldType::Text);
        schema.fields.insert("tag".into(), FieldType::Keyword);
        schema.primary_key = Some("id".into());
        schema
    }

    #[test]
    fn test_parse_sigils() -> Result<()> {
        let params = [
            ("index", "books"),
            ("title", "great victory"),
            ("tag", "new wave"),
            ("_title", "defeat"),
            ("-year", "1977,1978"),
            (">price", "9.5"),
            ("<year", "2000"),
            ("~year", "1970,1980"),
            ("unknown", "x"),
            ("pageSize", "5"),
            ("curPage", "2"),
        ];
        let request = SearchRequest::parse(params, &schema(), &WhitespaceTokenizer::new(), 10)?;

        assert_eq!(
            request.queries,
            vec![
                TermQuery::new("title", "great"),
                TermQuery::new("title", "victory"),
                TermQuery::new("tag", "new wave"),
            ]
        );
        assert_eq!(request.excludes, vec![TermQuery::new("title", "defeat")]);
        assert_eq!(
            request.filters,
            vec![
                SearchFilter::equal("year", vec![1977, 1978]),
                SearchFilter::over("price", 950),
                SearchFilter::less("year", 2000),
                SearchFilter::range("year", 1970, 1980),
            ]
        );
        assert_eq!(request.page, 2);
        assert_eq!(request.page_size, 5);
        Ok(())
    }

    #[test]
    fn test_bad_paging_falls_back_to_defaults() -> Result<()> {
        let params = [("pageSize", "-3"), ("curPage", "zero")];
        let request = SearchRequest::parse(params, &schema(), &WhitespaceTokenizer::new(), 10)?;
        assert_eq!(request.page, 1);
        assert_eq!(request.page_size, 10);
        Ok(())
    }

    #[test]
    fn test_malformed_filters_are_errors() {
        let tokenizer = WhitespaceTokenizer::new();
        for params in [
            [("~year", "1970")],
            [("-year", "abc")],
            [(">title", "3")],
            [("year", "1977")],
        ] {
            assert!(SearchRequest::parse(params, &schema(), &tokenizer, 10).is_err());
        }
    }

    #[test]
    fn test_filter_ranges() {
        assert_eq!(SearchFilter::over("y", 5).ranges(), vec![(5, i64::MAX)]);
        assert_eq!(SearchFilter::less("y", 5).ranges(), vec![(i64::MIN, 5)]);
        assert!(SearchFilter::range("y", 9, 1).ranges().is_empty());
        assert_eq!(
            SearchFilter::equal("y", vec![1, 3]).ranges(),
            vec![(1, 1), (3, 3)]
        );
    }
}
