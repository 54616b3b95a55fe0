//! Query execution: boolean combination, ranking and pagination.

pub mod boolean;
pub mod query;
pub mod scoring;

use serde::Serialize;

use crate::data::Document;
use crate::error::Result;
use crate::index::Index;

use self::scoring::{ScoredDoc, TermPostings};

pub use self::query::{FilterKind, SearchFilter, SearchRequest, TermQuery};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub doc_id: u64,
    pub score: f64,
    pub document: Document,
}

/// One page of results. `from` and `to` are 1-based positions in the full
/// ranking, both zero when the page is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub total: usize,
    pub from: usize,
    pub to: usize,
    pub hits: Vec<Hit>,
}

impl SearchResult {
    pub fn doc_ids(&self) -> Vec<u64> {
        self.hits.iter().map(|h| h.doc_id).collect()
    }
}

/// Runs `request` against `index`.
///
/// Positive terms are unioned, filters intersected and exclusion terms
/// subtracted. Without positive terms every doc passing the filters is
/// returned with score zero in docId order. IDF is computed over the
/// candidates that survive the boolean stage, not the whole index.
pub fn search(index: &Index, request: &SearchRequest) -> Result<SearchResult> {
    // 1. Exclusions
    let mut excluded = Vec::new();
    for query in &request.excludes {
        excluded.extend(index.search_key_doc_ids(query)?);
    }
    let excluded = boolean::doc_ids(&excluded);

    // 2. Filters
    let mut filtered: Option<Vec<u64>> = None;
    for filter in &request.filters {
        let ids = index.search_filter_doc_ids(filter)?;
        filtered = Some(match filtered {
            Some(acc) => boolean::intersect(&acc, &ids),
            None => ids,
        });
    }

    // 3. Positive terms
    let config = index.config();
    let mut terms = Vec::with_capacity(request.queries.len());
    for query in &request.queries {
        let mut postings = index.search_key_doc_ids(query)?;
        postings.retain(|p| excluded.binary_search(&p.doc_id).is_err());
        terms.push(TermPostings {
            boost: config.field_boost(&query.field),
            postings,
        });
    }

    // 4. Candidates and ranking
    let scored: Vec<ScoredDoc> = if terms.is_empty() {
        let candidates = boolean::subtract(&filtered.unwrap_or_default(), &excluded);
        candidates
            .into_iter()
            .map(|doc_id| ScoredDoc { doc_id, score: 0.0 })
            .collect()
    } else {
        let lists: Vec<_> = terms.iter().map(|t| t.postings.clone()).collect();
        let mut candidates = boolean::doc_ids(&boolean::union(&lists));
        if let Some(filtered) = &filtered {
            candidates = boolean::intersect(&candidates, filtered);
        }
        let doc_count = candidates.len() as u64;
        scoring::rank(&candidates, &terms, doc_count)
    };

    // 5. Page
    paginate(index, &scored, request.page, request.page_size)
}

fn paginate(
    index: &Index,
    scored: &[ScoredDoc],
    page: usize,
    page_size: usize,
) -> Result<SearchResult> {
    let total = scored.len();
    let page_size = page_size.max(1);
    let start = page.max(1).saturating_sub(1).saturating_mul(page_size);
    if start >= total {
        return Ok(SearchResult {
            total,
            from: 0,
            to: 0,
            hits: Vec::new(),
        });
    }
    let end = start.saturating_add(page_size).min(total);

    let mut hits = Vec::with_capacity(end - start);
    for doc in &scored[start..end] {
        hits.push(Hit {
            doc_id: doc.doc_id,
            score: doc.score,
            document: index.get_document(doc.doc_id)?.unwrap_or_default(),
        });
    }
    Ok(SearchResult {
        total,
        from: start + 1,
        to: end,
        hits,
    })
}
