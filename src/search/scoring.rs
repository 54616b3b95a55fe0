//! TF-IDF vector-space ranking with a coordination factor.
//!
//! For query terms `t_0..t_n` every candidate document gets a weight vector
//! `w[i] = tf(doc, t_i) * idf(t_i) * boost(field(t_i))`. The query vector
//! holds, per position, the largest weight any candidate reached. A
//! document's score is `cosine(query, doc) * matched / n`.

use ahash::AHashMap;

use crate::data::Posting;

/// Postings of one query term, with the boost of the field it was looked up in.
#[derive(Debug, Clone)]
pub struct TermPostings {
    pub boost: f64,
    pub postings: Vec<Posting>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: u64,
    pub score: f64,
}

/// `ln(doc_count / (doc_freq + 1))`. Zero for an empty candidate set.
///
/// Negative when a term occurs in most candidates; the query vector then
/// stays at zero for that term.
pub fn idf(doc_count: u64, doc_freq: usize) -> f64 {
    if doc_count == 0 {
        return 0.0;
    }
    (doc_count as f64 / (doc_freq as f64 + 1.0)).ln()
}

pub fn term_weight(term_frequency: f64, idf: f64, boost: f64) -> f64 {
    term_frequency * idf * boost
}

/// Cosine similarity; zero when either vector has zero length.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Scores `candidates` against `terms` and sorts them by score descending,
/// then docId ascending. `doc_count` is the number of boolean candidates.
pub fn rank(candidates: &[u64], terms: &[TermPostings], doc_count: u64) -> Vec<ScoredDoc> {
    let n = terms.len();
    let mut vectors: AHashMap<u64, (Vec<f64>, usize)> = candidates
        .iter()
        .map(|id| (*id, (vec![0.0; n], 0)))
        .collect();
    let mut query = vec![0.0f64; n];

    for (i, term) in terms.iter().enumerate() {
        let idf = idf(doc_count, term.postings.len());
        for posting in &term.postings {
            let Some((weights, matched)) = vectors.get_mut(&posting.doc_id) else {
                continue;
            };
            let weight = term_weight(posting.term_frequency, idf, term.boost);
            weights[i] = weight;
            *matched += 1;
            query[i] = query[i].max(weight);
        }
    }

    let mut scored: Vec<ScoredDoc> = candidates
        .iter()
        .map(|id| {
            let score = match vectors.get(id) {
                Some((weights, matched)) if n > 0 => {
                    cosine(&query, weights) * (*matched as f64 / n as f64)
                }
                _ => 0.0,
            };
            ScoredDoc { doc_id: *id, score }
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
    scored
}
