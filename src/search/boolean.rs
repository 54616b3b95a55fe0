//! Set operations over docId lists.
//!
//! All inputs and outputs of [`intersect`] and [`subtract`] are sorted and
//! free of duplicates.

use crate::data::Posting;

/// Concatenates posting lists ordered by docId. A doc matched by several
/// terms appears once per term.
pub fn union(lists: &[Vec<Posting>]) -> Vec<Posting> {
    let mut merged: Vec<Posting> = lists.iter().flatten().copied().collect();
    merged.sort_by_key(|p| p.doc_id);
    merged
}

/// Sorted, distinct docIds of `postings`.
pub fn doc_ids(postings: &[Posting]) -> Vec<u64> {
    let mut ids: Vec<u64> = postings.iter().map(|p| p.doc_id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

pub fn intersect(a: &[u64], b: &[u64]) -> Vec<u64> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Elements of `a` not in `b`.
pub fn subtract(a: &[u64], b: &[u64]) -> Vec<u64> {
    let mut out = Vec::with_capacity(a.len());
    let mut j = 0;
    for &id in a {
        while j < b.len() && b[j] < id {
            j += 1;
        }
        if j < b.len() && b[j] == id {
            continue;
        }
        out.push(id);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_keeps_duplicates() {
        let merged = union(&[
            vec![Posting::new(3, 0.5), Posting::new(7, 1.0)],
            vec![Posting::new(1, 0.2), Posting::new(3, 0.1)],
        ]);
        let ids: Vec<u64> = merged.iter().map(|p| p.doc_id).collect();
        assert_eq!(ids, vec![1, 3, 3, 7]);
        assert_eq!(doc_ids(&merged), vec![1, 3, 7]);
    }

    #[test]
    fn test_intersect_and_subtract() {
        assert_eq!(intersect(&[1, 2, 4, 8], &[2, 3, 4, 9]), vec![2, 4]);
        assert!(intersect(&[1, 2], &[]).is_empty());
        assert_eq!(subtract(&[1, 2, 4, 8], &[0, 2, 8, 10]), vec![1, 4]);
        assert_eq!(subtract(&[5], &[]), vec![5]);
    }
}
