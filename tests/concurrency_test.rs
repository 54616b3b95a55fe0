use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tempfile::TempDir;

use tessera::analysis::WhitespaceTokenizer;
use tessera::{Document, FieldType, Index, IndexConfig, SearchFilter, TermQuery};

const DOCS: u64 = 600;
const READERS: usize = 4;

fn create(dir: &std::path::Path) -> tessera::Result<Index> {
    let index = Index::create(
        dir,
        "stream",
        IndexConfig::default(),
        Arc::new(WhitespaceTokenizer::new()),
    )?;
    index.add_field("tag", FieldType::Keyword)?;
    index.add_field("n", FieldType::Number)?;
    Ok(index)
}

/// Documents are appended in docId order and never deleted, so every
/// consistent view is a prefix `0..k` that only grows.
fn assert_prefix(ids: &[u64], previous: usize) {
    let expected: Vec<u64> = (0..ids.len() as u64).collect();
    assert_eq!(ids, expected.as_slice(), "view is not a docId prefix");
    assert!(ids.len() >= previous, "view shrank from {previous} to {}", ids.len());
}

#[test]
fn test_readers_see_consistent_views_during_seal_and_merge() -> tessera::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = create(temp_dir.path())?;
    let done = AtomicBool::new(false);
    let merges = thread::scope(|scope| {
        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                scope.spawn(|| {
                    let mut seen_terms = 0;
                    let mut seen_filter = 0;
                    let mut rounds = 0u64;
                    loop {
                        let finished = done.load(Ordering::SeqCst);
                        let postings = index
                            .search_key_doc_ids(&TermQuery::new("tag", "all"))
                            .unwrap();
                        let ids: Vec<u64> = postings.iter().map(|p| p.doc_id).collect();
                        assert_prefix(&ids, seen_terms);
                        seen_terms = ids.len();

                        let ids = index
                            .search_filter_doc_ids(&SearchFilter::over("n", 0))
                            .unwrap();
                        assert_prefix(&ids, seen_filter);
                        seen_filter = ids.len();

                        rounds += 1;
                        if finished {
                            break;
                        }
                    }
                    assert_eq!(seen_terms as u64, DOCS);
                    assert_eq!(seen_filter as u64, DOCS);
                    rounds
                })
            })
            .collect();

        let mut merges = 0;
        for i in 0..DOCS {
            let doc = Document::new()
                .add_field("tag", "all")
                .add_field("n", i.to_string());
            assert_eq!(index.add_document(&doc).unwrap(), i);
            if i % 50 == 49 {
                index.sync_memory_segment().unwrap();
            }
            if i % 200 == 199 && index.merge_segments(None).unwrap() {
                merges += 1;
            }
        }
        done.store(true, Ordering::SeqCst);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
        merges
    });

    assert_eq!(merges, 3);
    assert_eq!(index.segment_count(), 1);
    assert_eq!(index.live_doc_count(), DOCS);
    Ok(())
}

#[test]
fn test_merge_does_not_disturb_concurrent_deletes() -> tessera::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = Index::create(
        temp_dir.path(),
        "keyed",
        IndexConfig::default(),
        Arc::new(WhitespaceTokenizer::new()),
    )?;
    index.add_field("id", FieldType::PrimaryKey)?;
    index.add_field("tag", FieldType::Keyword)?;
    for i in 0..400 {
        let doc = Document::new()
            .add_field("id", i.to_string())
            .add_field("tag", "all");
        index.add_document(&doc)?;
        if i % 100 == 99 {
            index.sync_memory_segment()?;
        }
    }

    thread::scope(|scope| {
        let deleter = scope.spawn(|| {
            for i in (0..400).step_by(2) {
                assert!(index.delete_document(&i.to_string()).unwrap());
            }
        });
        let merger = scope.spawn(|| index.merge_segments(None).unwrap());
        deleter.join().unwrap();
        assert!(merger.join().unwrap());
    });

    // Deletions racing the merge are kept by the tombstones either way.
    let ids: Vec<u64> = index
        .search_key_doc_ids(&TermQuery::new("tag", "all"))?
        .iter()
        .map(|p| p.doc_id)
        .collect();
    assert_eq!(ids, (1..400).step_by(2).collect::<Vec<u64>>());
    assert_eq!(index.live_doc_count(), 200);
    Ok(())
}
