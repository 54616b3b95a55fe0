use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use tessera::analysis::{SuggestionSink, WhitespaceTokenizer};
use tessera::{Document, Engine, FieldType, Index, IndexConfig, SearchFilter, SearchRequest};

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn open_engine(dir: &std::path::Path) -> tessera::Result<Engine> {
    Engine::open_with_tokenizer(
        dir,
        IndexConfig::default(),
        Arc::new(WhitespaceTokenizer::new()),
    )
}

#[test]
fn test_title_boost_orders_results() -> tessera::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_engine(temp_dir.path())?;
    engine.create_index("docs", &[("title", FieldType::Text), ("body", FieldType::Text)])?;

    let in_title = engine.add_document(
        "docs",
        &Document::new().add_field("title", "rust").add_field("body", "intro"),
    )?;
    let in_body = engine.add_document(
        "docs",
        &Document::new().add_field("title", "intro").add_field("body", "rust"),
    )?;
    let other = engine.add_document(
        "docs",
        &Document::new().add_field("title", "filler").add_field("body", "other"),
    )?;
    for _ in 0..5 {
        engine.add_document(
            "docs",
            &Document::new().add_field("title", "filler").add_field("body", "filler"),
        )?;
    }

    // Three candidates, each term matching one of them: idf = ln(3 / 2).
    let result = engine.search(
        "docs",
        &params(&[("title", "rust"), ("body", "rust"), ("body", "other")]),
    )?;
    assert_eq!(result.doc_ids(), vec![in_title, in_body, other]);
    let ratio = result.hits[0].score / result.hits[1].score;
    assert!((ratio - 10.0).abs() < 1e-9, "ratio was {ratio}");
    assert_eq!(result.hits[1].score, result.hits[2].score);
    assert_eq!(result.hits[0].document.get("title"), Some("rust"));
    Ok(())
}

#[test]
fn test_idf_counts_candidates_not_corpus() -> tessera::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_engine(temp_dir.path())?;
    engine.create_index("docs", &[("body", FieldType::Text)])?;
    for body in ["a", "a b", "b"] {
        engine.add_document("docs", &Document::new().add_field("body", body))?;
    }
    for _ in 0..7 {
        engine.add_document("docs", &Document::new().add_field("body", "z"))?;
    }

    // Three candidates and each term in two of them: idf = ln(3 / 3) = 0.
    let result = engine.search("docs", &params(&[("body", "a"), ("body", "b")]))?;
    assert_eq!(result.total, 3);
    assert_eq!(result.doc_ids(), vec![0, 1, 2]);
    assert!(result.hits.iter().all(|h| h.score == 0.0));
    Ok(())
}

#[test]
fn test_filters_without_terms_return_doc_id_order() -> tessera::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_engine(temp_dir.path())?;
    engine.create_index("films", &[("year", FieldType::Number), ("rating", FieldType::Float)])?;
    for (year, rating) in [("1999", "7.5"), ("2003", "8.1"), ("2010", "6.0"), ("2004", "9.0")] {
        engine.add_document(
            "films",
            &Document::new().add_field("year", year).add_field("rating", rating),
        )?;
    }
    engine.sync("films")?;

    let result = engine.search("films", &params(&[("~year", "2000,2010")]))?;
    assert_eq!(result.doc_ids(), vec![1, 2, 3]);
    assert!(result.hits.iter().all(|h| h.score == 0.0));

    let result = engine.search("films", &params(&[("~year", "2000,2010"), (">rating", "8")]))?;
    assert_eq!(result.doc_ids(), vec![1, 3]);

    let result = engine.search("films", &params(&[("-year", "1999,2010")]))?;
    assert_eq!(result.doc_ids(), vec![0, 2]);

    let result = engine.search("films", &params(&[("<rating", "7.5")]))?;
    assert_eq!(result.doc_ids(), vec![0, 2]);
    Ok(())
}

#[test]
fn test_pagination() -> tessera::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_engine(temp_dir.path())?;
    engine.create_index("nums", &[("n", FieldType::Number)])?;
    for i in 0..25 {
        engine.add_document("nums", &Document::new().add_field("n", i.to_string()))?;
    }

    let page = engine.search(
        "nums",
        &params(&[(">n", "0"), ("pageSize", "10"), ("curPage", "3")]),
    )?;
    assert_eq!(page.total, 25);
    assert_eq!((page.from, page.to), (21, 25));
    assert_eq!(page.doc_ids(), (20..25).collect::<Vec<u64>>());

    let page = engine.search(
        "nums",
        &params(&[(">n", "0"), ("pageSize", "10"), ("curPage", "4")]),
    )?;
    assert_eq!(page.total, 25);
    assert_eq!((page.from, page.to), (0, 0));
    assert!(page.hits.is_empty());

    // Bad paging values fall back to page 1 of size 10.
    let page = engine.search(
        "nums",
        &params(&[(">n", "0"), ("pageSize", "x"), ("curPage", "-2")]),
    )?;
    assert_eq!((page.from, page.to), (1, 10));
    Ok(())
}

#[test]
fn test_exclusion_and_unknown_fields() -> tessera::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let engine = open_engine(temp_dir.path())?;
    engine.create_index("notes", &[("title", FieldType::Text), ("year", FieldType::Number)])?;
    for (title, year) in [
        ("fast rust", "2020"),
        ("slow rust", "2021"),
        ("rust", "2022"),
        ("go", "2023"),
    ] {
        engine.add_document(
            "notes",
            &Document::new().add_field("title", title).add_field("year", year),
        )?;
    }

    let result = engine.search(
        "notes",
        &params(&[("index", "notes"), ("title", "rust"), ("_title", "slow"), ("colour", "red")]),
    )?;
    let mut ids = result.doc_ids();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 2]);

    let result = engine.search("notes", &params(&[("title", "rust"), (">year", "2021")]))?;
    let mut ids = result.doc_ids();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);

    assert!(engine.search("notes", &params(&[("~year", "2020")])).is_err());
    Ok(())
}

#[test]
fn test_search_spans_sealed_and_memory_segments() -> tessera::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let index = Index::create(
        temp_dir.path(),
        "mixed",
        IndexConfig::default(),
        Arc::new(WhitespaceTokenizer::new()),
    )?;
    index.add_field("tag", FieldType::Keyword)?;
    index.add_field("year", FieldType::Date)?;
    index.add_document(&Document::new().add_field("tag", "a b").add_field("year", "2020-01-01"))?;
    index.sync_memory_segment()?;
    index.add_document(&Document::new().add_field("tag", "a b").add_field("year", "2020-06-01"))?;

    let request = SearchRequest::new().query("tag", "a b");
    assert_eq!(index.search(&request)?.doc_ids(), vec![0, 1]);
    // Keyword values are a single term.
    assert!(index.search(&SearchRequest::new().query("tag", "a"))?.hits.is_empty());

    let request = SearchRequest::parse(
        [("<year", "2020-03-01")],
        &index.schema(),
        index.tokenizer(),
        10,
    )?;
    assert_eq!(index.search(&request)?.doc_ids(), vec![0]);
    assert_eq!(
        index.search_filter_doc_ids(&SearchFilter::over("year", 0))?,
        vec![0, 1]
    );
    Ok(())
}

#[derive(Debug, Default)]
struct RecordingSink {
    terms: Mutex<Vec<String>>,
}

impl SuggestionSink for RecordingSink {
    fn insert(&self, term: &str) {
        self.terms.lock().push(term.to_string());
    }
}

#[test]
fn test_text_terms_reach_suggestion_sink() -> tessera::Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let index = Index::create(
        temp_dir.path(),
        "suggest",
        IndexConfig::default(),
        Arc::new(WhitespaceTokenizer::new()),
    )?
    .with_suggestion_sink(sink.clone());
    index.add_field("title", FieldType::Text)?;
    index.add_field("tag", FieldType::Keyword)?;

    index.add_document(
        &Document::new()
            .add_field("title", "hello world")
            .add_field("tag", "greeting"),
    )?;
    assert_eq!(*sink.terms.lock(), vec!["hello".to_string(), "world".to_string()]);
    Ok(())
}
