//! Segment compaction.
//!
//! [`merge_segments`] builds one new sealed segment out of several sealed
//! inputs, field by field:
//!
//! - profiles are concatenated slot by slot, writing placeholders for
//!   tombstoned docIds and for docId gaps between inputs;
//! - range indexes are merged by repeatedly taking the smallest head value
//!   across all inputs;
//! - inverted fields go through [`merge_postings`], a k-way heap merge over
//!   the inputs' sorted term dictionaries.
//!
//! Tombstoned docIds are dropped from postings and range buckets. Inputs are
//! only read; a failed merge removes its half-built output and nothing else.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::data::{FieldType, Posting};
use crate::error::{Result, TesseraError};
use crate::segment::field::{Field, FieldMeta};
use crate::segment::invert::{InvertIndex, postings_file_name, write_postings};
use crate::segment::profile::ProfileWriter;
use crate::segment::profile_index::{BucketCursor, ProfileIndexWriter};
use crate::segment::term_index::{TermCursor, TermIndexKind, TermIndexWriter, create_term_writer};
use crate::segment::{SEGMENT_BTREE_FILE, Segment, SegmentMeta};
use crate::storage::{BTreeStore, Tombstones};

/// Counters reported by [`merge_postings`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PostingsMergeStats {
    pub terms: u64,
    pub postings: u64,
    pub bytes: u64,
}

struct HeapNode {
    term: Vec<u8>,
    offset: u64,
    input: usize,
}

impl PartialEq for HeapNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapNode {}

impl PartialOrd for HeapNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapNode {
    // Reversed so the max-heap pops the smallest term, then the lowest input.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .term
            .cmp(&self.term)
            .then_with(|| other.input.cmp(&self.input))
    }
}

/// Merges the sorted term dictionaries of `inputs` into `postings` + `terms`.
///
/// `None` inputs (placeholders) contribute nothing. Equal terms from several
/// inputs are combined into one list, concatenated in input order, with
/// postings for which `is_deleted` holds removed. Terms left with no postings
/// are not written.
pub fn merge_postings<W, F>(
    inputs: &[Option<&InvertIndex>],
    is_deleted: F,
    postings: &mut W,
    terms: &mut dyn TermIndexWriter,
) -> Result<PostingsMergeStats>
where
    W: Write,
    F: Fn(u64) -> bool,
{
    let mut cursors: Vec<Option<Box<dyn TermCursor + '_>>> = Vec::with_capacity(inputs.len());
    let mut heap = BinaryHeap::new();
    for (input, invert) in inputs.iter().copied().enumerate() {
        let Some(invert) = invert else {
            cursors.push(None);
            continue;
        };
        let mut cursor = invert.cursor()?;
        if let Some((term, offset)) = cursor.next_term()? {
            heap.push(HeapNode { term, offset, input });
        }
        cursors.push(Some(cursor));
    }

    let mut stats = PostingsMergeStats::default();
    while let Some(first) = heap.pop() {
        let mut group = vec![first];
        while heap.peek().is_some_and(|node| node.term == group[0].term) {
            if let Some(node) = heap.pop() {
                group.push(node);
            }
        }

        let mut combined: Vec<Posting> = Vec::new();
        for node in &group {
            let Some(invert) = inputs[node.input] else {
                continue;
            };
            combined.extend(
                invert
                    .postings_at(node.offset)?
                    .into_iter()
                    .filter(|p| !is_deleted(p.doc_id)),
            );
            if let Some(cursor) = cursors[node.input].as_mut() {
                if let Some((term, offset)) = cursor.next_term()? {
                    heap.push(HeapNode {
                        term,
                        offset,
                        input: node.input,
                    });
                }
            }
        }

        if combined.is_empty() {
            continue;
        }
        terms.insert(&group[0].term, stats.bytes)?;
        stats.bytes += write_postings(postings, &combined)?;
        stats.terms += 1;
        stats.postings += combined.len() as u64;
    }
    Ok(stats)
}

/// One docId span of the output, backed by an input field or a placeholder.
enum Source<'a> {
    Input(&'a Field),
    Placeholder(Field),
}

impl Source<'_> {
    fn field(&self) -> &Field {
        match self {
            Source::Input(field) => field,
            Source::Placeholder(field) => field,
        }
    }
}

fn collect_sources<'a>(
    name: &str,
    field_type: FieldType,
    inputs: &'a [Arc<Segment>],
) -> Vec<Source<'a>> {
    let mut sources = Vec::new();
    let mut cursor = inputs[0].start_doc_id();
    for segment in inputs {
        if segment.start_doc_id() > cursor {
            sources.push(Source::Placeholder(Field::placeholder(
                name,
                field_type,
                cursor,
                segment.start_doc_id(),
            )));
        }
        match segment.field(name) {
            Some(field) if field.field_type() == field_type => sources.push(Source::Input(field)),
            _ => sources.push(Source::Placeholder(Field::placeholder(
                name,
                field_type,
                segment.start_doc_id(),
                segment.max_doc_id(),
            ))),
        }
        cursor = segment.max_doc_id();
    }
    sources
}

fn merge_profiles(
    name: &str,
    field_type: FieldType,
    sources: &[Source<'_>],
    tombstones: &Tombstones,
    dir: &Path,
) -> Result<()> {
    let mut writer = ProfileWriter::create(name, field_type, dir)?;
    for source in sources {
        let field = source.field();
        for doc_id in field.start_doc_id()..field.max_doc_id() {
            match field.profile() {
                Some(profile) if !tombstones.is_deleted(doc_id) => {
                    if field_type.is_numeric() {
                        writer.push_slot(profile.slot(doc_id)?)?;
                    } else {
                        writer.push_text(&profile.text(doc_id)?)?;
                    }
                }
                _ => writer.push_placeholder()?,
            }
        }
    }
    writer.finish()
}

fn merge_profile_indexes(
    name: &str,
    sources: &[Source<'_>],
    tombstones: &Tombstones,
    dir: &Path,
    btree: &Arc<BTreeStore>,
) -> Result<()> {
    let mut writer = ProfileIndexWriter::create(name, dir, btree)?;
    let mut heads: Vec<(BucketCursor<'_>, Option<(i64, Vec<u64>)>)> = Vec::new();
    for source in sources {
        if let Some(index) = source.field().profile_index() {
            let mut cursor = index.buckets()?;
            let head = cursor.next_bucket()?;
            heads.push((cursor, head));
        }
    }

    loop {
        let Some(min) = heads
            .iter()
            .filter_map(|(_, head)| head.as_ref().map(|(value, _)| *value))
            .min()
        else {
            break;
        };
        let mut ids = Vec::new();
        for (cursor, head) in heads.iter_mut() {
            if head.as_ref().is_some_and(|(value, _)| *value == min) {
                if let Some((_, bucket)) = head.take() {
                    ids.extend(bucket.into_iter().filter(|id| !tombstones.is_deleted(*id)));
                }
                *head = cursor.next_bucket()?;
            }
        }
        writer.push(min, &ids)?;
    }
    writer.finish()
}

fn merge_inverted(
    name: &str,
    sources: &[Source<'_>],
    tombstones: &Tombstones,
    dir: &Path,
    kind: TermIndexKind,
    btree: &Arc<BTreeStore>,
) -> Result<PostingsMergeStats> {
    let inputs: Vec<Option<&InvertIndex>> = sources.iter().map(|s| s.field().invert()).collect();
    let mut postings = BufWriter::new(File::create(dir.join(postings_file_name(name)))?);
    let mut terms = create_term_writer(kind, dir, name, btree)?;
    let stats = merge_postings(
        &inputs,
        |doc_id| tombstones.is_deleted(doc_id),
        &mut postings,
        terms.as_mut(),
    )?;
    postings.flush()?;
    terms.finish()?;
    Ok(stats)
}

fn write_merged(
    dir: &Path,
    schema: &BTreeMap<String, FieldType>,
    inputs: &[Arc<Segment>],
    tombstones: &Tombstones,
    kind: TermIndexKind,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    let btree = Arc::new(BTreeStore::open(dir.join(SEGMENT_BTREE_FILE))?);
    let mut fields = BTreeMap::new();
    for (name, field_type) in schema.iter().filter(|(_, t)| t.is_stored()) {
        let sources = collect_sources(name, *field_type, inputs);
        merge_profiles(name, *field_type, &sources, tombstones, dir)?;
        if field_type.is_numeric() {
            merge_profile_indexes(name, &sources, tombstones, dir, &btree)?;
        }
        if field_type.is_inverted() {
            let stats = merge_inverted(name, &sources, tombstones, dir, kind, &btree)?;
            log::debug!(
                "merged field `{name}`: {} terms, {} postings",
                stats.terms,
                stats.postings
            );
        }
        fields.insert(
            name.clone(),
            FieldMeta {
                field_type: *field_type,
                term_index: field_type.is_inverted().then_some(kind),
            },
        );
    }

    let segment_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    SegmentMeta {
        start_doc_id: inputs[0].start_doc_id(),
        max_doc_id: inputs[inputs.len() - 1].max_doc_id(),
        segment_name,
        fields,
    }
    .store(dir)
}

/// Merges sealed `inputs` (ordered by docId) into a new sealed segment at
/// `dir` laid out for `schema`. Fields missing from an input, or present with
/// another type, are treated as empty for that input's docId range.
pub fn merge_segments(
    dir: PathBuf,
    schema: &BTreeMap<String, FieldType>,
    inputs: &[Arc<Segment>],
    tombstones: &Tombstones,
    kind: TermIndexKind,
) -> Result<Segment> {
    if inputs.is_empty() {
        return Err(TesseraError::invalid_argument("nothing to merge"));
    }
    if let Some(segment) = inputs.iter().find(|s| s.is_memory()) {
        return Err(TesseraError::invalid_operation(format!(
            "cannot merge mutable segment {}",
            segment.name()
        )));
    }
    if inputs
        .windows(2)
        .any(|w| w[1].start_doc_id() < w[0].max_doc_id())
    {
        return Err(TesseraError::invalid_argument(
            "merge inputs must be ordered with disjoint docId ranges",
        ));
    }

    log::info!(
        "merging {} segments into {}",
        inputs.len(),
        dir.display()
    );
    if let Err(e) = write_merged(&dir, schema, inputs, tombstones, kind) {
        log::error!("merge into {} failed: {e}", dir.display());
        if dir.exists() {
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                log::warn!("failed to remove {}: {cleanup}", dir.display());
            }
        }
        return Err(e);
    }
    Segment::open(&dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{NoopSuggestionSink, WhitespaceTokenizer};
    use crate::data::Document;
    use crate::segment::term_index::{FstTermIndex, FstTermWriter, TermIndex};
    use tempfile::TempDir;

    fn sealed_segment(
        root: &Path,
        name: &str,
        start: u64,
        titles: &[&str],
        kind: TermIndexKind,
    ) -> Result<Arc<Segment>> {
        let schema = BTreeMap::from([("title".to_string(), FieldType::Text)]);
        let mut segment = Segment::new(root.join(name), start, &schema);
        for (i, title) in titles.iter().enumerate() {
            segment.add_document(
                start + i as u64,
                &Document::new().add_field("title", *title),
                &WhitespaceTokenizer::new(),
                &NoopSuggestionSink,
            )?;
        }
        Ok(Arc::new(segment.serialize(kind)?))
    }

    #[test]
    fn test_merge_postings_combines_equal_terms_in_input_order() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let a = sealed_segment(dir.path(), "a", 0, &["b a", "c"], TermIndexKind::Fst)?;
        let b = sealed_segment(dir.path(), "b", 2, &["a d"], TermIndexKind::BTree)?;

        let inputs = vec![
            a.field("title").and_then(|f| f.invert()),
            None,
            b.field("title").and_then(|f| f.invert()),
        ];
        let mut postings = Vec::new();
        let mut terms = FstTermWriter::create(dir.path().join("out.fst"))?;
        let stats = merge_postings(&inputs, |_| false, &mut postings, &mut terms)?;
        Box::new(terms).finish()?;

        assert_eq!(stats.terms, 4);
        assert_eq!(stats.postings, 5);
        assert_eq!(stats.bytes as usize, postings.len());

        let index = FstTermIndex::open(dir.path().join("out.fst"))?;
        let mut cursor = index.cursor()?;
        let mut seen = Vec::new();
        while let Some((term, _)) = cursor.next_term()? {
            seen.push(String::from_utf8(term).unwrap());
        }
        assert_eq!(seen, vec!["a", "b", "c", "d"]);
        Ok(())
    }

    #[test]
    fn test_merge_postings_drops_deleted_and_empty_terms() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let a = sealed_segment(dir.path(), "a", 0, &["solo", "both"], TermIndexKind::Fst)?;
        let b = sealed_segment(dir.path(), "b", 2, &["both"], TermIndexKind::Fst)?;
        let inputs = vec![
            a.field("title").and_then(|f| f.invert()),
            b.field("title").and_then(|f| f.invert()),
        ];

        let mut postings = Vec::new();
        let mut terms = FstTermWriter::create(dir.path().join("out.fst"))?;
        let stats = merge_postings(&inputs, |id| id == 0, &mut postings, &mut terms)?;
        Box::new(terms).finish()?;

        assert_eq!(stats.terms, 1);
        let index = FstTermIndex::open(dir.path().join("out.fst"))?;
        assert_eq!(index.get("solo")?, None);
        assert_eq!(index.get("both")?, Some(0));
        Ok(())
    }

    #[test]
    fn test_merge_rejects_overlapping_inputs() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let a = sealed_segment(dir.path(), "a", 0, &["x", "y"], TermIndexKind::Fst)?;
        let b = sealed_segment(dir.path(), "b", 1, &["z"], TermIndexKind::Fst)?;
        let schema = a.schema();
        let result = merge_segments(
            dir.path().join("out"),
            &schema,
            &[a, b],
            &Tombstones::new(),
            TermIndexKind::Fst,
        );
        assert!(result.is_err());
        assert!(!dir.path().join("out").exists());
        Ok(())
    }
}
