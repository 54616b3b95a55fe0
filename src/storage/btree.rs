//! Ordered key→value persistence over an embedded `redb` database.
//!
//! One [`BTreeStore`] file holds any number of named sub-trees. Integer-keyed
//! trees back the primary-key map and the numeric range buckets; string-keyed
//! trees back [`BTreeTermIndex`](crate::segment::term_index::BTreeTermIndex).
//! Every call runs in its own transaction; a failing write aborts it so the
//! tree is left as it was.

use std::ops::Bound;
use std::path::{Path, PathBuf};

use redb::{
    Database, ReadOnlyTable, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition,
    TableError, WriteTransaction,
};

use crate::error::{Result, TesseraError};

fn int_tree(name: &str) -> TableDefinition<'_, i64, u64> {
    TableDefinition::new(name)
}

fn str_tree(name: &str) -> TableDefinition<'_, &'static str, u64> {
    TableDefinition::new(name)
}

pub struct BTreeStore {
    path: PathBuf,
    db: Database,
}

impl std::fmt::Debug for BTreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BTreeStore")
            .field("path", &self.path)
            .finish()
    }
}

impl BTreeStore {
    /// Opens the database file at `path`, creating it if it does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path)?;
        Ok(Self { path, db })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&WriteTransaction) -> Result<()>,
    {
        let txn = self.db.begin_write()?;
        match f(&txn) {
            Ok(()) => {
                txn.commit()?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = txn.abort() {
                    log::error!("failed to roll back {}: {abort}", self.path.display());
                }
                Err(e)
            }
        }
    }

    /// Opens `def` for reading. A tree that was never created reads as empty.
    fn read_int(
        &self,
        txn: &ReadTransaction,
        name: &str,
    ) -> Result<Option<ReadOnlyTable<i64, u64>>> {
        match txn.open_table(int_tree(name)) {
            Ok(table) => Ok(Some(table)),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_str(
        &self,
        txn: &ReadTransaction,
        name: &str,
    ) -> Result<Option<ReadOnlyTable<&'static str, u64>>> {
        match txn.open_table(str_tree(name)) {
            Ok(table) => Ok(Some(table)),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates an integer-keyed sub-tree. Creating an existing tree is a no-op.
    pub fn create_tree(&self, name: &str) -> Result<()> {
        self.write(|txn| {
            txn.open_table(int_tree(name))?;
            Ok(())
        })
    }

    /// Creates a string-keyed sub-tree. Creating an existing tree is a no-op.
    pub fn create_str_tree(&self, name: &str) -> Result<()> {
        self.write(|txn| {
            txn.open_table(str_tree(name))?;
            Ok(())
        })
    }

    pub fn set_batch<I>(&self, tree: &str, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (i64, u64)>,
    {
        self.write(|txn| {
            let mut table = txn.open_table(int_tree(tree))?;
            for (key, value) in entries {
                table.insert(key, value)?;
            }
            Ok(())
        })
    }

    /// Removes every entry of an integer-keyed tree for which `predicate`
    /// holds. Returns the number of removed entries.
    pub fn remove_where<F>(&self, tree: &str, mut predicate: F) -> Result<usize>
    where
        F: FnMut(i64, u64) -> bool,
    {
        let mut doomed = Vec::new();
        {
            let txn = self.db.begin_read()?;
            let Some(table) = self.read_int(&txn, tree)? else {
                return Ok(0);
            };
            for entry in table.iter()? {
                let (k, v) = entry?;
                if predicate(k.value(), v.value()) {
                    doomed.push(k.value());
                }
            }
        }
        if doomed.is_empty() {
            return Ok(0);
        }
        self.write(|txn| {
            let mut table = txn.open_table(int_tree(tree))?;
            for key in &doomed {
                table.remove(*key)?;
            }
            Ok(())
        })?;
        Ok(doomed.len())
    }

    pub fn get(&self, tree: &str, key: i64) -> Result<Option<u64>> {
        let txn = self.db.begin_read()?;
        let Some(table) = self.read_int(&txn, tree)? else {
            return Ok(None);
        };
        Ok(table.get(key)?.map(|v| v.value()))
    }

    /// All entries with `min <= key <= max`, in key order.
    pub fn range(&self, tree: &str, min: i64, max: i64) -> Result<Vec<(i64, u64)>> {
        if min > max {
            return Err(TesseraError::invalid_argument(format!(
                "range lower bound {min} exceeds upper bound {max}"
            )));
        }
        let txn = self.db.begin_read()?;
        let Some(table) = self.read_int(&txn, tree)? else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::new();
        for entry in table.range(min..=max)? {
            let (k, v) = entry?;
            entries.push((k.value(), v.value()));
        }
        Ok(entries)
    }

    pub fn first(&self, tree: &str) -> Result<Option<(i64, u64)>> {
        let txn = self.db.begin_read()?;
        let Some(table) = self.read_int(&txn, tree)? else {
            return Ok(None);
        };
        match table.iter()?.next() {
            Some(entry) => {
                let (k, v) = entry?;
                Ok(Some((k.value(), v.value())))
            }
            None => Ok(None),
        }
    }

    /// The smallest entry whose key is strictly greater than `after`.
    pub fn next(&self, tree: &str, after: i64) -> Result<Option<(i64, u64)>> {
        let txn = self.db.begin_read()?;
        let Some(table) = self.read_int(&txn, tree)? else {
            return Ok(None);
        };
        let bounds: (Bound<i64>, Bound<i64>) = (Bound::Excluded(after), Bound::Unbounded);
        match table.range(bounds)?.next() {
            Some(entry) => {
                let (k, v) = entry?;
                Ok(Some((k.value(), v.value())))
            }
            None => Ok(None),
        }
    }

    pub fn set_str_batch<'a, I>(&self, tree: &str, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        self.write(|txn| {
            let mut table = txn.open_table(str_tree(tree))?;
            for (key, value) in entries {
                table.insert(key, value)?;
            }
            Ok(())
        })
    }

    pub fn get_str(&self, tree: &str, key: &str) -> Result<Option<u64>> {
        let txn = self.db.begin_read()?;
        let Some(table) = self.read_str(&txn, tree)? else {
            return Ok(None);
        };
        Ok(table.get(key)?.map(|v| v.value()))
    }

    pub fn first_str(&self, tree: &str) -> Result<Option<(String, u64)>> {
        let txn = self.db.begin_read()?;
        let Some(table) = self.read_str(&txn, tree)? else {
            return Ok(None);
        };
        match table.iter()?.next() {
            Some(entry) => {
                let (k, v) = entry?;
                Ok(Some((k.value().to_string(), v.value())))
            }
            None => Ok(None),
        }
    }

    pub fn next_str(&self, tree: &str, after: &str) -> Result<Option<(String, u64)>> {
        let txn = self.db.begin_read()?;
        let Some(table) = self.read_str(&txn, tree)? else {
            return Ok(None);
        };
        let bounds: (Bound<&str>, Bound<&str>) = (Bound::Excluded(after), Bound::Unbounded);
        match table.range::<&str>(bounds)?.next() {
            Some(entry) => {
                let (k, v) = entry?;
                Ok(Some((k.value().to_string(), v.value())))
            }
            None => Ok(None),
        }
    }

    /// Number of entries in a string-keyed tree.
    pub fn str_len(&self, tree: &str) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let Some(table) = self.read_str(&txn, tree)? else {
            return Ok(0);
        };
        let mut count = 0;
        for entry in table.iter()? {
            entry?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_int_tree_operations() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = BTreeStore::open(dir.path().join("t.bt"))?;
        store.create_tree("year")?;
        store.set_batch("year", [(1978, 16), (1977, 0), (2001, 40)])?;
        store.set_batch("year", [(1990, 32)])?;

        assert_eq!(store.get("year", 1977)?, Some(0));
        assert_eq!(store.get("year", 1976)?, None);
        assert_eq!(
            store.range("year", 1977, 1990)?,
            vec![(1977, 0), (1978, 16), (1990, 32)]
        );
        assert_eq!(store.first("year")?, Some((1977, 0)));
        assert_eq!(store.next("year", 1978)?, Some((1990, 32)));
        assert_eq!(store.next("year", 2001)?, None);
        Ok(())
    }

    #[test]
    fn test_remove_where_filters_by_value() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = BTreeStore::open(dir.path().join("t.bt"))?;
        store.set_batch("pk", [(1, 0), (2, 5), (3, 6), (4, 2)])?;

        assert_eq!(store.remove_where("pk", |_, doc_id| doc_id >= 5)?, 2);
        assert_eq!(store.range("pk", i64::MIN, i64::MAX)?, vec![(1, 0), (4, 2)]);
        assert_eq!(store.remove_where("pk", |_, _| false)?, 0);
        assert_eq!(store.remove_where("missing", |_, _| true)?, 0);
        Ok(())
    }

    #[test]
    fn test_range_rejects_inverted_bounds() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = BTreeStore::open(dir.path().join("t.bt"))?;
        assert!(matches!(
            store.range("year", 5, 1),
            Err(TesseraError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn test_missing_tree_reads_empty() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = BTreeStore::open(dir.path().join("t.bt"))?;
        assert_eq!(store.get("nope", 1)?, None);
        assert!(store.range("nope", 0, 10)?.is_empty());
        assert_eq!(store.first_str("nope")?, None);
        Ok(())
    }

    #[test]
    fn test_str_tree_iterates_in_order() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = BTreeStore::open(dir.path().join("t.bt"))?;
        store.create_str_tree("title.terms")?;
        store.set_str_batch("title.terms", [("pear", 2), ("apple", 0), ("fig", 1)])?;

        let mut terms = Vec::new();
        let mut cursor = store.first_str("title.terms")?;
        while let Some((term, offset)) = cursor {
            cursor = store.next_str("title.terms", &term)?;
            terms.push((term, offset));
        }
        assert_eq!(
            terms,
            vec![
                ("apple".to_string(), 0),
                ("fig".to_string(), 1),
                ("pear".to_string(), 2)
            ]
        );
        assert_eq!(store.get_str("title.terms", "fig")?, Some(1));
        assert_eq!(store.str_len("title.terms")?, 3);
        Ok(())
    }
}
