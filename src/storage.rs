//! On-disk building blocks shared by segments and indexes.

pub mod btree;
pub mod mmap;
pub mod tombstone;

pub use btree::BTreeStore;
pub use mmap::MappedFile;
pub use tombstone::{DeletedLog, Tombstones};
