//! Persistent book records.
//!
//! [`CatalogStore`] is the only way the rest of the crate reaches stored
//! books. Two engines implement it:
//! - [`BackendSqlite`]: single SQLite file, embeddings in a BLOB column
//! - [`BackendCsv`]: CSV file rewritten on every mutation, or memory-only

mod csv_file;
mod sqlite;

pub use csv_file::BackendCsv;
pub use sqlite::BackendSqlite;

use crate::books::{Book, Status};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("book {0} not found")]
    NotFound(i64),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Storage contract for the catalog.
///
/// Every mutation is durable when the call returns. Listing order for
/// [`list_all`](CatalogStore::list_all) and
/// [`list_by_status`](CatalogStore::list_by_status) is newest first.
pub trait CatalogStore: Send + Sync {
    /// Persist everything but the embedding and return the new id.
    fn create(&self, book: &Book) -> Result<i64, StorageError>;

    fn get(&self, id: i64) -> Result<Book, StorageError>;

    fn list_all(&self) -> Result<Vec<Book>, StorageError>;

    fn list_by_status(&self, status: Status) -> Result<Vec<Book>, StorageError>;

    /// Replace every mutable field of `book.id`. Leaves `created_at` and the
    /// embedding alone.
    fn update(&self, book: &Book) -> Result<(), StorageError>;

    /// Succeeds whether or not the book existed.
    fn delete(&self, id: i64) -> Result<(), StorageError>;

    /// Overwrite only the embedding of `id`.
    fn set_embedding(&self, id: i64, embedding: &[f32]) -> Result<(), StorageError>;

    /// Books whose embedding is present and non-empty, ascending by id.
    fn list_embedded(&self) -> Result<Vec<Book>, StorageError>;

    fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>, StorageError>;

    /// Case-insensitive on both fields.
    fn find_by_title_author(&self, title: &str, author: &str)
        -> Result<Option<Book>, StorageError>;
}

/// Newest first, ids break ties.
pub(crate) fn sort_newest_first(books: &mut [Book]) {
    books.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
