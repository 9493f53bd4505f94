use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use super::{CatalogStore, StorageError};
use crate::{
    books::{Book, Status},
    semantic::codec,
};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS books (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    title         TEXT NOT NULL,
    author        TEXT NOT NULL,
    isbn          TEXT,
    description   TEXT NOT NULL DEFAULT '',
    genre         TEXT NOT NULL DEFAULT '',
    tags          TEXT NOT NULL DEFAULT '[]',
    cover_url     TEXT,
    page_count    INTEGER NOT NULL DEFAULT 0,
    current_page  INTEGER NOT NULL DEFAULT 0,
    rating        INTEGER NOT NULL DEFAULT 0,
    status        TEXT NOT NULL DEFAULT 'want_to_read',
    notes         TEXT NOT NULL DEFAULT '',
    created_at    TEXT NOT NULL,
    completed_at  TEXT,
    embedding     BLOB
);
CREATE INDEX IF NOT EXISTS idx_books_status ON books(status);
CREATE INDEX IF NOT EXISTS idx_books_author ON books(author);
CREATE INDEX IF NOT EXISTS idx_books_isbn ON books(isbn);
";

const COLUMNS: &str = "id, title, author, isbn, description, genre, tags, cover_url, \
     page_count, current_page, rating, status, notes, created_at, completed_at, embedding";

/// SQLite catalog. One connection guarded by a mutex; every statement
/// commits on return.
pub struct BackendSqlite {
    conn: Mutex<Connection>,
}

fn timestamp(t: &DateTime<Utc>) -> String {
    // Fixed width so text ordering matches time ordering.
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn from_row(row: &Row) -> rusqlite::Result<Book> {
    let tags: String = row.get(6)?;
    let status: String = row.get(11)?;
    let created_at: String = row.get(13)?;
    let completed_at: Option<String> = row.get(14)?;
    let embedding: Option<Vec<u8>> = row.get(15)?;

    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        isbn: row.get::<_, Option<String>>(3)?.filter(|s| !s.is_empty()),
        description: row.get(4)?,
        genre: row.get(5)?,
        tags: serde_json::from_str(&tags).unwrap_or_else(|_| crate::parse_tags(&tags)),
        cover_url: row.get::<_, Option<String>>(7)?.filter(|s| !s.is_empty()),
        page_count: row.get(8)?,
        current_page: row.get(9)?,
        rating: row.get(10)?,
        status: status.parse().unwrap_or_else(|_| {
            log::warn!("unknown status {status:?} in catalog, treating as want_to_read");
            Status::WantToRead
        }),
        notes: row.get(12)?,
        created_at: parse_time(13, &created_at)?,
        completed_at: completed_at
            .as_deref()
            .map(|t| parse_time(14, t))
            .transpose()?,
        embedding: embedding
            .map(|bytes| codec::decode(&bytes))
            .filter(|v| !v.is_empty()),
    })
}

impl BackendSqlite {
    /// Open or create the catalog database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        log::debug!("opening sqlite catalog at {}", path.display());
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Flush and close the underlying connection.
    pub fn close(self) -> Result<(), StorageError> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| StorageError::Corrupt("catalog lock poisoned".to_string()))?;
        conn.close().map_err(|(_, err)| StorageError::Sqlite(err))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Corrupt("catalog lock poisoned".to_string()))
    }

    fn query(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Book>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let books = stmt
            .query_map(args, from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(books)
    }

    fn query_one(&self, sql: &str, args: impl rusqlite::Params) -> Result<Option<Book>, StorageError> {
        let conn = self.conn()?;
        Ok(conn.query_row(sql, args, from_row).optional()?)
    }
}

impl CatalogStore for BackendSqlite {
    fn create(&self, book: &Book) -> Result<i64, StorageError> {
        let tags = serde_json::to_string(&book.tags)
            .map_err(|e| StorageError::Corrupt(format!("unserializable tags: {e}")))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO books (title, author, isbn, description, genre, tags, cover_url,
                page_count, current_page, rating, status, notes, created_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                book.title,
                book.author,
                book.isbn,
                book.description,
                book.genre,
                tags,
                book.cover_url,
                book.page_count,
                book.current_page,
                book.rating,
                book.status.as_str(),
                book.notes,
                timestamp(&book.created_at),
                book.completed_at.as_ref().map(timestamp),
            ],
        )?;

        let id = conn.last_insert_rowid();
        log::debug!("created book {id}");
        Ok(id)
    }

    fn get(&self, id: i64) -> Result<Book, StorageError> {
        self.query_one(
            &format!("SELECT {COLUMNS} FROM books WHERE id = ?1"),
            params![id],
        )?
        .ok_or(StorageError::NotFound(id))
    }

    fn list_all(&self) -> Result<Vec<Book>, StorageError> {
        self.query(
            &format!("SELECT {COLUMNS} FROM books ORDER BY created_at DESC, id DESC"),
            [],
        )
    }

    fn list_by_status(&self, status: Status) -> Result<Vec<Book>, StorageError> {
        self.query(
            &format!(
                "SELECT {COLUMNS} FROM books WHERE status = ?1 ORDER BY created_at DESC, id DESC"
            ),
            params![status.as_str()],
        )
    }

    fn update(&self, book: &Book) -> Result<(), StorageError> {
        let tags = serde_json::to_string(&book.tags)
            .map_err(|e| StorageError::Corrupt(format!("unserializable tags: {e}")))?;

        let changed = self.conn()?.execute(
            "UPDATE books SET title = ?2, author = ?3, isbn = ?4, description = ?5,
                genre = ?6, tags = ?7, cover_url = ?8, page_count = ?9, current_page = ?10,
                rating = ?11, status = ?12, notes = ?13, completed_at = ?14
             WHERE id = ?1",
            params![
                book.id,
                book.title,
                book.author,
                book.isbn,
                book.description,
                book.genre,
                tags,
                book.cover_url,
                book.page_count,
                book.current_page,
                book.rating,
                book.status.as_str(),
                book.notes,
                book.completed_at.as_ref().map(timestamp),
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::NotFound(book.id));
        }
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<(), StorageError> {
        self.conn()?
            .execute("DELETE FROM books WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn set_embedding(&self, id: i64, embedding: &[f32]) -> Result<(), StorageError> {
        let changed = self.conn()?.execute(
            "UPDATE books SET embedding = ?2 WHERE id = ?1",
            params![id, codec::encode(embedding)],
        )?;

        if changed == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    fn list_embedded(&self) -> Result<Vec<Book>, StorageError> {
        let books = self.query(
            &format!(
                "SELECT {COLUMNS} FROM books
                 WHERE embedding IS NOT NULL AND length(embedding) > 0
                 ORDER BY id ASC"
            ),
            [],
        )?;
        // Blobs that decode to nothing do not count as embedded.
        Ok(books.into_iter().filter(Book::has_embedding).collect())
    }

    fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>, StorageError> {
        let isbn = isbn.trim();
        if isbn.is_empty() {
            return Ok(None);
        }
        self.query_one(
            &format!(
                "SELECT {COLUMNS} FROM books WHERE TRIM(isbn) = ?1
                 ORDER BY created_at DESC, id DESC LIMIT 1"
            ),
            params![isbn],
        )
    }

    fn find_by_title_author(
        &self,
        title: &str,
        author: &str,
    ) -> Result<Option<Book>, StorageError> {
        let title = title.trim().to_lowercase();
        let author = author.trim().to_lowercase();
        if title.is_empty() || author.is_empty() {
            return Ok(None);
        }

        // LOWER() in SQLite only folds ASCII, so names are compared here.
        let found = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT id, title, author FROM books ORDER BY created_at DESC, id DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut found = None;
            while let Some(row) = rows.next()? {
                let stored_title: String = row.get(1)?;
                let stored_author: String = row.get(2)?;
                if stored_title.trim().to_lowercase() == title
                    && stored_author.trim().to_lowercase() == author
                {
                    found = Some(row.get::<_, i64>(0)?);
                    break;
                }
            }
            found
        };

        found.map(|id| self.get(id)).transpose()
    }
}
