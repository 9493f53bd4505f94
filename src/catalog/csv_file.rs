use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
    time::Instant,
};

use super::{sort_newest_first, CatalogStore, StorageError};
use crate::{
    books::{Book, Status},
    parse_tags,
    semantic::codec,
};

/// Flat-file catalog. The whole file lives in memory and is rewritten
/// after each mutation. Without a path nothing touches the disk.
///
/// The highest id ever handed out is kept in `{path}-seq` so ids of deleted
/// books are never reused.
#[derive(Debug, Clone, Default)]
pub struct BackendCsv {
    list: Arc<RwLock<Vec<Book>>>,
    last_id: Arc<AtomicI64>,
    path: Option<PathBuf>,
}

const CSV_HEADERS: [&str; 16] = [
    "id",
    "title",
    "author",
    "isbn",
    "description",
    "genre",
    "tags",
    "cover_url",
    "page_count",
    "current_page",
    "rating",
    "status",
    "notes",
    "created_at",
    "completed_at",
    "embedding",
];

fn field<'a>(record: &'a csv::StringRecord, idx: usize) -> Result<&'a str, StorageError> {
    record
        .get(idx)
        .ok_or_else(|| StorageError::Corrupt(format!("missing column {}", CSV_HEADERS[idx])))
}

fn parse_num<T: std::str::FromStr>(value: &str, column: &str) -> Result<T, StorageError> {
    if value.is_empty() {
        return "0"
            .parse()
            .map_err(|_| StorageError::Corrupt(format!("bad {column}")));
    }
    value
        .parse()
        .map_err(|_| StorageError::Corrupt(format!("bad {column}: {value:?}")))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp {value:?}: {e}")))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn from_record(record: &csv::StringRecord) -> Result<Book, StorageError> {
    let status = field(record, 11)?;
    let completed_at = field(record, 14)?;
    let embedding = field(record, 15)?;

    let embedding = if embedding.is_empty() {
        None
    } else {
        let bytes = STANDARD
            .decode(embedding)
            .map_err(|e| StorageError::Corrupt(format!("bad embedding: {e}")))?;
        Some(codec::decode(&bytes)).filter(|v| !v.is_empty())
    };

    Ok(Book {
        id: parse_num(field(record, 0)?, "id")?,
        title: field(record, 1)?.to_string(),
        author: field(record, 2)?.to_string(),
        isbn: non_empty(field(record, 3)?),
        description: field(record, 4)?.to_string(),
        genre: field(record, 5)?.to_string(),
        tags: parse_tag_column(field(record, 6)?),
        cover_url: non_empty(field(record, 7)?),
        page_count: parse_num(field(record, 8)?, "page_count")?,
        current_page: parse_num(field(record, 9)?, "current_page")?,
        rating: parse_num(field(record, 10)?, "rating")?,
        status: status
            .parse::<Status>()
            .map_err(|_| StorageError::Corrupt(format!("bad status: {status:?}")))?,
        notes: field(record, 12)?.to_string(),
        created_at: parse_time(field(record, 13)?)?,
        completed_at: if completed_at.is_empty() {
            None
        } else {
            Some(parse_time(completed_at)?)
        },
        embedding,
    })
}

/// JSON array; older files used a comma separated list.
fn parse_tag_column(value: &str) -> Vec<String> {
    serde_json::from_str(value).unwrap_or_else(|_| parse_tags(value))
}

fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn to_record(book: &Book) -> Result<[String; 16], StorageError> {
    let tags = serde_json::to_string(&book.tags)
        .map_err(|e| StorageError::Corrupt(format!("bad tags: {e}")))?;

    Ok([
        book.id.to_string(),
        book.title.clone(),
        book.author.clone(),
        book.isbn.clone().unwrap_or_default(),
        book.description.clone(),
        book.genre.clone(),
        tags,
        book.cover_url.clone().unwrap_or_default(),
        book.page_count.to_string(),
        book.current_page.to_string(),
        book.rating.to_string(),
        book.status.to_string(),
        book.notes.clone(),
        timestamp(&book.created_at),
        book.completed_at.as_ref().map(timestamp).unwrap_or_default(),
        book.embedding
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(|v| STANDARD.encode(codec::encode(v)))
            .unwrap_or_default(),
    ])
}

fn seq_path(path: &Path) -> PathBuf {
    let mut seq = path.to_path_buf().into_os_string();
    seq.push("-seq");
    PathBuf::from(seq)
}

fn read_seq(path: &Path) -> Result<i64, StorageError> {
    match std::fs::read_to_string(seq_path(path)) {
        Ok(content) => content.trim().parse::<i64>().or_else(|_| {
            log::warn!("ignoring malformed id counter {:?}", content.trim());
            Ok(0)
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(0),
        Err(err) => Err(err.into()),
    }
}

impl BackendCsv {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("creating new catalog at {}", path.display());
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;

        let mut books = vec![];
        for record in csv_reader.records() {
            books.push(from_record(&record?)?);
        }

        log::debug!(
            "took {}ms to read {} books from csv",
            now.elapsed().as_micros() as f64 / 1000.0,
            books.len()
        );

        let max_id = books.iter().map(|b| b.id).max().unwrap_or(0);
        let last_id = read_seq(path)?.max(max_id);

        Ok(BackendCsv {
            list: Arc::new(RwLock::new(books)),
            last_id: Arc::new(AtomicI64::new(last_id)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Catalog that is never written anywhere.
    pub fn in_memory() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Book>>, StorageError> {
        self.list
            .read()
            .map_err(|_| StorageError::Corrupt("catalog lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Book>>, StorageError> {
        self.list
            .write()
            .map_err(|_| StorageError::Corrupt("catalog lock poisoned".to_string()))
    }

    /// Writes to `{path}-tmp` and renames over the real file.
    fn save(&self, books: &[Book]) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut temp_path = path.clone().into_os_string();
        temp_path.push("-tmp");

        let mut csv_wrt = csv::Writer::from_path(&temp_path)?;
        csv_wrt.write_record(CSV_HEADERS)?;
        for book in books {
            csv_wrt.write_record(to_record(book)?)?;
        }
        csv_wrt.flush()?;
        drop(csv_wrt);

        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn save_seq(&self, id: i64) -> Result<(), StorageError> {
        if let Some(path) = &self.path {
            std::fs::write(seq_path(path), id.to_string())?;
        }
        Ok(())
    }

    fn find(&self, pred: impl Fn(&Book) -> bool) -> Result<Option<Book>, StorageError> {
        let books = self.read()?;
        let mut matches: Vec<Book> = books.iter().filter(|b| pred(b)).cloned().collect();
        sort_newest_first(&mut matches);
        Ok(matches.into_iter().next())
    }
}

impl CatalogStore for BackendCsv {
    fn create(&self, book: &Book) -> Result<i64, StorageError> {
        let mut books = self.write()?;
        // creates are serialized by the write lock
        let id = self.last_id.load(Ordering::SeqCst) + 1;
        self.save_seq(id)?;
        self.last_id.store(id, Ordering::SeqCst);

        books.push(Book {
            id,
            embedding: None,
            ..book.clone()
        });

        if let Err(err) = self.save(&books) {
            books.pop();
            return Err(err);
        }

        log::debug!("created book {id}");
        Ok(id)
    }

    fn get(&self, id: i64) -> Result<Book, StorageError> {
        self.read()?
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    fn list_all(&self) -> Result<Vec<Book>, StorageError> {
        let mut books = self.read()?.clone();
        sort_newest_first(&mut books);
        Ok(books)
    }

    fn list_by_status(&self, status: Status) -> Result<Vec<Book>, StorageError> {
        let mut books: Vec<Book> = self
            .read()?
            .iter()
            .filter(|b| b.status == status)
            .cloned()
            .collect();
        sort_newest_first(&mut books);
        Ok(books)
    }

    fn update(&self, book: &Book) -> Result<(), StorageError> {
        let mut books = self.write()?;
        let idx = books
            .iter()
            .position(|b| b.id == book.id)
            .ok_or(StorageError::NotFound(book.id))?;

        let previous = books[idx].clone();
        books[idx] = Book {
            created_at: previous.created_at,
            embedding: previous.embedding.clone(),
            ..book.clone()
        };

        if let Err(err) = self.save(&books) {
            books[idx] = previous;
            return Err(err);
        }
        Ok(())
    }

    fn delete(&self, id: i64) -> Result<(), StorageError> {
        let mut books = self.write()?;
        let Some(idx) = books.iter().position(|b| b.id == id) else {
            return Ok(());
        };

        let removed = books.remove(idx);
        if let Err(err) = self.save(&books) {
            books.insert(idx, removed);
            return Err(err);
        }
        Ok(())
    }

    fn set_embedding(&self, id: i64, embedding: &[f32]) -> Result<(), StorageError> {
        let mut books = self.write()?;
        let book = books
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(StorageError::NotFound(id))?;

        let previous = std::mem::replace(&mut book.embedding, Some(embedding.to_vec()));

        if let Err(err) = self.save(&books) {
            if let Some(book) = books.iter_mut().find(|b| b.id == id) {
                book.embedding = previous;
            }
            return Err(err);
        }
        Ok(())
    }

    fn list_embedded(&self) -> Result<Vec<Book>, StorageError> {
        let mut books: Vec<Book> = self
            .read()?
            .iter()
            .filter(|b| b.has_embedding())
            .cloned()
            .collect();
        books.sort_by_key(|b| b.id);
        Ok(books)
    }

    fn find_by_isbn(&self, isbn: &str) -> Result<Option<Book>, StorageError> {
        let isbn = isbn.trim();
        if isbn.is_empty() {
            return Ok(None);
        }
        self.find(|b| b.isbn() == Some(isbn))
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
        self.find(|b| {
            b.title.trim().to_lowercase() == title && b.author.trim().to_lowercase() == author
        })
    }
}
