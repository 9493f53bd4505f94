use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::{
    books::{Book, SearchResult, Status},
    cancel::Cancellation,
    catalog::CatalogStore,
    duplicates::{DuplicateDetector, DuplicateMatch},
    errors::CatalogError,
    semantic::{embedding_text, EmbeddingProvider, RetrievalEngine},
};

/// Outcome of a bulk re-embedding pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReembedReport {
    /// Books the pass looked at.
    pub total: usize,
    pub embedded: usize,
    pub failed: usize,
    /// Books left alone because they already had an embedding.
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogStats {
    pub total: usize,
    pub want_to_read: usize,
    pub reading: usize,
    pub read: usize,
    pub embedded: usize,
    pub rated: usize,
    /// Mean over rated books only.
    pub average_rating: Option<f32>,
}

/// Write and query flows over one catalog.
///
/// Every add or text-affecting update persists the record first and then
/// stores a fresh embedding for it. A failing provider leaves the record
/// in place without an embedding.
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    provider: Arc<dyn EmbeddingProvider>,
    detector: DuplicateDetector,
    engine: RetrievalEngine,
    cancel: Cancellation,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            detector: DuplicateDetector::new(store.clone()),
            engine: RetrievalEngine::new(store.clone(), provider.clone()),
            store,
            provider,
            cancel: Cancellation::default(),
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.engine = self.engine.with_cancellation(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    /// Add a book unless the catalog already holds it.
    pub fn add(&self, book: Book) -> Result<Book, CatalogError> {
        self.insert(book, true)
    }

    /// Add a book without the duplicate guard.
    pub fn add_unchecked(&self, book: Book) -> Result<Book, CatalogError> {
        self.insert(book, false)
    }

    fn insert(&self, mut book: Book, check_duplicates: bool) -> Result<Book, CatalogError> {
        book.normalize();
        book.validate()?;

        if check_duplicates {
            if let Some(found) = self.detector.check(&book)? {
                log::info!(
                    "rejecting \"{}\": duplicate of book {} by {}",
                    book.title,
                    found.existing.id,
                    found.reason
                );
                return Err(CatalogError::Duplicate {
                    existing: Box::new(found.existing),
                    reason: found.reason,
                });
            }
        }

        let now = Utc::now();
        book.created_at = now;
        book.completed_at = None;
        book.set_status(book.status, now);
        book.embedding = None;

        self.cancel.check()?;
        book.id = self.store.create(&book)?;
        log::info!("added book {} \"{}\" by {}", book.id, book.title, book.author);

        self.embed(&mut book)?;
        Ok(book)
    }

    /// Replace every editable field of an existing book and re-embed it.
    ///
    /// `created_at` always comes from the stored record, as does an
    /// existing completion timestamp.
    pub fn update(&self, mut book: Book) -> Result<Book, CatalogError> {
        book.normalize();
        book.validate()?;

        let existing = self.store.get(book.id)?;
        book.created_at = existing.created_at;
        book.completed_at = existing.completed_at.or(book.completed_at);
        book.set_status(book.status, Utc::now());

        self.cancel.check()?;
        self.store.update(&book)?;
        log::info!("updated book {}", book.id);

        self.embed(&mut book)?;
        Ok(book)
    }

    pub fn set_status(&self, id: i64, status: Status) -> Result<Book, CatalogError> {
        let mut book = self.store.get(id)?;
        book.set_status(status, Utc::now());
        self.update(book)
    }

    pub fn get(&self, id: i64) -> Result<Book, CatalogError> {
        Ok(self.store.get(id)?)
    }

    pub fn list(&self) -> Result<Vec<Book>, CatalogError> {
        Ok(self.store.list_all()?)
    }

    pub fn list_by_status(&self, status: Status) -> Result<Vec<Book>, CatalogError> {
        Ok(self.store.list_by_status(status)?)
    }

    pub fn delete(&self, id: i64) -> Result<(), CatalogError> {
        self.cancel.check()?;
        self.store.delete(id)?;
        log::info!("deleted book {id}");
        Ok(())
    }

    pub fn check_duplicate(&self, book: &Book) -> Result<Option<DuplicateMatch>, CatalogError> {
        Ok(self.detector.check(book)?)
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, CatalogError> {
        self.engine.search(query, limit)
    }

    pub fn find_similar(&self, id: i64, limit: usize) -> Result<Vec<SearchResult>, CatalogError> {
        self.engine.find_similar(id, limit)
    }

    /// Regenerate embeddings for every book, or only for books without one.
    ///
    /// Provider failures are counted and skipped. Storage failures and
    /// cancellation end the pass.
    pub fn reembed<F>(&self, only_missing: bool, mut progress: F) -> Result<ReembedReport, CatalogError>
    where
        F: FnMut(&Book, &Result<(), CatalogError>),
    {
        let books = self.store.list_all()?;
        let mut report = ReembedReport {
            total: books.len(),
            ..Default::default()
        };

        for mut book in books {
            if only_missing && book.has_embedding() {
                report.skipped += 1;
                continue;
            }

            let outcome = self.embed(&mut book);
            progress(&book, &outcome);

            match outcome {
                Ok(()) => report.embedded += 1,
                Err(CatalogError::Provider(_)) => report.failed += 1,
                Err(err) => return Err(err),
            }
        }

        log::info!(
            "reembed done: embedded={} failed={} skipped={}",
            report.embedded,
            report.failed,
            report.skipped
        );
        Ok(report)
    }

    pub fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let books = self.store.list_all()?;
        let mut stats = CatalogStats {
            total: books.len(),
            ..Default::default()
        };

        let mut rating_sum = 0u32;
        for book in &books {
            match book.status {
                Status::WantToRead => stats.want_to_read += 1,
                Status::Reading => stats.reading += 1,
                Status::Read => stats.read += 1,
            }
            if book.has_embedding() {
                stats.embedded += 1;
            }
            if book.rating > 0 {
                stats.rated += 1;
                rating_sum += book.rating as u32;
            }
        }

        if stats.rated > 0 {
            stats.average_rating = Some(rating_sum as f32 / stats.rated as f32);
        }
        Ok(stats)
    }

    fn embed(&self, book: &mut Book) -> Result<(), CatalogError> {
        self.cancel.check()?;
        let text = embedding_text(book);

        let vector = match self.provider.generate(&text) {
            Ok(vector) => vector,
            Err(err) => {
                log::warn!("book {} stored without embedding: {err}", book.id);
                return Err(err.into());
            }
        };

        self.cancel.check()?;
        self.store.set_embedding(book.id, &vector)?;
        log::debug!("stored {}-dim embedding for book {}", vector.len(), book.id);

        book.embedding = Some(vector);
        Ok(())
    }
}
