use serde::Serialize;
use std::{fmt::Display, sync::Arc};

use crate::{
    books::Book,
    catalog::{CatalogStore, StorageError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    Isbn,
    TitleAuthor,
}

impl Display for MatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchReason::Isbn => write!(f, "ISBN"),
            MatchReason::TitleAuthor => write!(f, "title+author"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DuplicateMatch {
    pub existing: Book,
    pub reason: MatchReason,
}

/// Syntactic duplicate check against the stored catalog.
///
/// ISBN is tried first, then case-insensitive title + author. Embeddings
/// are never compared.
#[derive(Clone)]
pub struct DuplicateDetector {
    store: Arc<dyn CatalogStore>,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub fn check(&self, candidate: &Book) -> Result<Option<DuplicateMatch>, StorageError> {
        if let Some(isbn) = candidate.isbn() {
            if let Some(existing) = self.store.find_by_isbn(isbn)? {
                log::debug!("isbn {isbn} already in catalog as book {}", existing.id);
                return Ok(Some(DuplicateMatch {
                    existing,
                    reason: MatchReason::Isbn,
                }));
            }
        }

        let (title, author) = (candidate.title.trim(), candidate.author.trim());
        if title.is_empty() || author.is_empty() {
            return Ok(None);
        }

        Ok(self
            .store
            .find_by_title_author(title, author)?
            .map(|existing| DuplicateMatch {
                existing,
                reason: MatchReason::TitleAuthor,
            }))
    }
}
