use crate::{
    books::Book, catalog::StorageError, duplicates::MatchReason,
    semantic::embeddings::EmbeddingError,
};

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error(
        "duplicate book: {} by {} (id {}, matched by {reason})",
        .existing.title, .existing.author, .existing.id
    )]
    Duplicate {
        existing: Box<Book>,
        reason: MatchReason,
    },

    #[error("book {0} not found")]
    NotFound(i64),

    #[error("storage error: {0}")]
    Storage(StorageError),

    #[error("embedding provider error: {0}")]
    Provider(#[from] EmbeddingError),

    #[error("operation cancelled")]
    Cancelled,
}

impl CatalogError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<StorageError> for CatalogError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => CatalogError::NotFound(id),
            other => CatalogError::Storage(other),
        }
    }
}
