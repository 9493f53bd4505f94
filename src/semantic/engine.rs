use std::sync::Arc;

use crate::{
    books::SearchResult,
    cancel::Cancellation,
    catalog::CatalogStore,
    errors::CatalogError,
    semantic::{embeddings::EmbeddingProvider, similarity},
};

/// Ranks the embedded part of the catalog against a query text, a raw
/// vector, or another book.
pub struct RetrievalEngine {
    store: Arc<dyn CatalogStore>,
    provider: Arc<dyn EmbeddingProvider>,
    cancel: Cancellation,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn CatalogStore>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            provider,
            cancel: Cancellation::default(),
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Embed `query` and rank every embedded book against it.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, CatalogError> {
        self.cancel.check()?;
        let query_vector = self.provider.generate(query)?;
        self.cancel.check()?;

        let results = self.search_vector(&query_vector, limit)?;
        log::info!("search query={query:?} results={}", results.len());
        Ok(results)
    }

    pub fn search_vector(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        let pool = self.store.list_embedded()?;
        Ok(similarity::rank(vector, pool, None, limit))
    }

    /// Rank every other embedded book against book `id`.
    ///
    /// A book that does not exist or has no embedding yields an empty list.
    pub fn find_similar(&self, id: i64, limit: usize) -> Result<Vec<SearchResult>, CatalogError> {
        let pool = self.store.list_embedded()?;

        let Some(seed) = pool
            .iter()
            .find(|book| book.id == id)
            .and_then(|book| book.embedding.clone())
        else {
            log::debug!("book {id} has no embedding, nothing to compare against");
            return Ok(vec![]);
        };

        Ok(similarity::rank(&seed, pool, Some(id), limit))
    }
}
