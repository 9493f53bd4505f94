use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use crate::{
    catalog::{BackendCsv, BackendSqlite, CatalogStore},
    semantic::{EmbeddingError, EmbeddingProvider},
    service::CatalogService,
};

/// Topic words; each one is a dimension of the stub vectors.
const TOPICS: [&str; 8] = [
    "space", "desert", "romance", "dragon", "war", "detective", "ocean", "robot",
];

/// Deterministic provider: counts topic words in the text.
///
/// Texts mentioning no topic get a small constant in an extra dimension so
/// the vector is never all zeros.
#[derive(Default)]
pub struct StubEmbedder {
    calls: AtomicUsize,
    failing: AtomicBool,
    texts: Mutex<Vec<String>>,
}

impl StubEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn last_text(&self) -> Option<String> {
        self.texts.lock().unwrap().last().cloned()
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        let mut vector: Vec<f32> = TOPICS
            .iter()
            .map(|topic| text.matches(topic).count() as f32)
            .collect();
        let any = vector.iter().any(|v| *v > 0.0);
        vector.push(if any { 0.0 } else { 1.0 });
        vector
    }
}

impl EmbeddingProvider for StubEmbedder {
    fn generate(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());

        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Status(503));
        }
        Ok(Self::vector_for(text))
    }

    fn model(&self) -> &str {
        "stub"
    }
}

pub fn sqlite_store() -> Arc<dyn CatalogStore> {
    Arc::new(BackendSqlite::open_in_memory().unwrap())
}

pub fn csv_store() -> Arc<dyn CatalogStore> {
    Arc::new(BackendCsv::in_memory())
}

pub fn service_with(store: Arc<dyn CatalogStore>) -> (CatalogService, Arc<StubEmbedder>) {
    let embedder = StubEmbedder::new();
    (CatalogService::new(store, embedder.clone()), embedder)
}

pub fn fresh_service() -> (CatalogService, Arc<StubEmbedder>) {
    service_with(sqlite_store())
}
