//! Semantic retrieval for the book catalog.
//!
//! # Architecture
//!
//! - `codec`: embedding vector <-> stored blob
//! - `embeddings`: providers turning text into vectors
//! - `preprocess`: the text a book is embedded from
//! - `similarity`: cosine similarity and ranking
//! - `engine`: query / similar-book search over the catalog

pub mod codec;
pub mod embeddings;
mod engine;
mod preprocess;
pub mod similarity;

pub use embeddings::{EmbeddingError, EmbeddingProvider, OllamaEmbedder};
pub use engine::RetrievalEngine;
pub use preprocess::embedding_text;

/// Default Ollama endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default embedding model
pub const DEFAULT_MODEL: &str = "nomic-embed-text";
