use std::sync::Arc;

use super::support::{csv_store, sqlite_store, StubEmbedder};
use crate::{
    books::Book,
    catalog::CatalogStore,
    semantic::{embeddings::EmbeddingProvider, RetrievalEngine},
};

fn engine_over(store: Arc<dyn CatalogStore>) -> RetrievalEngine {
    let provider: Arc<dyn EmbeddingProvider> = StubEmbedder::new();
    RetrievalEngine::new(store, provider)
}

/// Five books with known embeddings; similarity to `[1, 0]` decreases with
/// the title number.
fn seeded(store: &Arc<dyn CatalogStore>) -> Vec<i64> {
    let vectors: [[f32; 2]; 5] = [
        [1.0, 0.0],
        [0.9, 0.1],
        [0.5, 0.5],
        [0.0, 1.0],
        [-1.0, 0.0],
    ];
    vectors
        .iter()
        .enumerate()
        .map(|(i, vector)| {
            let id = store
                .create(&Book::new(format!("Book {i}"), "Author"))
                .unwrap();
            store.set_embedding(id, vector).unwrap();
            id
        })
        .collect()
}

#[test]
fn limit_keeps_top_results() {
    for store in [sqlite_store(), csv_store()] {
        let ids = seeded(&store);
        let engine = engine_over(store);

        let top: Vec<i64> = engine
            .search_vector(&[1.0, 0.0], 2)
            .unwrap()
            .iter()
            .map(|r| r.book.id)
            .collect();
        assert_eq!(top, ids[..2].to_vec());

        let all = engine.search_vector(&[1.0, 0.0], 0).unwrap();
        let all_ids: Vec<i64> = all.iter().map(|r| r.book.id).collect();
        assert_eq!(all_ids, ids);
        assert!(all.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        assert!((all[0].similarity - 1.0).abs() < 1e-6);
        assert!((all[4].similarity + 1.0).abs() < 1e-6);
    }
}

#[test]
fn unembedded_books_never_appear() {
    let store = sqlite_store();
    seeded(&store);
    let bare = store.create(&Book::new("No Vector", "Nobody")).unwrap();
    let engine = engine_over(store);

    let results = engine.search_vector(&[1.0, 0.0], 0).unwrap();
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.book.id != bare));
    assert!(results.iter().all(|r| r.book.has_embedding()));

    assert!(engine.find_similar(bare, 0).unwrap().is_empty());
}

#[test]
fn similar_excludes_seed() {
    let store = csv_store();
    let ids = seeded(&store);
    let engine = engine_over(store);

    let results = engine.find_similar(ids[0], 0).unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.book.id != ids[0]));
    assert_eq!(results[0].book.id, ids[1]);

    let results = engine.find_similar(ids[0], 1).unwrap();
    assert_eq!(results.len(), 1);
}

#[test]
fn similar_to_missing_book_is_empty() {
    let store = sqlite_store();
    seeded(&store);
    let engine = engine_over(store);

    assert!(engine.find_similar(999, 5).unwrap().is_empty());
}

#[test]
fn empty_catalog_search() {
    let engine = engine_over(sqlite_store());
    assert!(engine.search("space", 10).unwrap().is_empty());
}

#[test]
fn text_search_ranks_by_topic() {
    let store = sqlite_store();
    let provider = StubEmbedder::new();

    let mut ids = Vec::new();
    for (title, description) in [
        ("Starfall", "space space station"),
        ("Sandworm", "desert crossing"),
        ("Mixed", "space and desert"),
    ] {
        let id = store.create(&Book::new(title, "Author")).unwrap();
        let vector = provider
            .generate(&format!("{title} by Author. {description}"))
            .unwrap();
        store.set_embedding(id, &vector).unwrap();
        ids.push(id);
    }

    let engine = RetrievalEngine::new(store, provider.clone());
    let results = engine.search("space", 0).unwrap();
    let order: Vec<i64> = results.iter().map(|r| r.book.id).collect();
    assert_eq!(order, vec![ids[0], ids[2], ids[1]]);
    assert_eq!(provider.last_text().as_deref(), Some("space"));
}

#[test]
fn mismatched_dimensions_score_zero() {
    let store = sqlite_store();
    let ids = seeded(&store);
    let odd = store.create(&Book::new("Odd", "Author")).unwrap();
    store.set_embedding(odd, &[1.0, 0.0, 0.0]).unwrap();
    let engine = engine_over(store);

    let results = engine.search_vector(&[1.0, 0.0], 0).unwrap();
    let odd_result = results.iter().find(|r| r.book.id == odd).unwrap();
    assert_eq!(odd_result.similarity, 0.0);
    assert_eq!(results[0].book.id, ids[0]);
}
