//! Behaviour both storage engines must share.

use chrono::{TimeZone, Utc};
use std::{path::Path, sync::Arc};

use super::support::{csv_store, sqlite_store};
use crate::{
    books::{Book, Status},
    catalog::{BackendCsv, BackendSqlite, CatalogStore, StorageError},
};

fn stores() -> Vec<(&'static str, Arc<dyn CatalogStore>)> {
    vec![("sqlite", sqlite_store()), ("csv", csv_store())]
}

fn at(day: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 9, 30, 0).unwrap()
}

#[test]
fn listing_is_newest_first() {
    for (name, store) in stores() {
        let old = store
            .create(&Book {
                created_at: at(1),
                ..Book::new("Old", "A")
            })
            .unwrap();
        let new = store
            .create(&Book {
                created_at: at(5),
                ..Book::new("New", "B")
            })
            .unwrap();
        let tie = store
            .create(&Book {
                created_at: at(1),
                status: Status::Read,
                ..Book::new("Tie", "C")
            })
            .unwrap();

        let ids: Vec<i64> = store.list_all().unwrap().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![new, tie, old], "{name}");

        let read: Vec<i64> = store
            .list_by_status(Status::Read)
            .unwrap()
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(read, vec![tie], "{name}");
        assert!(store.list_by_status(Status::Reading).unwrap().is_empty());
    }
}

#[test]
fn fields_survive_storage() {
    for (name, store) in stores() {
        let book = Book {
            isbn: Some("9780441013593".into()),
            description: "Sand, spice, \"politics\"".into(),
            genre: "Science Fiction".into(),
            tags: vec!["science fiction, hard".into(), "classic".into()],
            cover_url: Some("https://covers.example/dune.jpg".into()),
            page_count: 612,
            current_page: 100,
            rating: 5,
            status: Status::Read,
            notes: "line one\nline two".into(),
            created_at: at(2),
            completed_at: Some(at(3)),
            ..Book::new("Dune", "Frank Herbert")
        };
        let id = store.create(&book).unwrap();
        let stored = store.get(id).unwrap();

        assert_eq!(stored.id, id, "{name}");
        assert_eq!(stored.isbn, book.isbn);
        assert_eq!(stored.description, book.description);
        assert_eq!(stored.genre, book.genre);
        assert_eq!(stored.tags, book.tags);
        assert_eq!(stored.cover_url, book.cover_url);
        assert_eq!(stored.page_count, 612);
        assert_eq!(stored.current_page, 100);
        assert_eq!(stored.rating, 5);
        assert_eq!(stored.status, Status::Read);
        assert_eq!(stored.notes, book.notes);
        assert_eq!(stored.created_at, at(2));
        assert_eq!(stored.completed_at, Some(at(3)));
        assert!(stored.embedding.is_none(), "{name}");
    }
}

#[test]
fn missing_ids() {
    for (name, store) in stores() {
        assert!(matches!(store.get(7), Err(StorageError::NotFound(7))), "{name}");

        let ghost = Book {
            id: 7,
            ..Book::new("Ghost", "Nobody")
        };
        assert!(matches!(store.update(&ghost), Err(StorageError::NotFound(7))));
        assert!(matches!(
            store.set_embedding(7, &[1.0]),
            Err(StorageError::NotFound(7))
        ));

        store.delete(7).unwrap();
    }
}

#[test]
fn delete_is_idempotent() {
    for (name, store) in stores() {
        let id = store.create(&Book::new("Dune", "Frank Herbert")).unwrap();
        store.set_embedding(id, &[0.1, 0.2]).unwrap();

        store.delete(id).unwrap();
        store.delete(id).unwrap();

        assert!(store.list_all().unwrap().is_empty(), "{name}");
        assert!(store.list_embedded().unwrap().is_empty(), "{name}");
        assert!(store.find_by_title_author("Dune", "Frank Herbert").unwrap().is_none());
    }
}

#[test]
fn embedded_pool_is_ascending() {
    for (name, store) in stores() {
        let first = store
            .create(&Book {
                created_at: at(1),
                ..Book::new("First", "A")
            })
            .unwrap();
        let bare = store
            .create(&Book {
                created_at: at(2),
                ..Book::new("Bare", "B")
            })
            .unwrap();
        let third = store
            .create(&Book {
                created_at: at(3),
                ..Book::new("Third", "C")
            })
            .unwrap();

        store.set_embedding(third, &[0.0, 1.0]).unwrap();
        store.set_embedding(first, &[1.0, 0.0]).unwrap();

        let pool = store.list_embedded().unwrap();
        let ids: Vec<i64> = pool.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![first, third], "{name}");
        assert_eq!(pool[0].embedding.as_deref(), Some(&[1.0f32, 0.0][..]));
        assert!(!ids.contains(&bare));

        store.set_embedding(first, &[0.5, 0.5]).unwrap();
        assert_eq!(
            store.get(first).unwrap().embedding.as_deref(),
            Some(&[0.5f32, 0.5][..]),
            "{name}"
        );
    }
}

#[test]
fn update_replaces_fields() {
    for (name, store) in stores() {
        let id = store
            .create(&Book {
                created_at: at(4),
                ..Book::new("Dune", "Frank Herbert")
            })
            .unwrap();
        store.set_embedding(id, &[0.3, 0.4]).unwrap();

        let mut book = store.get(id).unwrap();
        book.title = "Dune Messiah".into();
        book.rating = 3;
        book.status = Status::Reading;
        book.created_at = at(20);
        store.update(&book).unwrap();

        let stored = store.get(id).unwrap();
        assert_eq!(stored.title, "Dune Messiah", "{name}");
        assert_eq!(stored.rating, 3);
        assert_eq!(stored.status, Status::Reading);
        assert_eq!(stored.created_at, at(4), "{name}");
        assert_eq!(stored.embedding.as_deref(), Some(&[0.3f32, 0.4][..]), "{name}");
    }
}

#[test]
fn lookups() {
    for (name, store) in stores() {
        let id = store
            .create(&Book {
                isbn: Some("9780441013593".into()),
                ..Book::new("Dune", "Frank Herbert")
            })
            .unwrap();

        assert_eq!(
            store.find_by_isbn("9780441013593").unwrap().map(|b| b.id),
            Some(id),
            "{name}"
        );
        assert!(store.find_by_isbn("9780000000000").unwrap().is_none());
        assert!(store.find_by_isbn("").unwrap().is_none());

        assert_eq!(
            store
                .find_by_title_author("  dune ", "FRANK HERBERT")
                .unwrap()
                .map(|b| b.id),
            Some(id),
            "{name}"
        );
        assert!(store
            .find_by_title_author("Dune", "Brian Herbert")
            .unwrap()
            .is_none());
        assert!(store.find_by_title_author("", "").unwrap().is_none());
    }
}

type Open = fn(&Path) -> Arc<dyn CatalogStore>;

fn open_sqlite(path: &Path) -> Arc<dyn CatalogStore> {
    Arc::new(BackendSqlite::open(path).unwrap())
}

fn open_csv(path: &Path) -> Arc<dyn CatalogStore> {
    Arc::new(BackendCsv::load(path).unwrap())
}

fn on_disk() -> Vec<(&'static str, &'static str, Open)> {
    vec![
        ("sqlite", "books.db", open_sqlite as Open),
        ("csv", "books.csv", open_csv as Open),
    ]
}

#[test]
fn fields_survive_reopen() {
    for (name, file, open) in on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(file);

        let mut book = Book {
            tags: vec!["science fiction, hard".into(), "classic".into()],
            notes: "quotes \"and\", commas".into(),
            ..Book::new("Dune", "Frank Herbert")
        };
        book.set_status(Status::Read, Utc::now());

        let id = {
            let store = open(&path);
            let id = store.create(&book).unwrap();
            store.set_embedding(id, &[0.25, -0.5]).unwrap();
            id
        };

        let stored = open(&path).get(id).unwrap();
        assert_eq!(stored.tags, book.tags, "{name}");
        assert_eq!(stored.notes, book.notes, "{name}");
        assert_eq!(stored.created_at, book.created_at, "{name}");
        assert_eq!(stored.completed_at, book.completed_at, "{name}");
        assert_eq!(stored.embedding, Some(vec![0.25, -0.5]), "{name}");
    }
}

#[test]
fn ids_are_never_reused() {
    for (name, file, open) in on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(file);

        let newest = {
            let store = open(&path);
            store.create(&Book::new("Dune", "Frank Herbert")).unwrap();
            let newest = store.create(&Book::new("Emma", "Jane Austen")).unwrap();
            store.delete(newest).unwrap();
            newest
        };

        let next = open(&path).create(&Book::new("Ubik", "Philip K. Dick")).unwrap();
        assert!(next > newest, "{name}: reused id {next}");
    }
}

#[test]
fn title_author_lookup_folds_unicode() {
    for (name, store) in stores() {
        let id = store.create(&Book::new("L'Étranger", "Émile Zola")).unwrap();

        let found = store
            .find_by_title_author("l'étranger", "ÉMILE ZOLA")
            .unwrap()
            .map(|b| b.id);
        assert_eq!(found, Some(id), "{name}");
    }
}
