use serde::Deserialize;
use std::time::Duration;

use crate::{
    books::Book,
    metadata::{
        http_client,
        normalize::{normalize_isbn, subject_tags, truncate, MAX_DESCRIPTION_CHARS},
        BookSource, FetchError, TrendingPeriod,
    },
};

const DEFAULT_LIMIT: usize = 20;
const NEWEST_CATEGORY: &str = "fiction";
/// Largest page the volumes endpoint serves.
const MAX_LIMIT: usize = 40;

/// Google Books volumes API. The API key is optional.
pub struct GoogleBooks {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    volume_info: VolumeInfo,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    industry_identifiers: Vec<Identifier>,
    #[serde(default)]
    categories: Vec<String>,
    page_count: Option<u32>,
    image_links: Option<ImageLinks>,
}

#[derive(Deserialize)]
struct Identifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

#[derive(Deserialize)]
struct ImageLinks {
    thumbnail: Option<String>,
}

impl VolumeInfo {
    fn isbn(&self) -> Option<String> {
        let find = |kind: &str| {
            self.industry_identifiers
                .iter()
                .find(|id| id.kind == kind)
                .map(|id| normalize_isbn(&id.identifier))
        };
        find("ISBN_13").or_else(|| find("ISBN_10"))
    }

    fn into_book(self) -> Book {
        Book {
            isbn: self.isbn(),
            description: truncate(&self.description, MAX_DESCRIPTION_CHARS),
            genre: self.categories.first().cloned().unwrap_or_default(),
            tags: subject_tags(&self.categories),
            cover_url: self.image_links.and_then(|links| links.thumbnail),
            page_count: self.page_count.unwrap_or_default(),
            ..Book::new(self.title, self.authors.join(", "))
        }
    }
}

impl GoogleBooks {
    pub const BASE_URL: &'static str = "https://www.googleapis.com/books/v1";

    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// Most recently published volumes in `category`.
    fn newest(&self, category: &str, limit: usize) -> Result<Vec<Book>, FetchError> {
        self.volumes(&format!("subject:{}", category.trim()), limit, true)
    }

    fn volumes(&self, query: &str, limit: usize, newest: bool) -> Result<Vec<Book>, FetchError> {
        let limit = match limit {
            0 => DEFAULT_LIMIT,
            n => n.min(MAX_LIMIT),
        };

        let mut params = vec![
            ("q", query.to_string()),
            ("maxResults", limit.to_string()),
            ("printType", "books".to_string()),
            ("langRestrict", "en".to_string()),
        ];
        if newest {
            params.push(("orderBy", "newest".to_string()));
        }
        if let Some(key) = &self.api_key {
            params.push(("key", key.clone()));
        }

        let resp = self
            .client
            .get(format!("{}/volumes", self.base_url))
            .query(&params)
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::from_status("googlebooks", status));
        }

        let body: VolumesResponse = resp
            .json()
            .map_err(|e| FetchError::Terminal(format!("couldn't decode volumes: {e}")))?;

        Ok(body
            .items
            .into_iter()
            .map(|item| item.volume_info)
            .filter(|info| !info.title.trim().is_empty())
            .map(VolumeInfo::into_book)
            .collect())
    }
}

impl BookSource for GoogleBooks {
    fn name(&self) -> &'static str {
        "googlebooks"
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<Book>, FetchError> {
        self.volumes(query, limit, false)
    }

    fn lookup_isbn(&self, isbn: &str) -> Result<Option<Book>, FetchError> {
        let isbn = normalize_isbn(isbn);
        if isbn.is_empty() {
            return Ok(None);
        }
        Ok(self.search(&format!("isbn:{isbn}"), 1)?.into_iter().next())
    }

    fn search_by_author(&self, author: &str, limit: usize) -> Result<Vec<Book>, FetchError> {
        match author.trim() {
            "" => Ok(vec![]),
            author => self.volumes(&format!("inauthor:{author}"), limit, false),
        }
    }

    fn search_by_subject(&self, subject: &str, limit: usize) -> Result<Vec<Book>, FetchError> {
        match subject.trim() {
            "" => Ok(vec![]),
            subject => self.volumes(&format!("subject:{subject}"), limit, false),
        }
    }

    /// No trending list here, so the newest fiction stands in.
    fn trending(&self, _period: TrendingPeriod, limit: usize) -> Result<Vec<Book>, FetchError> {
        self.newest(NEWEST_CATEGORY, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_search_maps_volumes() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/volumes")
                .query_param("q", "dune")
                .query_param("maxResults", "40")
                .query_param("printType", "books")
                .query_param("langRestrict", "en")
                .query_param("key", "secret");
            then.status(200).json_body(json!({
                "totalItems": 2,
                "items": [
                    {"volumeInfo": {
                        "title": "Dune",
                        "authors": ["Frank Herbert"],
                        "description": "Desert planet.",
                        "industryIdentifiers": [
                            {"type": "ISBN_10", "identifier": "0441013597"},
                            {"type": "ISBN_13", "identifier": "9780441013593"}
                        ],
                        "categories": ["Fiction", "Science Fiction"],
                        "pageCount": 604,
                        "imageLinks": {"thumbnail": "http://books.google.com/dune.jpg"}
                    }},
                    {"volumeInfo": {"authors": ["Untitled"]}}
                ]
            }));
        });

        let source = GoogleBooks::new(
            &server.base_url(),
            Some("secret".into()),
            Duration::from_secs(5),
        )
        .unwrap();
        let books = source.search("dune", 100).unwrap();
        mock.assert();

        assert_eq!(books.len(), 1);
        let dune = &books[0];
        assert_eq!(dune.author, "Frank Herbert");
        assert_eq!(dune.isbn.as_deref(), Some("9780441013593"));
        assert_eq!(dune.genre, "Fiction");
        assert_eq!(dune.tags, vec!["Fiction", "Science Fiction"]);
        assert_eq!(dune.page_count, 604);
        assert_eq!(dune.cover_url.as_deref(), Some("http://books.google.com/dune.jpg"));
    }

    #[test]
    fn test_lookup_isbn_uses_isbn_query() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/volumes")
                .query_param("q", "isbn:9780441013593")
                .query_param("maxResults", "1");
            then.status(200).json_body(json!({"totalItems": 0}));
        });

        let source = GoogleBooks::new(&server.base_url(), None, Duration::from_secs(5)).unwrap();
        assert!(source.lookup_isbn("978-0441013593").unwrap().is_none());
        mock.assert();
    }

    #[test]
    fn test_client_error_is_terminal() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/volumes");
            then.status(400).body("bad query");
        });

        let source = GoogleBooks::new(&server.base_url(), None, Duration::from_secs(5)).unwrap();
        let err = source.search("x", 0).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_author_and_subject_queries() {
        let server = MockServer::start();
        let by_author = server.mock(|when, then| {
            when.method(GET)
                .path("/volumes")
                .query_param("q", "inauthor:Ursula K. Le Guin")
                .query_param("maxResults", "40");
            then.status(200).json_body(json!({
                "items": [{"volumeInfo": {
                    "title": "The Dispossessed",
                    "authors": ["Ursula K. Le Guin"]
                }}]
            }));
        });
        let by_subject = server.mock(|when, then| {
            when.method(GET)
                .path("/volumes")
                .query_param("q", "subject:science fiction")
                .query_param("maxResults", "20");
            then.status(200).json_body(json!({"totalItems": 0}));
        });

        let source = GoogleBooks::new(&server.base_url(), None, Duration::from_secs(5)).unwrap();
        let books = source.search_by_author(" Ursula K. Le Guin ", 50).unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "The Dispossessed");
        assert!(source.search_by_subject("science fiction", 0).unwrap().is_empty());
        assert!(source.search_by_author("  ", 10).unwrap().is_empty());

        by_author.assert();
        by_subject.assert();
    }

    #[test]
    fn test_trending_orders_by_newest() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/volumes")
                .query_param("q", "subject:fiction")
                .query_param("orderBy", "newest")
                .query_param("maxResults", "20");
            then.status(200).json_body(json!({
                "items": [{"volumeInfo": {"title": "Fresh Off The Press", "authors": ["A. Writer"]}}]
            }));
        });

        let source = GoogleBooks::new(&server.base_url(), None, Duration::from_secs(5)).unwrap();
        let books = source.trending(TrendingPeriod::Yearly, 20).unwrap();
        mock.assert();
        assert_eq!(books[0].author, "A. Writer");
    }
}
