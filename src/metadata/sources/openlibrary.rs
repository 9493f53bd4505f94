use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;

use crate::{
    books::Book,
    metadata::{
        http_client,
        normalize::{normalize_isbn, subject_tags, truncate, MAX_DESCRIPTION_CHARS},
        BookSource, FetchError, TrendingPeriod,
    },
};

const DEFAULT_LIMIT: usize = 10;

/// openlibrary.org search and ISBN lookup.
pub struct OpenLibrary {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Deserialize)]
struct SearchDoc {
    #[serde(default)]
    title: String,
    #[serde(default)]
    author_name: Vec<String>,
    #[serde(default)]
    isbn: Vec<String>,
    #[serde(default)]
    subject: Vec<String>,
    cover_i: Option<i64>,
    number_of_pages_median: Option<u32>,
}

impl SearchDoc {
    fn into_book(self) -> Book {
        Book {
            isbn: prefer_isbn13(&self.isbn),
            tags: subject_tags(&self.subject),
            cover_url: self.cover_i.and_then(cover_url),
            page_count: self.number_of_pages_median.unwrap_or_default(),
            ..Book::new(self.title, self.author_name.join(", "))
        }
    }
}

/// `/trending/{period}.json` lists works in the search doc shape.
#[derive(Deserialize)]
struct TrendingResponse {
    #[serde(default)]
    works: Vec<SearchDoc>,
}

#[derive(Deserialize)]
struct SubjectResponse {
    #[serde(default)]
    works: Vec<SubjectWork>,
}

#[derive(Deserialize)]
struct SubjectWork {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<Author>,
    cover_id: Option<i64>,
    #[serde(default)]
    subject: Vec<String>,
}

impl SubjectWork {
    fn into_book(self) -> Book {
        let authors: Vec<String> = self
            .authors
            .into_iter()
            .map(|a| a.name)
            .filter(|n| !n.is_empty())
            .collect();
        Book {
            tags: subject_tags(&self.subject),
            cover_url: self.cover_id.and_then(cover_url),
            ..Book::new(self.title, authors.join(", "))
        }
    }
}

/// Subject pages are keyed by a lowercase slug: "Science Fiction" is `science_fiction`.
fn subject_slug(subject: &str) -> String {
    subject
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

#[derive(Deserialize)]
struct KeyRef {
    key: String,
}

#[derive(Deserialize)]
struct Edition {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<KeyRef>,
    #[serde(default)]
    isbn_10: Vec<String>,
    #[serde(default)]
    isbn_13: Vec<String>,
    #[serde(default)]
    works: Vec<KeyRef>,
    number_of_pages: Option<u32>,
    #[serde(default)]
    covers: Vec<i64>,
}

/// Descriptions come either as a bare string or as `{"type", "value"}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Text {
    Plain(String),
    Typed { value: String },
}

impl Text {
    fn into_string(self) -> String {
        match self {
            Text::Plain(s) | Text::Typed { value: s } => s,
        }
    }
}

#[derive(Deserialize)]
struct Work {
    description: Option<Text>,
    #[serde(default)]
    subjects: Vec<String>,
}

#[derive(Deserialize)]
struct Author {
    #[serde(default)]
    name: String,
}

fn cover_url(cover_id: i64) -> Option<String> {
    (cover_id > 0).then(|| format!("https://covers.openlibrary.org/b/id/{cover_id}-L.jpg"))
}

fn prefer_isbn13(isbns: &[String]) -> Option<String> {
    isbns
        .iter()
        .map(|i| normalize_isbn(i))
        .find(|i| i.len() == 13)
        .or_else(|| isbns.first().map(|i| normalize_isbn(i)))
        .filter(|i| !i.is_empty())
}

impl OpenLibrary {
    pub const BASE_URL: &'static str = "https://openlibrary.org";

    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// GET `{base_url}{path}`; a 404 is `Ok(None)`.
    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, FetchError> {
        let resp = self
            .client
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .send()?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => resp
                .json::<T>()
                .map(Some)
                .map_err(|e| FetchError::Terminal(format!("couldn't decode {path}: {e}"))),
            status => Err(FetchError::from_status("openlibrary", status)),
        }
    }

    fn work(&self, key: &str) -> Option<Work> {
        match self.get_json::<Work>(&format!("{key}.json"), &[]) {
            Ok(work) => work,
            Err(err) => {
                log::debug!("openlibrary work {key} unavailable: {err}");
                None
            }
        }
    }

    /// Search on a single field of `/search.json`.
    fn search_docs(&self, field: &str, value: &str, limit: usize) -> Result<Vec<Book>, FetchError> {
        let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };

        let resp: SearchResponse = self
            .get_json(
                "/search.json",
                &[(field, value.to_string()), ("limit", limit.to_string())],
            )?
            .ok_or_else(|| FetchError::Terminal("search endpoint not found".to_string()))?;

        Ok(resp
            .docs
            .into_iter()
            .filter(|doc| !doc.title.trim().is_empty())
            .take(limit)
            .map(SearchDoc::into_book)
            .collect())
    }

    fn author_name(&self, key: &str) -> Option<String> {
        match self.get_json::<Author>(&format!("{key}.json"), &[]) {
            Ok(author) => author.map(|a| a.name).filter(|n| !n.is_empty()),
            Err(err) => {
                log::debug!("openlibrary author {key} unavailable: {err}");
                None
            }
        }
    }
}

impl BookSource for OpenLibrary {
    fn name(&self) -> &'static str {
        "openlibrary"
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<Book>, FetchError> {
        self.search_docs("q", query, limit)
    }

    fn lookup_isbn(&self, isbn: &str) -> Result<Option<Book>, FetchError> {
        let isbn = normalize_isbn(isbn);
        if isbn.is_empty() {
            return Ok(None);
        }

        let Some(edition) = self.get_json::<Edition>(&format!("/isbn/{isbn}.json"), &[])? else {
            return Ok(None);
        };

        let work = edition.works.first().and_then(|w| self.work(&w.key));
        let (description, subjects) = match work {
            Some(work) => (
                work.description.map(Text::into_string).unwrap_or_default(),
                work.subjects,
            ),
            None => (String::new(), vec![]),
        };

        let authors: Vec<String> = edition
            .authors
            .iter()
            .filter_map(|a| self.author_name(&a.key))
            .collect();

        let isbn = prefer_isbn13(&edition.isbn_13)
            .or_else(|| prefer_isbn13(&edition.isbn_10))
            .unwrap_or(isbn);

        Ok(Some(Book {
            isbn: Some(isbn),
            description: truncate(&description, MAX_DESCRIPTION_CHARS),
            tags: subject_tags(&subjects),
            cover_url: edition.covers.first().copied().and_then(cover_url),
            page_count: edition.number_of_pages.unwrap_or_default(),
            ..Book::new(edition.title, authors.join(", "))
        }))
    }

    fn search_by_author(&self, author: &str, limit: usize) -> Result<Vec<Book>, FetchError> {
        match author.trim() {
            "" => Ok(vec![]),
            author => self.search_docs("author", author, limit),
        }
    }

    fn search_by_subject(&self, subject: &str, limit: usize) -> Result<Vec<Book>, FetchError> {
        let slug = subject_slug(subject);
        if slug.is_empty() {
            return Ok(vec![]);
        }
        let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };

        // unknown subjects are a 404
        let Some(resp) = self.get_json::<SubjectResponse>(
            &format!("/subjects/{slug}.json"),
            &[("limit", limit.to_string())],
        )?
        else {
            return Ok(vec![]);
        };

        Ok(resp
            .works
            .into_iter()
            .filter(|work| !work.title.trim().is_empty())
            .take(limit)
            .map(SubjectWork::into_book)
            .collect())
    }

    fn trending(&self, period: TrendingPeriod, limit: usize) -> Result<Vec<Book>, FetchError> {
        let limit = if limit == 0 { DEFAULT_LIMIT } else { limit };

        let resp: TrendingResponse = self
            .get_json(
                &format!("/trending/{period}.json"),
                &[("limit", limit.to_string())],
            )?
            .ok_or_else(|| FetchError::Terminal(format!("no trending list for {period}")))?;

        Ok(resp
            .works
            .into_iter()
            .filter(|doc| !doc.title.trim().is_empty())
            .take(limit)
            .map(SearchDoc::into_book)
            .collect())
    }
}
