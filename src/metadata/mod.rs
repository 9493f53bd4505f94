//! Remote bibliographic sources used to prefill book records.
//!
//! Results carry no id and no embedding; the caller decides whether to add
//! them to the catalog.

pub mod normalize;
pub mod sources;
pub mod types;

pub use sources::{GoogleBooks, OpenLibrary};
pub use types::{FetchError, TrendingPeriod};

use std::time::{Duration, Instant};

use crate::{
    books::Book,
    config::{MetadataConfig, MetadataSourceKind},
};

pub trait BookSource: Send + Sync {
    /// Name of this source for logging
    fn name(&self) -> &'static str;

    /// Free-text search. `limit` of 0 uses the source's default page size.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<Book>, FetchError>;

    /// `Ok(None)` when the source does not know the ISBN.
    fn lookup_isbn(&self, isbn: &str) -> Result<Option<Book>, FetchError>;

    /// Books written by `author`. A blank author finds nothing.
    fn search_by_author(&self, author: &str, limit: usize) -> Result<Vec<Book>, FetchError>;

    /// Books filed under `subject`. A blank subject finds nothing.
    fn search_by_subject(&self, subject: &str, limit: usize) -> Result<Vec<Book>, FetchError>;

    /// Books currently popular on the source. Sources without a trending
    /// list return their newest releases and ignore `period`.
    fn trending(&self, period: TrendingPeriod, limit: usize) -> Result<Vec<Book>, FetchError>;
}

pub enum Source {
    OpenLibrary(OpenLibrary),
    GoogleBooks(GoogleBooks),
}

impl Source {
    fn inner(&self) -> &dyn BookSource {
        match self {
            Source::OpenLibrary(s) => s,
            Source::GoogleBooks(s) => s,
        }
    }

    fn logged(
        &self,
        op: &str,
        fetch: impl FnOnce(&dyn BookSource) -> Result<Vec<Book>, FetchError>,
    ) -> Result<Vec<Book>, FetchError> {
        let name = self.name();
        let now = Instant::now();
        match fetch(self.inner()) {
            Ok(books) => {
                log::info!(
                    "source={name} op={op} outcome=success results={} took={}ms",
                    books.len(),
                    now.elapsed().as_millis()
                );
                Ok(books)
            }
            Err(err) => {
                log::warn!("source={name} op={op} outcome=error err={err}");
                Err(err)
            }
        }
    }
}

impl BookSource for Source {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<Book>, FetchError> {
        self.logged("search", |s| s.search(query, limit))
    }

    fn lookup_isbn(&self, isbn: &str) -> Result<Option<Book>, FetchError> {
        let name = self.name();
        match self.inner().lookup_isbn(isbn) {
            Ok(Some(book)) => {
                log::info!("source={name} op=isbn isbn={isbn} outcome=success");
                Ok(Some(book))
            }
            Ok(None) => {
                log::info!("source={name} op=isbn isbn={isbn} outcome=skip");
                Ok(None)
            }
            Err(err) => {
                log::warn!("source={name} op=isbn isbn={isbn} outcome=error err={err}");
                Err(err)
            }
        }
    }

    fn search_by_author(&self, author: &str, limit: usize) -> Result<Vec<Book>, FetchError> {
        self.logged("author", |s| s.search_by_author(author, limit))
    }

    fn search_by_subject(&self, subject: &str, limit: usize) -> Result<Vec<Book>, FetchError> {
        self.logged("subject", |s| s.search_by_subject(subject, limit))
    }

    fn trending(&self, period: TrendingPeriod, limit: usize) -> Result<Vec<Book>, FetchError> {
        self.logged("trending", |s| s.trending(period, limit))
    }
}

/// Build the source selected in the config, or `kind` when given.
pub fn from_config(
    config: &MetadataConfig,
    kind: Option<MetadataSourceKind>,
) -> Result<Source, FetchError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    Ok(match kind.unwrap_or(config.source) {
        MetadataSourceKind::OpenLibrary => {
            Source::OpenLibrary(OpenLibrary::new(OpenLibrary::BASE_URL, timeout)?)
        }
        MetadataSourceKind::Google => Source::GoogleBooks(GoogleBooks::new(
            GoogleBooks::BASE_URL,
            config.google_api_key.clone(),
            timeout,
        )?),
    })
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client, FetchError> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("shelf/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| FetchError::Terminal(format!("couldn't build http client: {e}")))
}
