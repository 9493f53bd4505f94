use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt::Display, hash::Hash, str::FromStr};

use crate::errors::CatalogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    WantToRead,
    Reading,
    Read,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::WantToRead => "want_to_read",
            Status::Reading => "reading",
            Status::Read => "read",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "want_to_read" | "want-to-read" | "to-read" | "to_read" => Ok(Status::WantToRead),
            "reading" => Ok(Status::Reading),
            "read" => Ok(Status::Read),
            other => Err(CatalogError::validation(
                "status",
                format!("unknown status \"{other}\" (use want_to_read, reading, read)"),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    #[serde(default)]
    pub id: i64,

    pub title: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub current_page: u32,

    /// 0 means unrated, otherwise 1-5.
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub notes: String,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl Default for Book {
    fn default() -> Self {
        Self {
            id: 0,
            title: String::new(),
            author: String::new(),
            isbn: None,
            description: String::new(),
            genre: String::new(),
            tags: Vec::new(),
            cover_url: None,
            page_count: 0,
            current_page: 0,
            rating: 0,
            status: Status::default(),
            notes: String::new(),
            created_at: Utc::now(),
            completed_at: None,
            embedding: None,
        }
    }
}

impl Hash for Book {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialEq for Book {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Book {}

impl Book {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            ..Default::default()
        }
    }

    /// Reading progress as a percentage, 0 when page counts are unknown.
    pub fn progress(&self) -> u32 {
        if self.page_count == 0 || self.current_page == 0 {
            return 0;
        }
        ((self.current_page as u64 * 100) / self.page_count as u64).min(100) as u32
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// ISBN with surrounding whitespace removed, `None` when blank.
    pub fn isbn(&self) -> Option<&str> {
        self.isbn.as_deref().map(str::trim).filter(|isbn| !isbn.is_empty())
    }

    /// Moves the record to `status`. Entering `Read` stamps `completed_at`
    /// once; an existing completion timestamp is never replaced.
    pub fn set_status(&mut self, status: Status, now: DateTime<Utc>) {
        self.status = status;
        if status == Status::Read && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.title.trim().is_empty() {
            return Err(CatalogError::validation("title", "title is required"));
        }
        if self.author.trim().is_empty() {
            return Err(CatalogError::validation("author", "author is required"));
        }
        if self.rating > 5 {
            return Err(CatalogError::validation(
                "rating",
                format!("rating must be between 1 and 5, got {}", self.rating),
            ));
        }
        Ok(())
    }

    /// Trims text fields and drops empty or repeated tags.
    pub fn normalize(&mut self) {
        self.title = self.title.trim().to_string();
        self.author = self.author.trim().to_string();
        self.isbn = self.isbn().map(String::from);

        let mut seen = HashSet::new();
        self.tags = self
            .tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(t.to_lowercase()))
            .collect();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub book: Book,
    /// Cosine similarity in [-1, 1].
    pub similarity: f32,
}
