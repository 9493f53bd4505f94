use anyhow::bail;
use std::{io::Write, str::FromStr};

use crate::books::Book;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!("unknown format: {other} (use json or csv)"),
        }
    }
}

const CSV_HEADERS: [&str; 14] = [
    "id",
    "title",
    "author",
    "isbn",
    "genre",
    "description",
    "tags",
    "page_count",
    "current_page",
    "rating",
    "status",
    "notes",
    "created_at",
    "completed_at",
];

/// Write `books` to `out`. Embeddings are never exported.
pub fn export_books<W: Write>(books: &[Book], format: ExportFormat, mut out: W) -> anyhow::Result<()> {
    match format {
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, books)?;
            writeln!(out)?;
        }
        ExportFormat::Csv => {
            let mut csv_wrt = csv::Writer::from_writer(out);
            csv_wrt.write_record(CSV_HEADERS)?;
            for book in books {
                csv_wrt.write_record([
                    book.id.to_string(),
                    book.title.clone(),
                    book.author.clone(),
                    book.isbn.clone().unwrap_or_default(),
                    book.genre.clone(),
                    book.description.clone(),
                    book.tags.join(";"),
                    book.page_count.to_string(),
                    book.current_page.to_string(),
                    book.rating.to_string(),
                    book.status.to_string(),
                    book.notes.clone(),
                    book.created_at.format("%Y-%m-%d").to_string(),
                    book.completed_at
                        .map(|t| t.format("%Y-%m-%d").to_string())
                        .unwrap_or_default(),
                ])?;
            }
            csv_wrt.flush()?;
        }
    }
    Ok(())
}
