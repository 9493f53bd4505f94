//! Builds the text that gets embedded for a book.
//!
//! Field order is fixed: title, author, description, genre, tags, notes.
//! Empty fields are skipped together with their label.

use crate::books::Book;

pub fn embedding_text(book: &Book) -> String {
    let mut text = format!("{} by {}", book.title.trim(), book.author.trim());

    let description = book.description.trim();
    if !description.is_empty() {
        text.push_str(". ");
        text.push_str(description);
    }

    let genre = book.genre.trim();
    if !genre.is_empty() {
        text.push_str(". Genre: ");
        text.push_str(genre);
    }

    let tags: Vec<&str> = book
        .tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if !tags.is_empty() {
        text.push_str(". Tags: ");
        text.push_str(&tags.join(", "));
    }

    let notes = book.notes.trim();
    if !notes.is_empty() {
        text.push_str(". Notes: ");
        text.push_str(notes);
    }

    text
}
