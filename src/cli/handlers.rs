use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::error::InquireResult;
use std::{io::BufWriter, path::Path, time::Duration};

use crate::{
    books::{Book, SearchResult, Status},
    errors::CatalogError,
    export::{export_books, ExportFormat},
    metadata::{normalize::is_valid_isbn, BookSource, Source, TrendingPeriod},
    parse_tags,
    semantic::similarity::limit_from_signed,
    service::CatalogService,
};

use super::BookArgs;

/// Pause between lookups in bulk imports.
const BULK_DELAY: Duration = Duration::from_millis(500);

fn parse_status(status: Option<&str>) -> Result<Option<Status>> {
    Ok(status
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<Status>)
        .transpose()?)
}

/// Overwrite every field given on the command line.
fn apply_args(book: &mut Book, args: BookArgs) -> Result<()> {
    if let Some(title) = args.title {
        book.title = title;
    }
    if let Some(author) = args.author {
        book.author = author;
    }
    if let Some(isbn) = args.isbn {
        book.isbn = Some(isbn);
    }
    if let Some(description) = args.description {
        book.description = description;
    }
    if let Some(genre) = args.genre {
        book.genre = genre;
    }
    if let Some(tags) = args.tags {
        book.tags = parse_tags(&tags);
    }
    if let Some(rating) = args.rating {
        book.rating = rating;
    }
    if let Some(status) = parse_status(args.status.as_deref())? {
        book.status = status;
    }
    if let Some(notes) = args.notes {
        book.notes = notes;
    }
    if let Some(pages) = args.pages {
        book.page_count = pages;
    }
    if let Some(page) = args.current_page {
        book.current_page = page;
    }
    Ok(())
}

fn print_book(book: &Book) {
    println!("#{} {} by {}", book.id, book.title, book.author);
    println!("  status: {}", book.status);
    if let Some(isbn) = &book.isbn {
        println!("  isbn: {isbn}");
    }
    if !book.genre.is_empty() {
        println!("  genre: {}", book.genre);
    }
    if !book.tags.is_empty() {
        println!("  tags: {}", book.tags.join(", "));
    }
    if book.rating > 0 {
        println!("  rating: {}/5", book.rating);
    }
    if book.page_count > 0 {
        println!(
            "  progress: {}/{} ({}%)",
            book.current_page,
            book.page_count,
            book.progress()
        );
    }
    if !book.description.is_empty() {
        println!("  description: {}", book.description);
    }
    if !book.notes.is_empty() {
        println!("  notes: {}", book.notes);
    }
    println!("  added: {}", book.created_at.format("%Y-%m-%d"));
    if let Some(completed) = book.completed_at {
        println!("  finished: {}", completed.format("%Y-%m-%d"));
    }
    if !book.has_embedding() {
        println!("  (no embedding, run `shelf reembed`)");
    }
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No matches.");
        return;
    }
    for (idx, result) in results.iter().enumerate() {
        println!(
            "{:>2}. [{:.3}] #{} {} by {}",
            idx + 1,
            result.similarity,
            result.book.id,
            result.book.title,
            result.book.author
        );
    }
}

/// Add `book`, asking before adding a duplicate unless `yes`.
///
/// Returns `None` when the user declined. A provider failure is reported
/// but not fatal: the book is stored without an embedding and returned.
fn add_with_confirm(svc: &CatalogService, book: Book, yes: bool) -> Result<Option<Book>> {
    let outcome = match svc.add(book.clone()) {
        Err(CatalogError::Duplicate { existing, reason }) => {
            if !yes {
                match inquire::prompt_confirmation(format!(
                    "\"{}\" matches #{} \"{}\" by {reason}. Add anyway?",
                    book.title, existing.id, existing.title
                )) {
                    InquireResult::Ok(true) => {}
                    InquireResult::Ok(false) => return Ok(None),
                    InquireResult::Err(err) => return Err(err.into()),
                }
            }
            svc.add_unchecked(book.clone())
        }
        other => other,
    };

    match outcome {
        Ok(added) => Ok(Some(added)),
        Err(CatalogError::Provider(err)) => {
            eprintln!("added without embedding: {err}");
            // the newest match is the record just written
            Ok(svc.check_duplicate(&book)?.map(|found| found.existing))
        }
        Err(err) => Err(err.into()),
    }
}

pub fn handle_add(svc: &CatalogService, args: BookArgs, force: bool) -> Result<()> {
    let mut book = Book::default();
    apply_args(&mut book, args)?;

    let added = if force {
        svc.add_unchecked(book)?
    } else {
        svc.add(book)?
    };
    println!("Added #{} {} by {}", added.id, added.title, added.author);
    Ok(())
}

pub fn handle_list(svc: &CatalogService, status: Option<String>, json: bool) -> Result<()> {
    let books = match parse_status(status.as_deref())? {
        Some(status) => svc.list_by_status(status)?,
        None => svc.list()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&books)?);
        return Ok(());
    }

    if books.is_empty() {
        println!("No books yet.");
        return Ok(());
    }
    for book in &books {
        let rating = if book.rating > 0 {
            format!(" {}/5", book.rating)
        } else {
            String::new()
        };
        println!(
            "#{:<4} {:<13} {} by {}{rating}",
            book.id,
            book.status.as_str(),
            book.title,
            book.author
        );
    }
    println!("\n{} books", books.len());
    Ok(())
}

pub fn handle_show(svc: &CatalogService, id: i64) -> Result<()> {
    print_book(&svc.get(id)?);
    Ok(())
}

pub fn handle_update(svc: &CatalogService, id: i64, args: BookArgs) -> Result<()> {
    let mut book = svc.get(id)?;
    apply_args(&mut book, args)?;
    let book = svc.update(book)?;
    println!("Updated #{} {}", book.id, book.title);
    Ok(())
}

pub fn handle_delete(svc: &CatalogService, id: i64, yes: bool) -> Result<()> {
    let book = svc.get(id)?;
    if !yes {
        match inquire::prompt_confirmation(format!(
            "Delete #{} \"{}\" by {}?",
            book.id, book.title, book.author
        )) {
            InquireResult::Ok(true) => {}
            InquireResult::Ok(false) => return Ok(()),
            InquireResult::Err(err) => return Err(err.into()),
        }
    }
    svc.delete(id)?;
    println!("Deleted #{id}");
    Ok(())
}

pub fn handle_search(svc: &CatalogService, query: &str, limit: usize) -> Result<()> {
    if query.trim().is_empty() {
        bail!("search query is empty");
    }
    print_results(&svc.search(query, limit)?);
    Ok(())
}

pub fn handle_similar(svc: &CatalogService, id: i64, limit: usize) -> Result<()> {
    let seed = svc.get(id)?;
    println!("Books similar to {} by {}:", seed.title, seed.author);
    print_results(&svc.find_similar(id, limit)?);
    Ok(())
}

pub fn resolve_limit(requested: Option<i64>, default_limit: usize) -> usize {
    requested.map_or(default_limit, limit_from_signed)
}

pub fn handle_import(
    svc: &CatalogService,
    source: &Source,
    isbns: Vec<String>,
    status: Option<String>,
    yes: bool,
) -> Result<()> {
    let status = parse_status(status.as_deref())?;

    for isbn in isbns {
        svc.cancellation().check()?;

        let Some(mut book) = source.lookup_isbn(&isbn)? else {
            println!("{isbn}: not found on {}", source.name());
            continue;
        };
        if let Some(status) = status {
            book.status = status;
        }

        println!("{isbn}: found {} by {}", book.title, book.author);
        if let Some(added) = add_with_confirm(svc, book, yes)? {
            println!("  added as #{}", added.id);
        }
    }
    Ok(())
}

pub fn handle_bulk_import(
    svc: &CatalogService,
    source: &Source,
    file: &Path,
    status: Option<String>,
) -> Result<()> {
    let status = parse_status(status.as_deref())?;
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("couldn't read {}", file.display()))?;

    let isbns: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();

    let pb = ProgressBar::new(isbns.len() as u64);
    pb.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);

    let (mut imported, mut failed) = (0usize, 0usize);
    for (idx, isbn) in isbns.iter().enumerate() {
        if svc.cancellation().is_cancelled() {
            pb.println("cancelled");
            break;
        }
        if idx > 0 {
            std::thread::sleep(BULK_DELAY);
        }
        pb.set_message(isbn.to_string());

        if !is_valid_isbn(isbn) {
            pb.println(format!("{isbn}: not an ISBN, skipping"));
            failed += 1;
            pb.inc(1);
            continue;
        }

        let lookup = match source.lookup_isbn(isbn) {
            Err(err) if err.is_retryable() => {
                pb.println(format!("{isbn}: {err}, retrying"));
                std::thread::sleep(BULK_DELAY * 2);
                source.lookup_isbn(isbn)
            }
            other => other,
        };

        let outcome = lookup.map_err(anyhow::Error::from).and_then(|found| {
            let Some(mut book) = found else {
                bail!("not found on {}", source.name());
            };
            if let Some(status) = status {
                book.status = status;
            }
            Ok(svc.add(book)?)
        });

        match outcome {
            Ok(book) => {
                pb.println(format!("{isbn}: added #{} {}", book.id, book.title));
                imported += 1;
            }
            Err(err) => {
                pb.println(format!("{isbn}: {err}"));
                failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!("Imported: {imported}, failed: {failed}");
    Ok(())
}

/// How books found on a source reach the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pick {
    /// Only the first result, no questions.
    First,
    /// Every result; duplicates are skipped.
    All,
    Ask,
}

/// Put some of `found` into the catalog. Returns how many were added.
fn pick_and_add(svc: &CatalogService, source: &str, found: Vec<Book>, pick: Pick) -> Result<usize> {
    if found.is_empty() {
        println!("Nothing found on {source}.");
        return Ok(0);
    }

    let picked: Vec<Book> = match pick {
        Pick::First => found.into_iter().take(1).collect(),
        Pick::All => return add_every(svc, found),
        Pick::Ask => {
            let mut labels = Vec::with_capacity(found.len());
            for b in &found {
                let mut label = match &b.isbn {
                    Some(isbn) => format!("{} by {} ({isbn})", b.title, b.author),
                    None => format!("{} by {}", b.title, b.author),
                };
                if let Some(dup) = svc.check_duplicate(b)? {
                    label.push_str(&format!(" [in catalog as #{}]", dup.existing.id));
                }
                labels.push(label);
            }

            let chosen = inquire::MultiSelect::new("Pick books to add", labels).raw_prompt()?;
            let mut found: Vec<Option<Book>> = found.into_iter().map(Some).collect();
            chosen
                .into_iter()
                .filter_map(|option| found.get_mut(option.index).and_then(Option::take))
                .collect()
        }
    };

    let mut added = 0;
    for book in picked {
        svc.cancellation().check()?;
        if let Some(book) = add_with_confirm(svc, book, false)? {
            println!("Added #{} {} by {}", book.id, book.title, book.author);
            added += 1;
        }
    }
    Ok(added)
}

fn add_every(svc: &CatalogService, found: Vec<Book>) -> Result<usize> {
    for (idx, book) in found.iter().enumerate() {
        println!("[{}] {} by {}", idx + 1, book.title, book.author);
    }

    let pb = ProgressBar::new(found.len() as u64);
    pb.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);

    let (mut added, mut skipped, mut failed) = (0usize, 0usize, 0usize);
    for book in found {
        if svc.cancellation().is_cancelled() {
            pb.println("cancelled");
            break;
        }
        pb.set_message(book.title.clone());

        let title = book.title.clone();
        match svc.add(book) {
            Ok(_) => added += 1,
            Err(CatalogError::Duplicate { existing, .. }) => {
                pb.println(format!("{title}: already in catalog as #{}", existing.id));
                skipped += 1;
            }
            Err(CatalogError::Provider(err)) => {
                pb.println(format!("{title}: added without embedding: {err}"));
                added += 1;
            }
            Err(err) => {
                pb.println(format!("{title}: {err}"));
                failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!("Added: {added}, skipped: {skipped}, failed: {failed}");
    Ok(added)
}

pub fn handle_discover(
    svc: &CatalogService,
    source: &Source,
    query: &str,
    limit: usize,
    auto: bool,
) -> Result<()> {
    let found = source.search(query, limit)?;
    let pick = if auto { Pick::First } else { Pick::Ask };
    pick_and_add(svc, source.name(), found, pick)?;
    Ok(())
}

fn scrape_pick(add_all: bool) -> Pick {
    if add_all {
        Pick::All
    } else {
        Pick::Ask
    }
}

pub fn handle_scrape_author(
    svc: &CatalogService,
    source: &Source,
    author: &str,
    limit: usize,
    add_all: bool,
) -> Result<()> {
    if author.trim().is_empty() {
        bail!("author is empty");
    }
    let found = source.search_by_author(author, limit)?;
    println!("Found {} books by {author} on {}", found.len(), source.name());
    pick_and_add(svc, source.name(), found, scrape_pick(add_all))?;
    Ok(())
}

pub fn handle_scrape_subject(
    svc: &CatalogService,
    source: &Source,
    subject: &str,
    limit: usize,
    add_all: bool,
) -> Result<()> {
    if subject.trim().is_empty() {
        bail!("subject is empty");
    }
    let found = source.search_by_subject(subject, limit)?;
    println!("Found {} {subject} books on {}", found.len(), source.name());
    pick_and_add(svc, source.name(), found, scrape_pick(add_all))?;
    Ok(())
}

pub fn handle_scrape_trending(
    svc: &CatalogService,
    source: &Source,
    period: &str,
    limit: usize,
    add_all: bool,
) -> Result<()> {
    let period: TrendingPeriod = period.parse()?;
    let found = source.trending(period, limit)?;
    println!("Found {} trending books ({period}) on {}", found.len(), source.name());
    pick_and_add(svc, source.name(), found, scrape_pick(add_all))?;
    Ok(())
}

pub fn handle_reembed(svc: &CatalogService, all: bool) -> Result<()> {
    let total = svc.list()?.len();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")?);

    let report = svc.reembed(!all, |book, outcome| {
        pb.set_message(book.title.clone());
        if let Err(err) = outcome {
            pb.println(format!("#{} {}: {err}", book.id, book.title));
        }
        pb.inc(1);
    });
    pb.finish_and_clear();

    let report = report?;
    println!(
        "Embedded: {}, failed: {}, already embedded: {} (model {})",
        report.embedded,
        report.failed,
        report.skipped,
        svc.provider().model()
    );
    Ok(())
}

pub fn handle_export(svc: &CatalogService, format: &str, output: Option<&Path>) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let books = svc.list()?;

    match output {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("couldn't create {}", path.display()))?;
            export_books(&books, format, BufWriter::new(file))?;
            println!("Exported {} books to {}", books.len(), path.display());
        }
        None => export_books(&books, format, std::io::stdout().lock())?,
    }
    Ok(())
}

pub fn handle_stats(svc: &CatalogService) -> Result<()> {
    let stats = svc.stats()?;
    println!("Books: {}", stats.total);
    println!("  want to read: {}", stats.want_to_read);
    println!("  reading:      {}", stats.reading);
    println!("  read:         {}", stats.read);
    println!("Embedded: {}/{}", stats.embedded, stats.total);
    match stats.average_rating {
        Some(avg) => println!("Average rating: {avg:.1} over {} rated", stats.rated),
        None => println!("No ratings yet"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::fresh_service;

    #[test]
    fn test_provider_failure_still_returns_stored_book() {
        let (svc, embedder) = fresh_service();
        embedder.set_failing(true);

        let added = add_with_confirm(&svc, Book::new("Dune", "Frank Herbert"), true)
            .unwrap()
            .unwrap();
        assert_eq!(added.id, 1);
        assert!(!added.has_embedding());

        let forced = add_with_confirm(&svc, Book::new("Dune", "Frank Herbert"), true)
            .unwrap()
            .unwrap();
        assert_eq!(forced.id, 2);
        assert_eq!(svc.list().unwrap().len(), 2);
    }

    #[test]
    fn test_confirmed_duplicate_is_added() {
        let (svc, _) = fresh_service();
        add_with_confirm(&svc, Book::new("Dune", "Frank Herbert"), true).unwrap();

        let again = add_with_confirm(&svc, Book::new("dune", "frank herbert"), true)
            .unwrap()
            .unwrap();
        assert_eq!(again.id, 2);
        assert!(again.has_embedding());
    }

    #[test]
    fn test_add_all_skips_duplicates() {
        let (svc, _) = fresh_service();
        svc.add(Book::new("Dune", "Frank Herbert")).unwrap();

        let found = vec![
            Book::new("DUNE", "frank herbert"),
            Book::new("Foundation", "Isaac Asimov"),
            Book::new("Solaris", "Stanislaw Lem"),
        ];
        assert_eq!(pick_and_add(&svc, "test", found, Pick::All).unwrap(), 2);
        assert_eq!(svc.list().unwrap().len(), 3);

        assert_eq!(pick_and_add(&svc, "test", vec![], Pick::All).unwrap(), 0);
    }

    #[test]
    fn test_first_pick_adds_one() {
        let (svc, _) = fresh_service();
        let found = vec![
            Book::new("Foundation", "Isaac Asimov"),
            Book::new("Solaris", "Stanislaw Lem"),
        ];
        assert_eq!(pick_and_add(&svc, "test", found, Pick::First).unwrap(), 1);

        let books = svc.list().unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Foundation");
    }
}
