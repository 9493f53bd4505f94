use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod books;
mod cancel;
mod catalog;
mod cli;
mod config;
mod duplicates;
mod errors;
mod export;
mod metadata;
mod semantic;
mod service;
#[cfg(test)]
mod tests;
mod web;

use cancel::Cancellation;
use catalog::{BackendCsv, BackendSqlite, CatalogStore};
use cli::Command;
use config::{Config, MetadataSourceKind, StorageBackend};
use semantic::{embeddings, EmbeddingProvider};
use service::CatalogService;

/// Split a comma separated tag list, dropping blanks.
pub fn parse_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

/// Directory holding the config and the default catalog files.
pub fn base_path() -> PathBuf {
    if let Ok(path) = std::env::var("SHELF_BASE_PATH") {
        return PathBuf::from(path);
    }
    match homedir::my_home() {
        Ok(Some(home)) => home.join(".local/share/shelf"),
        _ => {
            log::warn!("couldn't find home dir, using ./.shelf");
            PathBuf::from(".shelf")
        }
    }
}

fn open_store(config: &Config) -> anyhow::Result<Arc<dyn CatalogStore>> {
    let path = config.catalog_path();
    log::debug!("catalog at {}", path.display());
    Ok(match config.storage.backend {
        StorageBackend::Sqlite => Arc::new(BackendSqlite::open(&path)?),
        StorageBackend::Csv => Arc::new(BackendCsv::load(&path)?),
    })
}

fn open_source(config: &Config, source: Option<String>) -> anyhow::Result<metadata::Source> {
    let kind = source
        .as_deref()
        .map(str::parse::<MetadataSourceKind>)
        .transpose()?;
    Ok(metadata::from_config(&config.metadata, kind)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    let config = Config::load()?;

    let store = open_store(&config)?;
    let provider: Arc<dyn EmbeddingProvider> =
        Arc::from(embeddings::from_config(&config.embedding)?);

    let cancel = Cancellation::new();
    let service = Arc::new(CatalogService::new(store, provider).with_cancellation(cancel.clone()));
    let default_limit = config.search.default_limit;

    if !matches!(args.command, Command::Daemon { .. }) {
        ctrlc::set_handler({
            let cancel = cancel.clone();
            move || {
                if cancel.is_cancelled() {
                    std::process::exit(130);
                }
                log::warn!("cancelling, press Ctrl+C again to quit immediately");
                cancel.cancel();
            }
        })?;
    }

    match args.command {
        Command::Daemon { listen } => {
            let listen = listen.unwrap_or_else(|| config.web.listen.clone());
            web::start_daemon(service.clone(), &listen, default_limit)?;
        }
        Command::Add { book, force } => cli::handle_add(&service, book, force)?,
        Command::List { status, json } => cli::handle_list(&service, status, json)?,
        Command::Show { id } => cli::handle_show(&service, id)?,
        Command::Update { id, book } => cli::handle_update(&service, id, book)?,
        Command::Delete { id, yes } => cli::handle_delete(&service, id, yes)?,
        Command::Search { query, limit } => {
            cli::handle_search(&service, &query, cli::resolve_limit(limit, default_limit))?
        }
        Command::Similar { id, limit } => {
            cli::handle_similar(&service, id, cli::resolve_limit(limit, default_limit))?
        }
        Command::Import {
            isbns,
            source,
            status,
            yes,
        } => {
            let source = open_source(&config, source)?;
            cli::handle_import(&service, &source, isbns, status, yes)?
        }
        Command::BulkImport {
            file,
            source,
            status,
        } => {
            let source = open_source(&config, source)?;
            cli::handle_bulk_import(&service, &source, &file, status)?
        }
        Command::Discover {
            query,
            source,
            limit,
            auto,
        } => {
            let source = open_source(&config, source)?;
            cli::handle_discover(&service, &source, &query, limit, auto)?
        }
        Command::ScrapeAuthor {
            author,
            source,
            limit,
            add_all,
        } => {
            let source = open_source(&config, source)?;
            cli::handle_scrape_author(&service, &source, &author, limit, add_all)?
        }
        Command::ScrapeSubject {
            subject,
            source,
            limit,
            add_all,
        } => {
            let source = open_source(&config, source)?;
            cli::handle_scrape_subject(&service, &source, &subject, limit, add_all)?
        }
        Command::ScrapeTrending {
            period,
            source,
            limit,
            add_all,
        } => {
            let source = open_source(&config, source)?;
            cli::handle_scrape_trending(&service, &source, &period, limit, add_all)?
        }
        Command::Reembed { all } => cli::handle_reembed(&service, all)?,
        Command::Export { format, output } => {
            cli::handle_export(&service, &format, output.as_deref())?
        }
        Command::Stats {} => cli::handle_stats(&service)?,
    }

    Ok(())
}
