use clap::{Args as ClapArgs, Parser, Subcommand};

mod handlers;

pub use handlers::*;

#[derive(Parser, Debug)]
#[command(version, about = "Semantic book catalog", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct BookArgs {
    /// Book title
    #[clap(short, long)]
    pub title: Option<String>,

    /// Book author
    #[clap(short, long)]
    pub author: Option<String>,

    #[clap(long)]
    pub isbn: Option<String>,

    /// Book description
    #[clap(short, long)]
    pub description: Option<String>,

    #[clap(short, long)]
    pub genre: Option<String>,

    /// Comma separated tags
    #[clap(long, allow_hyphen_values = true)]
    pub tags: Option<String>,

    /// Your rating (1-5)
    #[clap(short, long)]
    pub rating: Option<u8>,

    /// want_to_read, reading or read
    #[clap(short, long)]
    pub status: Option<String>,

    /// Your personal notes
    #[clap(short, long)]
    pub notes: Option<String>,

    /// Total pages
    #[clap(long)]
    pub pages: Option<u32>,

    /// Page you are on
    #[clap(long)]
    pub current_page: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP API.
    Daemon {
        /// Address to listen on, overrides web.listen
        #[clap(short, long)]
        listen: Option<String>,
    },

    /// Add a book to the catalog
    Add {
        #[command(flatten)]
        book: BookArgs,

        /// Add even if the catalog already holds the book
        #[clap(short, long, default_value = "false")]
        force: bool,
    },

    /// List books, newest first
    List {
        /// Only books with this status
        #[clap(short, long)]
        status: Option<String>,

        /// Print json instead of a table
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// Show one book
    Show { id: i64 },

    /// Change fields of a book
    Update {
        id: i64,

        #[command(flatten)]
        book: BookArgs,
    },

    /// Delete a book
    Delete {
        id: i64,

        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },

    /// Semantic search over the catalog
    Search {
        query: String,

        /// Max results, 0 for all
        #[clap(short, long)]
        limit: Option<i64>,
    },

    /// Books similar to a given book
    Similar {
        id: i64,

        /// Max results, 0 for all
        #[clap(short, long)]
        limit: Option<i64>,
    },

    /// Import books by ISBN
    Import {
        #[clap(required = true)]
        isbns: Vec<String>,

        /// openlibrary or google, overrides metadata.source
        #[clap(long)]
        source: Option<String>,

        /// Status for imported books
        #[clap(short, long)]
        status: Option<String>,

        /// Add duplicates without asking
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },

    /// Import ISBNs from a file, one per line. Lines starting with # are skipped.
    BulkImport {
        file: std::path::PathBuf,

        /// openlibrary or google, overrides metadata.source
        #[clap(long)]
        source: Option<String>,

        /// Status for imported books
        #[clap(short, long)]
        status: Option<String>,
    },

    /// Search a metadata source and pick books to add
    Discover {
        query: String,

        /// openlibrary or google, overrides metadata.source
        #[clap(long)]
        source: Option<String>,

        /// Max results to show
        #[clap(short, long, default_value = "10")]
        limit: usize,

        /// Add the first result without asking
        #[clap(long, default_value = "false")]
        auto: bool,
    },

    /// List books by an author on a metadata source and pick some to add
    ScrapeAuthor {
        author: String,

        /// openlibrary or google, overrides metadata.source
        #[clap(long)]
        source: Option<String>,

        /// Max results
        #[clap(short, long, default_value = "50")]
        limit: usize,

        /// Add every result without asking, skipping duplicates
        #[clap(long, default_value = "false")]
        add_all: bool,
    },

    /// List books on a subject and pick some to add
    ScrapeSubject {
        subject: String,

        /// openlibrary or google, overrides metadata.source
        #[clap(long)]
        source: Option<String>,

        /// Max results
        #[clap(short, long, default_value = "50")]
        limit: usize,

        /// Add every result without asking, skipping duplicates
        #[clap(long, default_value = "false")]
        add_all: bool,
    },

    /// List trending books and pick some to add. Google lists its newest fiction instead.
    ScrapeTrending {
        /// now, daily, weekly, monthly, yearly or forever
        #[clap(short, long, default_value = "weekly")]
        period: String,

        /// openlibrary or google, overrides metadata.source
        #[clap(long)]
        source: Option<String>,

        /// Max results
        #[clap(short, long, default_value = "20")]
        limit: usize,

        /// Add every result without asking, skipping duplicates
        #[clap(long, default_value = "false")]
        add_all: bool,
    },

    /// Regenerate embeddings
    Reembed {
        /// Also replace existing embeddings
        #[clap(long, default_value = "false")]
        all: bool,
    },

    /// Export the catalog
    Export {
        /// json or csv
        #[clap(short, long, default_value = "json")]
        format: String,

        /// Output file, stdout when omitted
        #[clap(short, long)]
        output: Option<std::path::PathBuf>,
    },

    /// Reading statistics
    Stats {},
}
