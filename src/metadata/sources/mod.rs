mod googlebooks;
mod openlibrary;

pub use googlebooks::GoogleBooks;
pub use openlibrary::OpenLibrary;
