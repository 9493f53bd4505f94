mod catalog;
mod retrieval;
pub(crate) mod support;
