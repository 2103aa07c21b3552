//! Corpus source adapters.

mod fs;
mod xml;

pub use fs::{FsCorpus, FsCorpusSource};
pub use xml::extract_document;
