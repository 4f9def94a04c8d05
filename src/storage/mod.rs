//! Storage layer - file I/O and page formats.
//!
//! - [`PageFile`] - page-addressed file with a header slot
//! - [`page`] - page and page header layouts

pub mod page;
mod page_file;

pub use page_file::{PageFile, PageFileHeader, PAGE_FILE_IDENTIFY};
