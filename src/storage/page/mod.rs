//! Page types and layout.
//!
//! - [`Page`] - header plus the 4KB data region
//! - [`PageHeader`] - metadata in front of every page slot
//! - identify string helpers shared by all file headers

#[allow(clippy::module_inception)]
mod page;
mod page_header;

pub use page::Page;
pub use page_header::{encode_identify, matches_identify, PageHeader, PAGE_IDENTIFY};
