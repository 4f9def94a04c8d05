//! Record heap.
//!
//! Fixed-size records stored in slotted pages on top of a
//! [`BufferManager`](crate::buffer::BufferManager).
//!
//! # Components
//! - [`Bitmap`] - Free-slot bit vector
//! - [`RecordFile`] - Insert, get, delete and update by [`RecordId`](crate::RecordId)
//! - [`RecordFileScan`] - Predicate scan in either direction
//! - [`RecordFileManager`] - File lifecycle

mod bitmap;
#[allow(clippy::module_inception)]
mod record;
mod record_file;
mod record_file_manager;
mod record_file_scan;
mod record_page;

pub use bitmap::Bitmap;
pub use record::Record;
pub use record_file::{RecordFile, FIRST_RECORD_PAGE, RECORD_HEADER_PAGE};
pub use record_file_manager::RecordFileManager;
pub use record_file_scan::{RecordFileScan, ScanDirection, ScanPredicate};
pub use record_page::{RecordFileHeader, RecordPageHeader, RECORD_FILE_IDENTIFY};
