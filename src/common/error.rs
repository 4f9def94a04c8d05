//! Error types for MicroSQL.

use std::path::PathBuf;

use thiserror::Error;

use super::{PageNum, RecordId};

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the storage engine can report.
///
/// Lower layers never retry: an error is surfaced verbatim to the immediate
/// caller, which either maps it or aborts its compound operation.
#[derive(Debug, Error)]
pub enum Error {
    // --- I/O boundary ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// EOFFILE: page number is at or past the page count.
    #[error("{0} is past the end of the file")]
    EndOfFile(PageNum),

    /// INVALIDPAGE: page number addresses the file header.
    #[error("{0} is not a data page")]
    InvalidPage(PageNum),

    #[error("incomplete read of {page}: {read} of {expected} bytes")]
    IncompleteRead {
        page: PageNum,
        read: usize,
        expected: usize,
    },

    #[error("incomplete write of {page}")]
    IncompleteWrite { page: PageNum },

    #[error("file already exists: {}", .0.display())]
    FileExists(PathBuf),

    /// The page was disposed and its slot is no longer in use.
    #[error("{0} has been disposed")]
    PageFree(PageNum),

    #[error("checksum mismatch on {0}")]
    ChecksumMismatch(PageNum),

    // --- Cache consistency ---
    /// HASHNOTFOUND: the page is not in the buffer pool.
    #[error("{0} is not in the buffer pool")]
    PageNotCached(PageNum),

    /// PAGEINBUF: a freshly allocated page number was already cached.
    #[error("{0} is already in the buffer pool")]
    PageInBuffer(PageNum),

    #[error("{0} is not pinned")]
    PageNotPinned(PageNum),

    #[error("{0} is pinned")]
    PagePinned(PageNum),

    #[error("no free frames available in buffer pool")]
    NoFreeFrames,

    // --- Structural validity ---
    #[error("invalid page file: {0}")]
    InvalidPageFile(String),

    #[error("invalid record file: {0}")]
    InvalidRecordFile(String),

    #[error("invalid index: {0}")]
    InvalidIndex(String),

    // --- B+tree ---
    #[error("key not found")]
    KeyNotFound,

    #[error("node on {0} is full")]
    NodeKeysFull(PageNum),

    #[error("position {pos} out of range for {len} keys")]
    OutOfRange { pos: usize, len: usize },

    #[error("bad key: expected {expected} bytes, got {actual}")]
    BadKey { expected: usize, actual: usize },

    #[error("entry {0} already exists")]
    EntryExists(RecordId),

    // --- Record heap ---
    #[error("record {0} not found")]
    RecordNotFound(RecordId),

    #[error("bad record: {0}")]
    BadRecord(String),

    #[error("invalid record size: {0}")]
    InvalidRecordSize(usize),

    // --- Scans ---
    #[error("invalid scan: {0}")]
    InvalidScan(String),

    #[error("end of scan")]
    EndOfScan,
}

/// Coarse grouping of [`Error`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Cache,
    Structure,
    Tree,
    Record,
    Scan,
}

impl Error {
    /// Which layer the error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_)
            | Error::EndOfFile(_)
            | Error::InvalidPage(_)
            | Error::IncompleteRead { .. }
            | Error::IncompleteWrite { .. }
            | Error::FileExists(_)
            | Error::PageFree(_)
            | Error::ChecksumMismatch(_) => ErrorKind::Io,
            Error::PageNotCached(_)
            | Error::PageInBuffer(_)
            | Error::PageNotPinned(_)
            | Error::PagePinned(_)
            | Error::NoFreeFrames => ErrorKind::Cache,
            Error::InvalidPageFile(_) | Error::InvalidRecordFile(_) | Error::InvalidIndex(_) => {
                ErrorKind::Structure
            }
            Error::KeyNotFound
            | Error::NodeKeysFull(_)
            | Error::OutOfRange { .. }
            | Error::BadKey { .. }
            | Error::EntryExists(_) => ErrorKind::Tree,
            Error::RecordNotFound(_) | Error::BadRecord(_) | Error::InvalidRecordSize(_) => {
                ErrorKind::Record
            }
            Error::InvalidScan(_) | Error::EndOfScan => ErrorKind::Scan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::EndOfFile(PageNum::new(7));
        assert_eq!(format!("{}", err), "Page(7) is past the end of the file");

        let err = Error::NoFreeFrames;
        assert_eq!(format!("{}", err), "no free frames available in buffer pool");

        let err = Error::RecordNotFound(RecordId::new(PageNum::new(2), 3));
        assert_eq!(format!("{}", err), "record (2,3) not found");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_cache_errors_distinct_from_file_errors() {
        assert_eq!(Error::PageNotCached(PageNum::new(1)).kind(), ErrorKind::Cache);
        assert_eq!(Error::EndOfFile(PageNum::new(1)).kind(), ErrorKind::Io);
        assert_eq!(Error::InvalidPage(PageNum::new(0)).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::KeyNotFound.kind(), ErrorKind::Tree);
        assert_eq!(Error::BadRecord("x".into()).kind(), ErrorKind::Record);
        assert_eq!(Error::InvalidIndex("x".into()).kind(), ErrorKind::Structure);
        assert_eq!(Error::EndOfScan.kind(), ErrorKind::Scan);
    }
}
