//! Configuration for MicroSQL.
//!
//! Page geometry is fixed at compile time. Runtime settings (data directory,
//! buffer pool size) are carried by [`Config`] and handed to the managers
//! that need it.

use std::path::{Path, PathBuf};

/// Size of the data region of a page in bytes (4KB).
///
/// Every on-disk page is `PAGE_SIZE` bytes of data preceded by a
/// [`PAGE_HEADER_SIZE`]-byte header, see [`PAGE_SIZE_ACTUAL`].
pub const PAGE_SIZE: usize = 4096;

/// Length of the identify strings stamped into file and page headers.
pub const IDENTIFY_LEN: usize = 32;

/// Size of the per-page header written in front of every data region.
///
/// # Layout
/// ```text
/// identify[32] | page_num u64 | is_used u8 | pad[3] | checksum u32
/// ```
pub const PAGE_HEADER_SIZE: usize = IDENTIFY_LEN + 8 + 1 + 3 + 4;

/// Bytes occupied by one page slot in a page file (header + data).
pub const PAGE_SIZE_ACTUAL: usize = PAGE_SIZE + PAGE_HEADER_SIZE;

/// Default number of frames in a buffer pool.
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 40;

/// Longest STRING attribute an index accepts.
pub const MAX_STRING_LEN: usize = 255;

/// Runtime configuration shared by the file managers.
///
/// # Example
/// ```
/// use microsql::Config;
///
/// let config = Config::default().with_buffer_pool_size(8);
/// assert_eq!(config.buffer_pool_size, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory against which relative file names are resolved.
    pub data_dir: PathBuf,
    /// Frames per open file's buffer pool.
    pub buffer_pool_size: usize,
}

impl Config {
    /// Create a config rooted at `data_dir` with default pool sizing.
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            buffer_pool_size: DEFAULT_BUFFER_POOL_SIZE,
        }
    }

    pub fn with_buffer_pool_size(mut self, buffer_pool_size: usize) -> Self {
        self.buffer_pool_size = buffer_pool_size;
        self
    }

    pub fn with_data_dir<P: Into<PathBuf>>(mut self, data_dir: P) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Resolve a file name against the data directory.
    ///
    /// Absolute paths are returned unchanged.
    pub fn resolve<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        let name = name.as_ref();
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.data_dir.join(name)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(".")
    }
}
