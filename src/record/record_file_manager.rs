//! Record file lifecycle: create, open, close, destroy.

use std::path::Path;

use log::debug;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::storage::PageFile;

use super::record_page::RecordPageHeader;
use super::RecordFile;

/// Creates and opens record files under a [`Config`]'s data directory.
///
/// Relative names resolve against `config.data_dir`; absolute paths are
/// used as given.
#[derive(Debug, Clone)]
pub struct RecordFileManager {
    config: Config,
}

impl RecordFileManager {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create an empty record file holding `record_size`-byte records.
    ///
    /// # Errors
    /// - `Error::InvalidRecordSize` if no record of that size fits a page
    /// - `Error::FileExists` if the file already exists
    pub fn create_file<P: AsRef<Path>>(&self, name: P, record_size: usize) -> Result<()> {
        if RecordPageHeader::slot_count_for(record_size) == 0 {
            return Err(Error::InvalidRecordSize(record_size));
        }
        let path = self.config.resolve(name);
        let page_file = PageFile::create(&path)?;
        RecordFile::create(page_file, record_size, &self.config)?.close()?;

        debug!("created record file {}", path.display());
        Ok(())
    }

    /// Remove a record file from disk.
    pub fn destroy_file<P: AsRef<Path>>(&self, name: P) -> Result<()> {
        PageFile::destroy(self.config.resolve(name))
    }

    /// Open an existing record file.
    ///
    /// # Errors
    /// `Error::InvalidRecordFile` if the file was not created by
    /// [`create_file`](Self::create_file).
    pub fn open_file<P: AsRef<Path>>(&self, name: P) -> Result<RecordFile> {
        let path = self.config.resolve(name);
        let page_file = PageFile::open(&path)?;
        let file = RecordFile::open(page_file, &self.config)?;

        debug!(
            "opened record file {}: {} pages of {} x {} bytes",
            path.display(),
            file.num_pages(),
            file.records_per_page(),
            file.record_size()
        );
        Ok(file)
    }

    /// Flush and close a record file.
    pub fn close_file(&self, file: RecordFile) -> Result<()> {
        file.close()
    }
}
