//! Index file lifecycle: create, open, close, destroy.

use std::path::PathBuf;

use log::debug;

use crate::common::config::{Config, MAX_STRING_LEN};
use crate::common::{AttrType, Error, Result};
use crate::storage::PageFile;

use super::index_header::IndexHeader;
use super::node::{max_keys_for, MIN_ORDER};
use super::IndexHandle;

/// Creates and opens B+tree indexes under a [`Config`]'s data directory.
///
/// Index `index_no` on relation `name` lives in the file `"{name}.{index_no}"`.
#[derive(Debug, Clone)]
pub struct IndexManager {
    config: Config,
}

impl IndexManager {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// File name of index `index_no` on `name`.
    pub fn index_file_name(name: &str, index_no: u32) -> String {
        format!("{}.{}", name, index_no)
    }

    /// Create an empty index with the largest order a page allows.
    ///
    /// # Errors
    /// - `Error::InvalidIndex` if `attr_len` does not suit `attr_type`
    /// - `Error::FileExists` if the index already exists
    pub fn create_index(
        &self,
        name: &str,
        index_no: u32,
        attr_type: AttrType,
        attr_len: usize,
    ) -> Result<()> {
        check_attr(attr_type, attr_len)?;
        self.create_index_with_max_keys(name, index_no, attr_type, attr_len, max_keys_for(attr_len))
    }

    /// Create an empty index of order `max_keys`.
    ///
    /// # Errors
    /// `Error::InvalidIndex` if the attribute is invalid or `max_keys` is
    /// outside `MIN_ORDER..=max_keys_for(attr_len)`.
    pub fn create_index_with_max_keys(
        &self,
        name: &str,
        index_no: u32,
        attr_type: AttrType,
        attr_len: usize,
        max_keys: usize,
    ) -> Result<()> {
        check_attr(attr_type, attr_len)?;
        let limit = max_keys_for(attr_len);
        if !(MIN_ORDER..=limit).contains(&max_keys) {
            return Err(Error::InvalidIndex(format!(
                "order {} outside {}..={}",
                max_keys, MIN_ORDER, limit
            )));
        }

        let path = self.path_of(name, index_no);
        let page_file = PageFile::create(&path)?;
        IndexHandle::create(
            page_file,
            IndexHeader::new(attr_type, attr_len, max_keys),
            &self.config,
        )?;

        debug!(
            "created index {}: {} x {} bytes, order {}",
            path.display(),
            attr_type,
            attr_len,
            max_keys
        );
        Ok(())
    }

    /// Open an existing index.
    ///
    /// # Errors
    /// `Error::InvalidIndex` if the file is not an index.
    pub fn open_index(&self, name: &str, index_no: u32) -> Result<IndexHandle> {
        let path = self.path_of(name, index_no);
        let handle = IndexHandle::open(PageFile::open(&path)?, &self.config)?;
        debug!(
            "opened index {}: height {}, root {}",
            path.display(),
            handle.height(),
            handle.root_page()
        );
        Ok(handle)
    }

    /// Flush and close an index.
    pub fn close_index(&self, handle: IndexHandle) -> Result<()> {
        handle.close()
    }

    /// Remove an index file from disk.
    pub fn destroy_index(&self, name: &str, index_no: u32) -> Result<()> {
        PageFile::destroy(self.path_of(name, index_no))
    }

    fn path_of(&self, name: &str, index_no: u32) -> PathBuf {
        self.config.resolve(Self::index_file_name(name, index_no))
    }
}

fn check_attr(attr_type: AttrType, attr_len: usize) -> Result<()> {
    let ok = match attr_type.fixed_len() {
        Some(len) => attr_len == len,
        None => (1..=MAX_STRING_LEN).contains(&attr_len),
    };
    if !ok {
        return Err(Error::InvalidIndex(format!(
            "{} attribute cannot be {} bytes",
            attr_type, attr_len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_index_file_name() {
        assert_eq!(IndexManager::index_file_name("emp", 3), "emp.3");
    }

    #[test]
    fn test_attribute_validation() {
        let dir = tempdir().unwrap();
        let im = IndexManager::new(Config::new(dir.path()));

        assert!(matches!(
            im.create_index("r", 0, AttrType::Int, 8),
            Err(Error::InvalidIndex(_))
        ));
        assert!(matches!(
            im.create_index("r", 0, AttrType::String, 0),
            Err(Error::InvalidIndex(_))
        ));
        assert!(matches!(
            im.create_index("r", 0, AttrType::String, 256),
            Err(Error::InvalidIndex(_))
        ));
        assert!(matches!(
            im.create_index_with_max_keys("r", 0, AttrType::Int, 4, 4),
            Err(Error::InvalidIndex(_))
        ));
        assert!(!dir.path().join("r.0").exists());

        im.create_index("r", 0, AttrType::String, 255).unwrap();
    }

    #[test]
    fn test_open_close_reopen() {
        let dir = tempdir().unwrap();
        let im = IndexManager::new(Config::new(dir.path()));
        im.create_index("r", 1, AttrType::Float, 4).unwrap();

        let index = im.open_index("r", 1).unwrap();
        assert_eq!(index.height(), 1);
        assert_eq!(index.max_keys(), max_keys_for(4));
        let root = index.root_page();
        im.close_index(index).unwrap();

        let index = im.open_index("r", 1).unwrap();
        assert_eq!(index.root_page(), root);
        assert_eq!(index.num_pages(), 1);
    }

    #[test]
    fn test_open_record_file_as_index_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.0");
        PageFile::create(&path).unwrap().close().unwrap();

        let im = IndexManager::new(Config::new(dir.path()));
        assert!(matches!(im.open_index("r", 0), Err(Error::InvalidIndex(_))));
    }

    #[test]
    fn test_destroy() {
        let dir = tempdir().unwrap();
        let im = IndexManager::new(Config::new(dir.path()));
        im.create_index("r", 0, AttrType::Int, 4).unwrap();
        im.destroy_index("r", 0).unwrap();
        assert!(!dir.path().join("r.0").exists());
    }
}
