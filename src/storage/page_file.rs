//! Page file - page-addressed binary file with a header slot.
//!
//! The [`PageFile`] handles all direct file operations:
//! - Creating, opening and destroying files
//! - Reading, allocating, forcing and disposing pages
//! - Keeping the file header (page count, free-page pointer) current

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::common::config::PAGE_SIZE_ACTUAL;
use crate::common::{Error, PageNum, Result};
use crate::storage::page::{encode_identify, matches_identify, Page, PageHeader};

/// Identify string of the page file header.
pub const PAGE_FILE_IDENTIFY: &str = "MicroSQL PageFile";

/// Header stored in slot 0 of every page file.
///
/// # Layout (48 bytes, rest of the slot is zero)
/// ```text
/// Offset  Size  Field
/// 0       32    identify ("MicroSQL PageFile")
/// 32      8     page_count (u64, includes the header slot)
/// 40      8     first_free (u64, INVALID when empty)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFileHeader {
    pub page_count: u64,
    pub first_free: PageNum,
}

impl PageFileHeader {
    pub const SIZE: usize = 48;

    fn new() -> Self {
        Self {
            page_count: 1,
            first_free: PageNum::INVALID,
        }
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || !matches_identify(data, PAGE_FILE_IDENTIFY) {
            return Err(Error::InvalidPageFile("bad identify string".into()));
        }
        let page_count = PageNum::from_le_slice(&data[32..40]).0;
        let first_free = PageNum::from_le_slice(&data[40..48]);
        if page_count == 0 {
            return Err(Error::InvalidPageFile("page count is zero".into()));
        }
        Ok(Self {
            page_count,
            first_free,
        })
    }

    fn write_to(&self, data: &mut [u8]) {
        data[..32].copy_from_slice(&encode_identify(PAGE_FILE_IDENTIFY));
        data[32..40].copy_from_slice(&self.page_count.to_le_bytes());
        data[40..48].copy_from_slice(&self.first_free.to_le_bytes());
    }
}

/// Maps page numbers to byte offsets in one file.
///
/// # File Layout
/// ```text
/// ┌──────────┬──────────┬──────────┬─────────┬──────────┐
/// │ Header   │ Page 1   │ Page 2   │  ...    │ Page N   │
/// │ (slot 0) │ hdr+4KB  │ hdr+4KB  │         │ hdr+4KB  │
/// └──────────┴──────────┴──────────┴─────────┴──────────┘
/// Offset:  0    4144       8288      ...     N×4144
/// ```
///
/// Page N lives at offset `N × PAGE_SIZE_ACTUAL`.
///
/// # File handles
/// No descriptor is held between calls: every operation opens the file,
/// does its I/O and drops the handle before returning. Long-lived record
/// and index handles therefore never pin descriptors.
///
/// # Durability
/// Page writes are not fsynced individually; [`sync`](Self::sync) and
/// [`close`](Self::close) flush the file to disk.
pub struct PageFile {
    path: PathBuf,
    header: PageFileHeader,
    /// Header changed since it was last written.
    header_dirty: bool,
}

impl PageFile {
    /// Create a new page file containing only the header slot.
    ///
    /// # Errors
    /// Returns `Error::FileExists` if the path already exists.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => Error::FileExists(path.to_path_buf()),
                _ => Error::Io(e),
            })?;

        let header = PageFileHeader::new();
        let mut slot = vec![0u8; PAGE_SIZE_ACTUAL];
        header.write_to(&mut slot);
        file.write_all(&slot)?;
        file.sync_all()?;

        debug!("created page file {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            header,
            header_dirty: false,
        })
    }

    /// Open an existing page file.
    ///
    /// # Errors
    /// - `Error::Io` if the file doesn't exist or cannot be read
    /// - `Error::InvalidPageFile` if the header slot is not a page file header
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).open(path)?;

        let mut raw = [0u8; PageFileHeader::SIZE];
        let read = read_full(&mut file, &mut raw)?;
        if read < PageFileHeader::SIZE {
            return Err(Error::InvalidPageFile("file too short".into()));
        }
        let mut header = PageFileHeader::from_bytes(&raw)?;

        // A crash between allocate and close leaves the stored count behind.
        let slots_on_disk = file.metadata()?.len() / PAGE_SIZE_ACTUAL as u64;
        if slots_on_disk > header.page_count {
            warn!(
                "{}: header records {} pages but file holds {}, adopting the larger count",
                path.display(),
                header.page_count,
                slots_on_disk
            );
            header.page_count = slots_on_disk;
        }

        debug!(
            "opened page file {} with {} pages",
            path.display(),
            header.page_count
        );
        Ok(Self {
            path: path.to_path_buf(),
            header,
            header_dirty: false,
        })
    }

    /// Remove a page file from disk.
    pub fn destroy<P: AsRef<Path>>(path: P) -> Result<()> {
        fs::remove_file(path.as_ref())?;
        debug!("destroyed page file {}", path.as_ref().display());
        Ok(())
    }

    /// Read page `page_num` into a new [`Page`].
    ///
    /// A short read is reported with a warning and the missing tail is
    /// treated as zeros.
    ///
    /// # Errors
    /// - `Error::EndOfFile` if `page_num >= page_count`
    /// - `Error::InvalidPage` if `page_num` is the header slot
    /// - `Error::ChecksumMismatch` if the stored image is corrupt
    /// - `Error::PageFree` if the page has been disposed
    pub fn get_this_page(&self, page_num: PageNum) -> Result<Page> {
        self.check_bounds(page_num)?;

        let mut file = self.open_stream()?;
        file.seek(SeekFrom::Start(page_num.offset(PAGE_SIZE_ACTUAL)))?;

        let mut image = vec![0u8; PAGE_SIZE_ACTUAL];
        let read = read_full(&mut file, &mut image)?;

        if read < PAGE_SIZE_ACTUAL {
            warn!(
                "{}",
                Error::IncompleteRead {
                    page: page_num,
                    read,
                    expected: PAGE_SIZE_ACTUAL,
                }
            );
            if read < PageHeader::SIZE {
                return Ok(Page::with_page_num(page_num));
            }
            let page = Page::from_image(&image);
            return if page.is_used() {
                Ok(page)
            } else {
                Err(Error::PageFree(page_num))
            };
        }

        if !Page::verify_image(&image) {
            return Err(Error::ChecksumMismatch(page_num));
        }
        let page = Page::from_image(&image);
        if !page.header().identified || page.page_num() != page_num {
            return Err(Error::InvalidPageFile(format!(
                "slot {} does not hold {}",
                page_num.0, page_num
            )));
        }
        if !page.is_used() {
            return Err(Error::PageFree(page_num));
        }
        Ok(page)
    }

    /// Append a new zero-filled page and write it immediately.
    ///
    /// Page numbers grow monotonically; this layer never reuses pages.
    pub fn allocate_page(&mut self) -> Result<Page> {
        let page_num = PageNum::new(self.header.page_count);
        let page = Page::with_page_num(page_num);

        self.write_page_image(page_num, &page)?;
        self.header.page_count += 1;
        self.header_dirty = true;

        debug!("{}: allocated {}", self.path.display(), page_num);
        Ok(page)
    }

    /// Overwrite page `page_num` with `page`, unconditionally.
    ///
    /// # Errors
    /// Same bounds errors as [`get_this_page`](Self::get_this_page).
    pub fn force_page(&self, page_num: PageNum, page: &Page) -> Result<()> {
        self.check_bounds(page_num)?;
        debug_assert_eq!(page.page_num(), page_num, "forcing page under wrong number");
        self.write_page_image(page_num, page)
    }

    /// Clear the in-use flag of page `page_num`.
    ///
    /// The file does not shrink and the slot is not reclaimed.
    pub fn dispose_page(&mut self, page_num: PageNum) -> Result<()> {
        let mut page = self.get_this_page(page_num)?;
        page.set_used(false);
        self.write_page_image(page_num, &page)?;

        debug!("{}: disposed {}", self.path.display(), page_num);
        Ok(())
    }

    /// Write the header slot if it changed.
    pub fn flush_header(&mut self) -> Result<()> {
        if !self.header_dirty {
            return Ok(());
        }
        let mut raw = [0u8; PageFileHeader::SIZE];
        self.header.write_to(&mut raw);

        let mut file = self.open_stream()?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&raw)?;
        self.header_dirty = false;
        Ok(())
    }

    /// Flush file contents and metadata to disk.
    pub fn sync(&self) -> Result<()> {
        self.open_stream()?.sync_all()?;
        Ok(())
    }

    /// Refresh the header and sync the file.
    pub fn close(mut self) -> Result<()> {
        self.flush_header()?;
        self.sync()?;
        debug!("closed page file {}", self.path.display());
        Ok(())
    }

    /// Get the number of page slots, including the header slot.
    #[inline]
    pub fn page_count(&self) -> u64 {
        self.header.page_count
    }

    #[inline]
    pub fn first_free(&self) -> PageNum {
        self.header.first_free
    }

    pub fn set_first_free(&mut self, page_num: PageNum) {
        self.header.first_free = page_num;
        self.header_dirty = true;
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the total size of the file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        self.header.page_count * PAGE_SIZE_ACTUAL as u64
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn check_bounds(&self, page_num: PageNum) -> Result<()> {
        if page_num.0 >= self.header.page_count {
            return Err(Error::EndOfFile(page_num));
        }
        if page_num.0 < 1 {
            return Err(Error::InvalidPage(page_num));
        }
        Ok(())
    }

    fn open_stream(&self) -> Result<File> {
        Ok(OpenOptions::new().read(true).write(true).open(&self.path)?)
    }

    fn write_page_image(&self, page_num: PageNum, page: &Page) -> Result<()> {
        let mut image = vec![0u8; PAGE_SIZE_ACTUAL];
        page.write_image(&mut image);

        let mut file = self.open_stream()?;
        file.seek(SeekFrom::Start(page_num.offset(PAGE_SIZE_ACTUAL)))?;
        file.write_all(&image).map_err(|e| match e.kind() {
            io::ErrorKind::WriteZero => Error::IncompleteWrite { page: page_num },
            _ => Error::Io(e),
        })
    }
}

impl Drop for PageFile {
    fn drop(&mut self) {
        if let Err(e) = self.flush_header() {
            warn!("{}: failed to write header on drop: {}", self.path.display(), e);
        }
    }
}

/// Read until `buf` is full or EOF; returns the byte count.
fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pf");

        let pf = PageFile::create(&path).unwrap();
        assert_eq!(pf.page_count(), 1);
        assert_eq!(pf.file_size(), PAGE_SIZE_ACTUAL as u64);
        assert_eq!(pf.first_free(), PageNum::INVALID);
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pf");

        PageFile::create(&path).unwrap();
        assert!(matches!(PageFile::create(&path), Err(Error::FileExists(_))));
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let dir = tempdir().unwrap();
        assert!(PageFile::open(dir.path().join("missing.pf")).is_err());
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.pf");
        fs::write(&path, vec![7u8; PAGE_SIZE_ACTUAL]).unwrap();

        assert!(matches!(PageFile::open(&path), Err(Error::InvalidPageFile(_))));
    }

    #[test]
    fn test_allocate_and_read_page() {
        let dir = tempdir().unwrap();
        let mut pf = PageFile::create(dir.path().join("test.pf")).unwrap();

        let page = pf.allocate_page().unwrap();
        assert_eq!(page.page_num(), PageNum::new(1));
        assert_eq!(pf.page_count(), 2);

        let page = pf.get_this_page(PageNum::new(1)).unwrap();
        assert!(page.is_used());
        assert!(page.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_force_and_read_page() {
        let dir = tempdir().unwrap();
        let mut pf = PageFile::create(dir.path().join("test.pf")).unwrap();

        let mut page = pf.allocate_page().unwrap();
        page.as_mut_slice()[0] = 0xAB;
        page.as_mut_slice()[4095] = 0xEF;
        pf.force_page(PageNum::new(1), &page).unwrap();

        let read = pf.get_this_page(PageNum::new(1)).unwrap();
        assert_eq!(read.as_slice()[0], 0xAB);
        assert_eq!(read.as_slice()[4095], 0xEF);
    }

    #[test]
    fn test_page_bounds() {
        let dir = tempdir().unwrap();
        let mut pf = PageFile::create(dir.path().join("test.pf")).unwrap();
        pf.allocate_page().unwrap();

        assert!(matches!(
            pf.get_this_page(PageNum::new(0)),
            Err(Error::InvalidPage(_))
        ));
        assert!(matches!(
            pf.get_this_page(PageNum::new(2)),
            Err(Error::EndOfFile(_))
        ));
        assert!(matches!(
            pf.force_page(PageNum::new(5), &Page::with_page_num(PageNum::new(5))),
            Err(Error::EndOfFile(_))
        ));
    }

    #[test]
    fn test_dispose_page() {
        let dir = tempdir().unwrap();
        let mut pf = PageFile::create(dir.path().join("test.pf")).unwrap();
        pf.allocate_page().unwrap();
        pf.allocate_page().unwrap();

        pf.dispose_page(PageNum::new(1)).unwrap();

        assert_eq!(pf.page_count(), 3);
        assert!(matches!(
            pf.get_this_page(PageNum::new(1)),
            Err(Error::PageFree(_))
        ));
        assert!(pf.get_this_page(PageNum::new(2)).is_ok());
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pf");

        {
            let mut pf = PageFile::create(&path).unwrap();
            let mut page = pf.allocate_page().unwrap();
            page.as_mut_slice()[0] = 0x42;
            pf.force_page(page.page_num(), &page).unwrap();
            pf.set_first_free(PageNum::new(1));
            pf.close().unwrap();
        }

        {
            let pf = PageFile::open(&path).unwrap();
            assert_eq!(pf.page_count(), 2);
            assert_eq!(pf.first_free(), PageNum::new(1));

            let page = pf.get_this_page(PageNum::new(1)).unwrap();
            assert_eq!(page.as_slice()[0], 0x42);
        }
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pf");
        {
            let mut pf = PageFile::create(&path).unwrap();
            pf.allocate_page().unwrap();
            pf.close().unwrap();
        }

        let mut bytes = fs::read(&path).unwrap();
        bytes[PAGE_SIZE_ACTUAL + PageHeader::SIZE + 17] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let pf = PageFile::open(&path).unwrap();
        assert!(matches!(
            pf.get_this_page(PageNum::new(1)),
            Err(Error::ChecksumMismatch(_))
        ));
    }

    #[test]
    fn test_open_adopts_longer_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pf");
        {
            let mut pf = PageFile::create(&path).unwrap();
            pf.allocate_page().unwrap();
            pf.close().unwrap();
        }

        // Append a raw slot behind the header's back.
        let mut bytes = fs::read(&path).unwrap();
        let mut slot = vec![0u8; PAGE_SIZE_ACTUAL];
        Page::with_page_num(PageNum::new(2)).write_image(&mut slot);
        bytes.extend_from_slice(&slot);
        fs::write(&path, bytes).unwrap();

        let pf = PageFile::open(&path).unwrap();
        assert_eq!(pf.page_count(), 3);
        assert!(pf.get_this_page(PageNum::new(2)).is_ok());
    }

    #[test]
    fn test_short_read_is_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pf");
        {
            let mut pf = PageFile::create(&path).unwrap();
            pf.allocate_page().unwrap();
            pf.close().unwrap();
        }

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..PAGE_SIZE_ACTUAL + 100]).unwrap();

        let pf = PageFile::open(&path).unwrap();
        let page = pf.get_this_page(PageNum::new(1)).unwrap();
        assert_eq!(page.page_num(), PageNum::new(1));
    }

    #[test]
    fn test_destroy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pf");
        PageFile::create(&path).unwrap();

        PageFile::destroy(&path).unwrap();
        assert!(!path.exists());
    }
}
