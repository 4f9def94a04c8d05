//! Record file - fixed-size records in slotted pages.
//!
//! Page 1 holds the [`RecordFileHeader`]; record pages start at page 2.
//! Pages with at least one free slot are threaded onto a singly linked free
//! chain rooted at `first_free_page`.

use log::{debug, warn};

use crate::buffer::BufferManager;
use crate::common::config::Config;
use crate::common::{Error, PageNum, RecordId, Result};
use crate::storage::PageFile;

use super::record_page::{RecordFileHeader, RecordPageHeader};
use super::Record;

/// Page holding the record file header.
pub const RECORD_HEADER_PAGE: PageNum = PageNum(1);

/// First page that holds records.
pub const FIRST_RECORD_PAGE: u64 = 2;

/// A heap of fixed-size records addressed by [`RecordId`].
///
/// All page access goes through the file's own [`BufferManager`]; no page
/// stays pinned between calls.
///
/// The in-memory header is written back to page 1 on [`close`](Self::close),
/// on [`force_pages`](Self::force_pages), and best-effort on drop.
///
/// # Example
/// ```no_run
/// use microsql::record::RecordFileManager;
/// use microsql::Config;
///
/// let rfm = RecordFileManager::new(Config::new("/tmp/db"));
/// rfm.create_file("people.rf", 8)?;
///
/// let mut rf = rfm.open_file("people.rf")?;
/// let rid = rf.insert_rec(b"abcdefgh")?;
/// assert_eq!(rf.get_rec(rid)?.data(), b"abcdefgh");
/// rfm.close_file(rf)?;
/// # Ok::<(), microsql::Error>(())
/// ```
pub struct RecordFile {
    bm: BufferManager,
    header: RecordFileHeader,
    /// In-memory header differs from page 1.
    header_modified: bool,
}

impl RecordFile {
    /// Initialize a fresh page file as an empty record file.
    pub(crate) fn create(page_file: PageFile, record_size: usize, config: &Config) -> Result<Self> {
        if page_file.page_count() != 1 {
            return Err(Error::InvalidRecordFile(format!(
                "{} is not empty",
                page_file.path().display()
            )));
        }
        let header = RecordFileHeader::new(record_size);
        if header.records_per_page == 0 {
            return Err(Error::InvalidRecordSize(record_size));
        }

        let bm = BufferManager::new(page_file, config);
        {
            let mut guard = bm.allocate_page()?;
            debug_assert_eq!(guard.page_num(), RECORD_HEADER_PAGE);
            header.write_to(guard.as_mut_slice());
        }
        bm.flush_all_pages()?;

        debug!(
            "created record file: record size {}, {} slots per page",
            record_size, header.records_per_page
        );
        Ok(Self {
            bm,
            header,
            header_modified: false,
        })
    }

    /// Load the header of an existing record file.
    pub(crate) fn open(page_file: PageFile, config: &Config) -> Result<Self> {
        let bm = BufferManager::new(page_file, config);
        let header = {
            let guard = bm.fetch_page_read(RECORD_HEADER_PAGE).map_err(|e| match e {
                Error::EndOfFile(_) => Error::InvalidRecordFile("missing header page".into()),
                other => other,
            })?;
            RecordFileHeader::from_bytes(guard.as_slice())?
        };

        let expected_pages = bm.file_page_count().saturating_sub(FIRST_RECORD_PAGE);
        if header.num_pages != expected_pages {
            return Err(Error::InvalidRecordFile(format!(
                "page count mismatch: header {}, file {}",
                header.num_pages, expected_pages
            )));
        }

        Ok(Self {
            bm,
            header,
            header_modified: false,
        })
    }

    // ========================================================================
    // Record operations
    // ========================================================================

    /// Store `data` in the first free slot of the first page with room.
    ///
    /// # Errors
    /// `Error::BadRecord` if `data` is not exactly `record_size` bytes.
    pub fn insert_rec(&mut self, data: &[u8]) -> Result<RecordId> {
        self.check_len(data)?;
        let record_size = self.header.record_size;
        let page_num = self.next_free_page()?;

        let mut guard = self.bm.fetch_page_write(page_num)?;
        let mut ph = self.decode_page(guard.as_slice())?;
        let slot = ph.bitmap.first_set().ok_or_else(|| {
            Error::InvalidRecordFile(format!("{} is on the free chain but full", page_num))
        })?;

        let offset = ph.slot_offset(slot, record_size);
        guard.as_mut_slice()[offset..offset + record_size].copy_from_slice(data);
        ph.bitmap.reset(slot);
        ph.num_free_slots -= 1;

        if ph.num_free_slots == 0 {
            self.header.first_free_page = ph.next_free;
            self.header_modified = true;
            ph.next_free = PageNum::INVALID;
        }
        ph.write_to(guard.as_mut_slice());

        Ok(RecordId::new(page_num, slot as u32))
    }

    /// Copy out the record at `rid`.
    ///
    /// # Errors
    /// - `Error::EndOfFile` if `rid` is outside the file
    /// - `Error::RecordNotFound` if the slot is free
    pub fn get_rec(&self, rid: RecordId) -> Result<Record> {
        if !self.is_valid_rid(rid) {
            return Err(Error::EndOfFile(rid.page));
        }
        let record_size = self.header.record_size;
        let guard = self.bm.fetch_page_read(rid.page)?;
        let ph = self.decode_page(guard.as_slice())?;

        let slot = rid.slot as usize;
        if ph.bitmap.test(slot) {
            return Err(Error::RecordNotFound(rid));
        }
        let offset = ph.slot_offset(slot, record_size);
        Ok(Record::new(
            rid,
            guard.as_slice()[offset..offset + record_size].to_vec(),
        ))
    }

    /// Free the slot at `rid`.
    ///
    /// A page that goes from full to having a free slot is pushed onto the
    /// head of the free chain.
    ///
    /// # Errors
    /// - `Error::BadRecord` if `rid` is outside the file
    /// - `Error::RecordNotFound` if the slot is already free
    pub fn delete_rec(&mut self, rid: RecordId) -> Result<()> {
        if !self.is_valid_rid(rid) {
            return Err(Error::BadRecord(format!("rid {} out of range", rid)));
        }
        let record_size = self.header.record_size;
        let mut guard = self.bm.fetch_page_write(rid.page)?;
        let mut ph = self.decode_page(guard.as_slice())?;

        let slot = rid.slot as usize;
        if ph.bitmap.test(slot) {
            return Err(Error::RecordNotFound(rid));
        }

        let was_full = ph.num_free_slots == 0;
        ph.bitmap.set(slot);
        ph.num_free_slots += 1;
        if was_full {
            ph.next_free = self.header.first_free_page;
            self.header.first_free_page = rid.page;
            self.header_modified = true;
        }

        let offset = ph.slot_offset(slot, record_size);
        guard.as_mut_slice()[offset..offset + record_size].fill(0);
        ph.write_to(guard.as_mut_slice());
        Ok(())
    }

    /// Overwrite the slot named by `rec.rid()` with `rec.data()`.
    ///
    /// # Errors
    /// - `Error::BadRecord` if the data length is wrong or the rid is outside
    ///   the file
    /// - `Error::RecordNotFound` if the slot is free
    pub fn update_rec(&mut self, rec: &Record) -> Result<()> {
        self.check_len(rec.data())?;
        let rid = rec.rid();
        if !self.is_valid_rid(rid) {
            return Err(Error::BadRecord(format!("rid {} out of range", rid)));
        }
        let record_size = self.header.record_size;
        let mut guard = self.bm.fetch_page_write(rid.page)?;
        let ph = self.decode_page(guard.as_slice())?;

        let slot = rid.slot as usize;
        if ph.bitmap.test(slot) {
            return Err(Error::RecordNotFound(rid));
        }
        let offset = ph.slot_offset(slot, record_size);
        guard.as_mut_slice()[offset..offset + record_size].copy_from_slice(rec.data());
        Ok(())
    }

    /// Write the header and every dirty page back to the page file.
    pub fn force_pages(&mut self) -> Result<()> {
        self.write_header()?;
        self.bm.flush_all_pages()
    }

    /// Flush everything and sync the file.
    pub fn close(mut self) -> Result<()> {
        self.force_pages()?;
        self.bm.page_file().sync()?;
        debug!(
            "closed record file {}: {}",
            self.bm.page_file().path().display(),
            self.bm.stats().snapshot()
        );
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[inline]
    pub fn record_size(&self) -> usize {
        self.header.record_size
    }

    #[inline]
    pub fn records_per_page(&self) -> usize {
        self.header.records_per_page
    }

    /// Number of record pages, excluding the header page.
    #[inline]
    pub fn num_pages(&self) -> u64 {
        self.header.num_pages
    }

    #[inline]
    pub fn first_free_page(&self) -> PageNum {
        self.header.first_free_page
    }

    /// The buffer manager backing this file.
    pub fn buffer(&self) -> &BufferManager {
        &self.bm
    }

    /// Page number of the last record page, `None` when there are none.
    pub fn last_page(&self) -> Option<PageNum> {
        (self.header.num_pages > 0)
            .then(|| PageNum::new(FIRST_RECORD_PAGE + self.header.num_pages - 1))
    }

    /// Whether `rid` addresses a slot of an existing record page.
    pub fn is_valid_rid(&self, rid: RecordId) -> bool {
        rid.page.is_valid()
            && rid.page.0 >= FIRST_RECORD_PAGE
            && rid.page.0 < FIRST_RECORD_PAGE + self.header.num_pages
            && (rid.slot as usize) < self.header.records_per_page
    }

    /// Free slots on record page `page_num`.
    pub fn free_slot_count(&self, page_num: PageNum) -> Result<u32> {
        Ok(self.read_page_header(page_num)?.num_free_slots)
    }

    /// Check that the page's free count agrees with its bitmap.
    pub fn check_page_invariant(&self, page_num: PageNum) -> Result<bool> {
        let ph = self.read_page_header(page_num)?;
        Ok(ph.num_slots as usize == self.header.records_per_page && ph.is_consistent())
    }

    /// Decode the slot header of a record page.
    pub(crate) fn read_page_header(&self, page_num: PageNum) -> Result<RecordPageHeader> {
        if page_num.0 < FIRST_RECORD_PAGE {
            return Err(Error::InvalidPage(page_num));
        }
        let guard = self.bm.fetch_page_read(page_num)?;
        RecordPageHeader::from_bytes(guard.as_slice())
    }

    /// Decode a slot header, rejecting pages laid out for another record size.
    fn decode_page(&self, data: &[u8]) -> Result<RecordPageHeader> {
        let ph = RecordPageHeader::from_bytes(data)?;
        if ph.num_slots as usize != self.header.records_per_page {
            return Err(Error::InvalidRecordFile(format!(
                "page has {} slots, file expects {}",
                ph.num_slots, self.header.records_per_page
            )));
        }
        Ok(ph)
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn check_len(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.header.record_size {
            return Err(Error::BadRecord(format!(
                "expected {} bytes, got {}",
                self.header.record_size,
                data.len()
            )));
        }
        Ok(())
    }

    /// Head of the free chain, allocating a new page when it is empty.
    fn next_free_page(&mut self) -> Result<PageNum> {
        let head = self.header.first_free_page;
        if !head.is_valid() {
            return self.allocate_record_page(PageNum::INVALID);
        }

        let ph = self.read_page_header(head)?;
        if ph.num_free_slots > 0 {
            return Ok(head);
        }
        warn!("{} heads the free chain with no free slot, skipping it", head);
        self.allocate_record_page(ph.next_free)
    }

    /// Append an empty record page and make it the head of the free chain.
    fn allocate_record_page(&mut self, next_free: PageNum) -> Result<PageNum> {
        let page_num = {
            let mut guard = self.bm.allocate_page()?;
            RecordPageHeader::new(self.header.records_per_page, next_free)
                .write_to(guard.as_mut_slice());
            guard.page_num()
        };

        self.header.num_pages += 1;
        self.header.first_free_page = page_num;
        self.header_modified = true;

        debug!("record file: new record page {}", page_num);
        Ok(page_num)
    }

    fn write_header(&mut self) -> Result<()> {
        if !self.header_modified {
            return Ok(());
        }
        let mut guard = self.bm.fetch_page_write(RECORD_HEADER_PAGE)?;
        self.header.write_to(guard.as_mut_slice());
        drop(guard);
        self.header_modified = false;
        Ok(())
    }
}

impl Drop for RecordFile {
    fn drop(&mut self) {
        if let Err(e) = self.write_header() {
            warn!("failed to save record file header on drop: {}", e);
        }
    }
}
