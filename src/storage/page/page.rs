//! Page - the fundamental unit of storage.
//!
//! A [`Page`] is a [`PageHeader`] plus a 4KB data region. It is the unit of
//! I/O between a [`PageFile`](crate::storage::PageFile) and the buffer pool.

use crate::common::config::{PAGE_SIZE, PAGE_SIZE_ACTUAL};
use crate::common::PageNum;

use super::page_header::PageHeader;

/// One page: header metadata and `PAGE_SIZE` bytes of data.
///
/// Higher layers only ever see the data region; the header is maintained
/// by the page file (page number, in-use flag, checksum).
///
/// # Clone Implementation
/// `Page` does NOT implement `Clone` outside tests; copying 4KB should be
/// explicit.
///
/// # Example
/// ```
/// use microsql::storage::page::Page;
/// use microsql::PageNum;
///
/// let mut page = Page::with_page_num(PageNum::new(3));
/// page.as_mut_slice()[0] = 0xFF;
/// assert_eq!(page.as_slice()[0], 0xFF);
/// assert!(page.is_used());
/// ```
pub struct Page {
    header: PageHeader,
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Create a zeroed page that belongs to no page number yet.
    pub fn new() -> Self {
        Self {
            header: PageHeader {
                is_used: false,
                ..PageHeader::new(PageNum::INVALID)
            },
            data: [0u8; PAGE_SIZE],
        }
    }

    /// Create a zeroed, in-use page for `page_num`.
    pub fn with_page_num(page_num: PageNum) -> Self {
        Self {
            header: PageHeader::new(page_num),
            data: [0u8; PAGE_SIZE],
        }
    }

    /// Decode a full on-disk image (header followed by data).
    ///
    /// The checksum is not verified here, see [`verify_image`](Self::verify_image).
    ///
    /// # Panics
    /// Panics if `image.len() != PAGE_SIZE_ACTUAL`.
    pub fn from_image(image: &[u8]) -> Self {
        assert_eq!(image.len(), PAGE_SIZE_ACTUAL, "page image has wrong size");
        let mut page = Self::new();
        page.header = PageHeader::from_bytes(image);
        page.data.copy_from_slice(&image[PageHeader::SIZE..]);
        page
    }

    /// Check an on-disk image's checksum.
    pub fn verify_image(image: &[u8]) -> bool {
        PageHeader::from_bytes(image).verify_checksum(image)
    }

    /// Encode the page into `out`, stamping a fresh checksum.
    ///
    /// # Panics
    /// Panics if `out.len() != PAGE_SIZE_ACTUAL`.
    pub fn write_image(&self, out: &mut [u8]) {
        assert_eq!(out.len(), PAGE_SIZE_ACTUAL, "page image has wrong size");
        let mut header = self.header;
        header.checksum = 0;
        header.write_to(out);
        out[PageHeader::SIZE..].copy_from_slice(&self.data);

        header.checksum = PageHeader::compute_checksum(out);
        header.write_to(out);
    }

    /// Get immutable slice of page data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable slice of page data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the data region.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    #[inline]
    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    #[inline]
    pub fn page_num(&self) -> PageNum {
        self.header.page_num
    }

    #[inline]
    pub fn is_used(&self) -> bool {
        self.header.is_used
    }

    pub(crate) fn set_used(&mut self, is_used: bool) {
        self.header.is_used = is_used;
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        Self {
            header: self.header,
            data: self.data,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
