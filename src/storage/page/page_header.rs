//! Page header and identify strings.
//!
//! Every page slot on disk starts with a [`PageHeader`]:
//! - identify string, to recognise page slots written by this engine
//! - the page's own number
//! - in-use flag (cleared when the page is disposed)
//! - CRC32 checksum for integrity

use crate::common::config::{IDENTIFY_LEN, PAGE_HEADER_SIZE};
use crate::common::PageNum;

/// Identify string stamped into every page header.
pub const PAGE_IDENTIFY: &str = "MicroSQL Page";

/// Encode `tag` as a NUL-padded fixed-length identify string.
///
/// # Panics
/// Panics if `tag` is longer than [`IDENTIFY_LEN`].
pub fn encode_identify(tag: &str) -> [u8; IDENTIFY_LEN] {
    assert!(tag.len() <= IDENTIFY_LEN, "identify string too long");
    let mut out = [0u8; IDENTIFY_LEN];
    out[..tag.len()].copy_from_slice(tag.as_bytes());
    out
}

/// Check that `data` starts with the identify string for `tag`.
pub fn matches_identify(data: &[u8], tag: &str) -> bool {
    data.len() >= IDENTIFY_LEN && data[..IDENTIFY_LEN] == encode_identify(tag)
}

/// Metadata stored in front of every page's data region.
///
/// # Layout (48 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       32    identify ("MicroSQL Page", NUL-padded)
/// 32      8     page_num (u64, little-endian)
/// 40      1     is_used (0 or 1)
/// 41      3     padding
/// 44      4     checksum (CRC32, little-endian)
/// ```
///
/// # Checksum
/// The checksum covers the header (with the checksum field zeroed) and the
/// whole data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    /// Whether the identify string matched when the header was decoded.
    pub identified: bool,
    /// Number of the page this header belongs to.
    pub page_num: PageNum,
    /// False once the page has been disposed.
    pub is_used: bool,
    /// CRC32 checksum of the page contents.
    pub checksum: u32,
}

impl PageHeader {
    pub const SIZE: usize = PAGE_HEADER_SIZE;

    pub const OFFSET_IDENTIFY: usize = 0;
    pub const OFFSET_PAGE_NUM: usize = 32;
    pub const OFFSET_IS_USED: usize = 40;
    pub const OFFSET_CHECKSUM: usize = 44;

    /// Header for a live page. Checksum starts at zero.
    pub fn new(page_num: PageNum) -> Self {
        Self {
            identified: true,
            page_num,
            is_used: true,
            checksum: 0,
        }
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        let identified = matches_identify(&data[Self::OFFSET_IDENTIFY..], PAGE_IDENTIFY);
        let page_num = PageNum::from_le_slice(&data[Self::OFFSET_PAGE_NUM..]);
        let is_used = data[Self::OFFSET_IS_USED] != 0;
        let checksum = u32::from_le_bytes([
            data[Self::OFFSET_CHECKSUM],
            data[Self::OFFSET_CHECKSUM + 1],
            data[Self::OFFSET_CHECKSUM + 2],
            data[Self::OFFSET_CHECKSUM + 3],
        ]);

        Self {
            identified,
            page_num,
            is_used,
            checksum,
        }
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < PageHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for PageHeader");

        data[Self::OFFSET_IDENTIFY..Self::OFFSET_PAGE_NUM]
            .copy_from_slice(&encode_identify(PAGE_IDENTIFY));
        data[Self::OFFSET_PAGE_NUM..Self::OFFSET_IS_USED]
            .copy_from_slice(&self.page_num.to_le_bytes());
        data[Self::OFFSET_IS_USED] = u8::from(self.is_used);
        data[Self::OFFSET_IS_USED + 1..Self::OFFSET_CHECKSUM].fill(0);
        data[Self::OFFSET_CHECKSUM..Self::SIZE].copy_from_slice(&self.checksum.to_le_bytes());
    }

    /// Compute the CRC32 checksum of a page image (header followed by data).
    ///
    /// The checksum field itself is hashed as zeros.
    pub fn compute_checksum(image: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&image[..Self::OFFSET_CHECKSUM]);
        hasher.update(&[0u8; 4]);
        hasher.update(&image[Self::SIZE..]);
        hasher.finalize()
    }

    /// Verify the stored checksum against a full page image.
    pub fn verify_checksum(&self, image: &[u8]) -> bool {
        self.checksum == Self::compute_checksum(image)
    }
}
