//! On-page layouts of the record heap.
//!
//! - [`RecordFileHeader`] lives in the data region of page 1
//! - every record page (2 and up) starts with a [`RecordPageHeader`]

use crate::common::config::{IDENTIFY_LEN, PAGE_SIZE};
use crate::common::{Error, PageNum, Result};
use crate::storage::page::{encode_identify, matches_identify};

use super::Bitmap;

pub const RECORD_FILE_IDENTIFY: &str = "MicroSQL RecordFile";

/// File-level header of a record file.
///
/// # Layout (64 bytes)
/// ```text
/// Offset  Size  Field
/// 0       32    identify ("MicroSQL RecordFile")
/// 32      8     record_size
/// 40      8     records_per_page
/// 48      8     num_pages (record pages, header page excluded)
/// 56      8     first_free_page (INVALID when the chain is empty)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFileHeader {
    pub record_size: usize,
    pub records_per_page: usize,
    pub num_pages: u64,
    pub first_free_page: PageNum,
}

impl RecordFileHeader {
    pub const SIZE: usize = IDENTIFY_LEN + 32;

    pub fn new(record_size: usize) -> Self {
        Self {
            record_size,
            records_per_page: RecordPageHeader::slot_count_for(record_size),
            num_pages: 0,
            first_free_page: PageNum::INVALID,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if !matches_identify(data, RECORD_FILE_IDENTIFY) {
            return Err(Error::InvalidRecordFile("bad identify string".into()));
        }
        let field = |at: usize| PageNum::from_le_slice(&data[at..at + 8]).0;

        let header = Self {
            record_size: field(32) as usize,
            records_per_page: field(40) as usize,
            num_pages: field(48),
            first_free_page: PageNum::new(field(56)),
        };

        if header.record_size == 0
            || header.records_per_page != RecordPageHeader::slot_count_for(header.record_size)
        {
            return Err(Error::InvalidRecordFile(format!(
                "record size {} does not match {} slots per page",
                header.record_size, header.records_per_page
            )));
        }
        Ok(header)
    }

    pub fn write_to(&self, data: &mut [u8]) {
        data[..IDENTIFY_LEN].copy_from_slice(&encode_identify(RECORD_FILE_IDENTIFY));
        data[32..40].copy_from_slice(&(self.record_size as u64).to_le_bytes());
        data[40..48].copy_from_slice(&(self.records_per_page as u64).to_le_bytes());
        data[48..56].copy_from_slice(&self.num_pages.to_le_bytes());
        data[56..64].copy_from_slice(&self.first_free_page.to_le_bytes());
    }
}

/// Header at the start of every record page's data region.
///
/// # Layout
/// ```text
/// Offset  Size              Field
/// 0       8                 next_free (next page on the free chain)
/// 8       4                 num_slots
/// 12      4                 num_free_slots
/// 16      ceil(slots / 8)   free-slot bitmap, 1 = free
/// ```
/// The slot array follows immediately.
///
/// Invariant: `num_free_slots == bitmap.count_ones()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPageHeader {
    pub next_free: PageNum,
    pub num_slots: u32,
    pub num_free_slots: u32,
    pub bitmap: Bitmap,
}

impl RecordPageHeader {
    /// Bytes before the bitmap.
    pub const FIXED_SIZE: usize = 16;

    /// Fresh header with every slot free.
    pub fn new(num_slots: usize, next_free: PageNum) -> Self {
        let mut bitmap = Bitmap::new(num_slots);
        bitmap.set_all();
        Self {
            next_free,
            num_slots: num_slots as u32,
            num_free_slots: num_slots as u32,
            bitmap,
        }
    }

    /// Serialized size of a header for `num_slots` slots.
    #[inline]
    pub const fn size_for(num_slots: usize) -> usize {
        Self::FIXED_SIZE + Bitmap::chars_for(num_slots)
    }

    /// Most slots of `record_size` bytes that fit in a page next to their
    /// header. Zero when not even one fits.
    pub fn slot_count_for(record_size: usize) -> usize {
        if record_size == 0 || record_size > PAGE_SIZE {
            return 0;
        }
        let available = PAGE_SIZE - Self::FIXED_SIZE;
        let mut slots = (available * 8) / (record_size * 8 + 1);
        while slots > 0 && Self::size_for(slots) + slots * record_size > PAGE_SIZE {
            slots -= 1;
        }
        slots
    }

    #[inline]
    pub fn size(&self) -> usize {
        Self::size_for(self.num_slots as usize)
    }

    /// Byte offset of `slot` within the page's data region.
    #[inline]
    pub fn slot_offset(&self, slot: usize, record_size: usize) -> usize {
        self.size() + slot * record_size
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let next_free = PageNum::from_le_slice(&data[0..8]);
        let num_slots = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        let num_free_slots = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);

        if Self::size_for(num_slots as usize) > data.len() || num_free_slots > num_slots {
            return Err(Error::InvalidRecordFile(format!(
                "corrupt record page header ({} slots, {} free)",
                num_slots, num_free_slots
            )));
        }
        let bitmap = Bitmap::from_bytes(&data[Self::FIXED_SIZE..], num_slots as usize);

        Ok(Self {
            next_free,
            num_slots,
            num_free_slots,
            bitmap,
        })
    }

    pub fn write_to(&self, data: &mut [u8]) {
        data[0..8].copy_from_slice(&self.next_free.to_le_bytes());
        data[8..12].copy_from_slice(&self.num_slots.to_le_bytes());
        data[12..16].copy_from_slice(&self.num_free_slots.to_le_bytes());
        self.bitmap
            .write_to(&mut data[Self::FIXED_SIZE..Self::size_for(self.num_slots as usize)]);
    }

    /// `num_free_slots` agrees with the bitmap.
    pub fn is_consistent(&self) -> bool {
        self.num_free_slots as usize == self.bitmap.count_ones()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_count_for_100_byte_records() {
        let slots = RecordPageHeader::slot_count_for(100);
        assert_eq!(slots, 40);
        assert_eq!(slots, (PAGE_SIZE - RecordPageHeader::size_for(slots)) / 100);
    }

    #[test]
    fn test_slot_count_fills_page() {
        for record_size in [1, 3, 7, 8, 64, 100, 1000, 4000] {
            let slots = RecordPageHeader::slot_count_for(record_size);
            let used = RecordPageHeader::size_for(slots) + slots * record_size;
            assert!(used <= PAGE_SIZE, "record size {}", record_size);
            let more = RecordPageHeader::size_for(slots + 1) + (slots + 1) * record_size;
            assert!(more > PAGE_SIZE, "record size {}", record_size);
        }
    }

    #[test]
    fn test_slot_count_too_large() {
        assert_eq!(RecordPageHeader::slot_count_for(0), 0);
        assert_eq!(RecordPageHeader::slot_count_for(PAGE_SIZE), 0);
    }

    #[test]
    fn test_page_header_layout() {
        let mut header = RecordPageHeader::new(10, PageNum::new(5));
        header.bitmap.reset(0);
        header.num_free_slots -= 1;

        let mut data = [0u8; 64];
        header.write_to(&mut data);

        assert_eq!(data[0], 5);
        assert_eq!(data[8], 10);
        assert_eq!(data[12], 9);
        assert_eq!(data[16], 0xFE);
        assert_eq!(data[17], 0x03);

        let decoded = RecordPageHeader::from_bytes(&data).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.is_consistent());
    }

    #[test]
    fn test_file_header_rejects_bad_identify() {
        let data = [0u8; RecordFileHeader::SIZE];
        assert!(matches!(
            RecordFileHeader::from_bytes(&data),
            Err(Error::InvalidRecordFile(_))
        ));
    }

    #[test]
    fn test_file_header_layout() {
        let mut header = RecordFileHeader::new(100);
        header.num_pages = 3;
        header.first_free_page = PageNum::new(4);

        let mut data = [0u8; RecordFileHeader::SIZE];
        header.write_to(&mut data);

        assert_eq!(&data[..19], b"MicroSQL RecordFile");
        assert_eq!(data[32], 100);
        assert_eq!(data[40], 40);
        assert_eq!(RecordFileHeader::from_bytes(&data).unwrap(), header);
    }
}
