//! Record identifier type.

use std::fmt;

use super::PageNum;

/// Identifies a slot within a record page.
pub type SlotNum = u32;

/// `(page, slot)` address of a record.
///
/// Also the payload of B+tree entries: leaves store the rid of the indexed
/// record, internal nodes store a rid whose page is the child node and whose
/// slot is zero.
///
/// # Layout (12 bytes)
/// ```text
/// Offset  Size  Field
/// 0       8     page (u64, little-endian)
/// 8       4     slot (u32, little-endian)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page: PageNum,
    pub slot: SlotNum,
}

impl RecordId {
    pub const SIZE: usize = 12;

    pub const INVALID: RecordId = RecordId {
        page: PageNum::INVALID,
        slot: SlotNum::MAX,
    };

    #[inline]
    pub fn new(page: PageNum, slot: SlotNum) -> Self {
        Self { page, slot }
    }

    /// Rid addressing a child node page from an internal B+tree entry.
    #[inline]
    pub fn child(page: PageNum) -> Self {
        Self { page, slot: 0 }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.page.is_valid()
    }

    /// # Panics
    /// Panics if `data.len() < RecordId::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for RecordId");
        data[..8].copy_from_slice(&self.page.to_le_bytes());
        data[8..12].copy_from_slice(&self.slot.to_le_bytes());
    }

    /// # Panics
    /// Panics if `data.len() < RecordId::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for RecordId");
        let page = PageNum::from_le_slice(&data[..8]);
        let slot = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        Self { page, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.page.is_valid() {
            write!(f, "({},{})", self.page.0, self.slot)
        } else {
            write!(f, "(INVALID)")
        }
    }
}
