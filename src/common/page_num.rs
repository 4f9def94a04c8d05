//! Page number type.

use std::fmt;

/// Identifies a page within one page file.
///
/// Page 0 holds the page file header; data pages start at 1. Page numbers
/// are stable for the file's lifetime and are never recycled by the page
/// file itself.
///
/// # Example
/// ```
/// use microsql::PageNum;
///
/// let page = PageNum::new(42);
/// assert!(page.is_valid());
/// assert_eq!(page.0, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageNum(pub u64);

impl PageNum {
    /// Sentinel for "no page" (end of a chain, missing parent, ...).
    pub const INVALID: PageNum = PageNum(u64::MAX);

    /// The page file header slot.
    pub const HEADER: PageNum = PageNum(0);

    #[inline]
    pub fn new(num: u64) -> Self {
        PageNum(num)
    }

    /// Check if this page number is valid (not the sentinel value).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Byte offset of this page's slot in a file of `slot_size`-byte pages.
    #[inline]
    pub fn offset(&self, slot_size: usize) -> u64 {
        self.0 * slot_size as u64
    }

    #[inline]
    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Decode from the first 8 bytes of `bytes`.
    ///
    /// # Panics
    /// Panics if `bytes` is shorter than 8 bytes.
    #[inline]
    pub fn from_le_slice(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        PageNum(u64::from_le_bytes(raw))
    }
}

impl fmt::Display for PageNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Page(INVALID)")
        } else {
            write!(f, "Page({})", self.0)
        }
    }
}
