//! Frame - one slot of the buffer pool.
//!
//! A [`Frame`] owns a [`Page`] image and the three pieces of state the
//! buffer manager tracks for it: the resident page number, the pin count and
//! the dirty flag.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageNum;
use crate::storage::page::Page;

/// A slot in the buffer pool.
///
/// Pinning and dirtiness are independent: unpinning never clears the dirty
/// flag, only a flush does.
///
/// The page image sits behind a `RwLock` handed out to page guards; the
/// bookkeeping is atomic so the manager can inspect a frame without taking
/// the page lock.
pub struct Frame {
    page: RwLock<Page>,
    /// Raw [`PageNum`] of the resident page, `PageNum::INVALID` when empty.
    resident: AtomicU64,
    pin_count: AtomicU32,
    dirty: AtomicBool,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            resident: AtomicU64::new(PageNum::INVALID.0),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    /// Install a page read from (or just appended to) the page file.
    pub fn load(&self, page: Page) {
        let page_num = page.page_num();
        *self.page.write() = page;
        self.resident.store(page_num.0, Ordering::Release);
    }

    /// Page held by this frame, `None` for an empty frame.
    #[inline]
    pub fn page_num(&self) -> Option<PageNum> {
        let raw = PageNum(self.resident.load(Ordering::Acquire));
        raw.is_valid().then_some(raw)
    }

    /// Returns the new pin count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the new pin count, or `None` if the frame was not pinned.
    #[inline]
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                count.checked_sub(1)
            })
            .ok()
            .map(|old| old - 1)
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    #[inline]
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    /// Drop the resident page without writing it back.
    pub fn reset(&self) {
        *self.page.write() = Page::new();
        self.resident.store(PageNum::INVALID.0, Ordering::Release);
        self.pin_count.store(0, Ordering::Relaxed);
        self.dirty.store(false, Ordering::Relaxed);
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(page: u64) -> Frame {
        let frame = Frame::new();
        frame.load(Page::with_page_num(PageNum::new(page)));
        frame
    }

    #[test]
    fn test_new_frame_is_empty() {
        let frame = Frame::new();
        assert_eq!(frame.page_num(), None);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_pin_unpin() {
        let frame = loaded(3);
        assert_eq!(frame.pin(), 1);
        assert_eq!(frame.pin(), 2);
        assert_eq!(frame.unpin(), Some(1));
        assert_eq!(frame.unpin(), Some(0));
        assert_eq!(frame.unpin(), None);
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_unpin_keeps_dirty_flag() {
        let frame = loaded(3);
        frame.pin();
        frame.mark_dirty();
        frame.unpin();
        assert!(frame.is_dirty());

        frame.clear_dirty();
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_load_replaces_image() {
        let frame = loaded(2);
        let mut page = Page::with_page_num(PageNum::new(4));
        page.as_mut_slice()[0] = 0xAB;

        frame.load(page);

        assert_eq!(frame.page_num(), Some(PageNum::new(4)));
        assert_eq!(frame.page().as_slice()[0], 0xAB);
    }

    #[test]
    fn test_reset() {
        let frame = loaded(99);
        frame.pin();
        frame.mark_dirty();
        frame.page_mut().as_mut_slice()[100] = 0xFF;

        frame.reset();

        assert_eq!(frame.page_num(), None);
        assert!(!frame.is_pinned());
        assert!(!frame.is_dirty());
        assert_eq!(frame.page().as_slice()[100], 0);
    }
}
