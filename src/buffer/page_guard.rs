//! RAII guards for page access.
//!
//! - [`PageReadGuard`] - shared read access
//! - [`PageWriteGuard`] - exclusive write access, marks the page dirty
//!
//! Fetching a page pins it; dropping the guard unlocks it on every exit
//! path, including early returns through `?`.

use std::ops::{Deref, DerefMut};

use log::error;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageNum};
use crate::storage::page::Page;

use super::buffer_manager::BufferManager;

/// Guard for read-only page access.
///
/// Several read guards may exist for the same page. The page is unpinned
/// when the guard is dropped.
///
/// # Example
/// ```ignore
/// let guard = bm.fetch_page_read(page_num)?;
/// let data = guard.as_slice();
/// // guard drops here, page unpinned
/// ```
pub struct PageReadGuard<'a> {
    bm: &'a BufferManager,
    frame_id: FrameId,
    page_num: PageNum,
    lock: RwLockReadGuard<'a, Page>,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(
        bm: &'a BufferManager,
        frame_id: FrameId,
        page_num: PageNum,
        lock: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            bm,
            frame_id,
            page_num,
            lock,
        }
    }

    #[inline]
    pub fn page_num(&self) -> PageNum {
        self.page_num
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.bm.unlock_frame(self.frame_id, self.page_num, false) {
            error!("read guard release failed: {}", e);
        }
    }
}

/// Guard for exclusive write access to a page.
///
/// The page is marked dirty and unpinned when the guard is dropped.
///
/// # Example
/// ```ignore
/// let mut guard = bm.fetch_page_write(page_num)?;
/// guard.as_mut_slice()[0] = 0xFF;
/// // guard drops here, page marked dirty and unpinned
/// ```
pub struct PageWriteGuard<'a> {
    bm: &'a BufferManager,
    frame_id: FrameId,
    page_num: PageNum,
    lock: RwLockWriteGuard<'a, Page>,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(
        bm: &'a BufferManager,
        frame_id: FrameId,
        page_num: PageNum,
        lock: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            bm,
            frame_id,
            page_num,
            lock,
        }
    }

    #[inline]
    pub fn page_num(&self) -> PageNum {
        self.page_num
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        &mut self.lock
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.bm.unlock_frame(self.frame_id, self.page_num, true) {
            error!("write guard release failed: {}", e);
        }
    }
}
