//! Buffer Manager - the page cache in front of one page file.
//!
//! The [`BufferManager`] provides:
//! - Page caching between a [`PageFile`] and memory
//! - Pin counts with scope-guarded release
//! - Dirty tracking and write-back on flush or eviction
//! - LRU eviction of unpinned pages

use std::collections::HashMap;

use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::buffer::replacer::LruReplacer;
use crate::buffer::{BufferStats, Frame, PageReadGuard, PageWriteGuard};
use crate::common::config::Config;
use crate::common::{Error, FrameId, PageNum, Result};
use crate::storage::PageFile;

/// Caches pages of a single [`PageFile`] in a fixed pool of frames.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                      BufferManager                          │
/// │  ┌──────────────┐  ┌───────────────────────────────────┐   │
/// │  │ page_table   │  │        frames: Vec<Frame>         │   │
/// │  │PageNum → Fid │─▶│  [Frame0] [Frame1] [Frame2] ...   │   │
/// │  └──────────────┘  └───────────────────────────────────┘   │
/// │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
/// │  │  free_list   │  │   replacer   │  │  page_file   │      │
/// │  │ Vec<FrameId> │  │ LruReplacer  │  │    Mutex     │      │
/// │  └──────────────┘  └──────────────┘  └──────────────┘      │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Pinning
/// Every fetch pins the page and returns a guard; dropping the guard
/// unlocks it. Fetching a page that is already pinned just bumps the pin
/// count. Pinned pages are never evicted.
///
/// # Dirty pages
/// Write guards mark their page dirty on release, and
/// [`mark_dirty`](Self::mark_dirty) does so explicitly. Unlocking never
/// clears the flag; only a flush (explicit or on eviction) does.
///
/// # Deadlocks
/// Holding a write guard on a page while fetching the same page again, or
/// while flushing, blocks forever. Callers keep at most one guard per page.
///
/// # Usage
/// ```ignore
/// let pf = PageFile::create("test.pf")?;
/// let bm = BufferManager::new(pf, &Config::default());
///
/// let mut guard = bm.allocate_page()?;
/// guard.as_mut_slice()[0] = 0xAB;
/// drop(guard);
///
/// let guard = bm.fetch_page_read(PageNum::new(1))?;
/// ```
pub struct BufferManager {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,

    /// Maps page numbers to frames.
    page_table: RwLock<HashMap<PageNum, FrameId>>,

    /// Stack of free frame IDs.
    free_list: Mutex<Vec<FrameId>>,

    replacer: Mutex<LruReplacer>,

    page_file: Mutex<PageFile>,

    stats: BufferStats,

    pool_size: usize,
}

impl BufferManager {
    /// Create a buffer manager sized by `config.buffer_pool_size`.
    ///
    /// # Panics
    /// Panics if the pool size is 0.
    pub fn new(page_file: PageFile, config: &Config) -> Self {
        Self::with_pool_size(page_file, config.buffer_pool_size)
    }

    /// Create a buffer manager with an explicit number of frames.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn with_pool_size(page_file: PageFile, pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new()).collect();
        let free_list: Vec<FrameId> = (0..pool_size).rev().map(FrameId::new).collect();

        Self {
            frames,
            page_table: RwLock::new(HashMap::new()),
            free_list: Mutex::new(free_list),
            replacer: Mutex::new(LruReplacer::new()),
            page_file: Mutex::new(page_file),
            stats: BufferStats::new(),
            pool_size,
        }
    }

    // ========================================================================
    // Public API: Fetch pages
    // ========================================================================

    /// Pin a page for reading, loading it from the page file on a miss.
    ///
    /// # Errors
    /// - `Error::EndOfFile` / `Error::InvalidPage` / `Error::PageFree` from
    ///   the page file
    /// - `Error::NoFreeFrames` if every frame is pinned
    pub fn fetch_page_read(&self, page_num: PageNum) -> Result<PageReadGuard<'_>> {
        let frame_id = self.fetch_page_internal(page_num)?;
        let lock = self.frames[frame_id.0].page();

        Ok(PageReadGuard::new(self, frame_id, page_num, lock))
    }

    /// Pin a page for writing. The page is marked dirty when the guard drops.
    ///
    /// # Errors
    /// Same as [`fetch_page_read`](Self::fetch_page_read).
    pub fn fetch_page_write(&self, page_num: PageNum) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.fetch_page_internal(page_num)?;
        let lock = self.frames[frame_id.0].page_mut();

        Ok(PageWriteGuard::new(self, frame_id, page_num, lock))
    }

    // ========================================================================
    // Public API: Allocate and dispose pages
    // ========================================================================

    /// Append a page to the file and cache it, pinned and clean.
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if every frame is pinned
    /// - `Error::PageInBuffer` if the new page number is already cached
    /// - I/O errors from the page file
    pub fn allocate_page(&self) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.get_free_frame()?;

        let page = match self.page_file.lock().allocate_page() {
            Ok(page) => page,
            Err(e) => {
                self.free_list.lock().push(frame_id);
                return Err(e);
            }
        };
        let page_num = page.page_num();

        {
            let mut pt = self.page_table.write();
            if pt.contains_key(&page_num) {
                drop(pt);
                self.free_list.lock().push(frame_id);
                return Err(Error::PageInBuffer(page_num));
            }
            pt.insert(page_num, frame_id);
        }

        let frame = &self.frames[frame_id.0];
        frame.load(page);
        frame.clear_dirty();
        frame.pin();

        {
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id);
            replacer.set_evictable(frame_id, false);
        }
        BufferStats::bump(&self.stats.pages_allocated);

        let lock = frame.page_mut();
        Ok(PageWriteGuard::new(self, frame_id, page_num, lock))
    }

    /// Drop a page from the cache and dispose it in the page file.
    ///
    /// # Errors
    /// - `Error::PagePinned` if the page is pinned
    /// - page file errors from disposing
    pub fn dispose_page(&self, page_num: PageNum) -> Result<()> {
        {
            let mut pt = self.page_table.write();
            if let Some(&frame_id) = pt.get(&page_num) {
                let frame = &self.frames[frame_id.0];
                if frame.is_pinned() {
                    return Err(Error::PagePinned(page_num));
                }
                pt.remove(&page_num);
                drop(pt);

                frame.reset();
                self.replacer.lock().remove(frame_id);
                self.free_list.lock().push(frame_id);
            }
        }

        self.page_file.lock().dispose_page(page_num)?;
        BufferStats::bump(&self.stats.pages_disposed);
        Ok(())
    }

    // ========================================================================
    // Public API: Dirty tracking and flushing
    // ========================================================================

    /// Flag a cached page as needing write-back.
    ///
    /// # Errors
    /// `Error::PageNotCached` if the page is not in the buffer pool.
    pub fn mark_dirty(&self, page_num: PageNum) -> Result<()> {
        let frame_id = self.lookup(page_num).ok_or(Error::PageNotCached(page_num))?;
        self.frames[frame_id.0].mark_dirty();
        Ok(())
    }

    /// Write one page back if it is cached and dirty.
    pub fn flush_page(&self, page_num: PageNum) -> Result<()> {
        match self.lookup(page_num) {
            Some(frame_id) => self.flush_frame(frame_id, page_num),
            None => Ok(()),
        }
    }

    /// Write every dirty cached page back and refresh the file header.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut pages: Vec<(PageNum, FrameId)> = {
            let pt = self.page_table.read();
            pt.iter().map(|(&pn, &fid)| (pn, fid)).collect()
        };
        pages.sort_by_key(|(pn, _)| *pn);

        for (page_num, frame_id) in pages {
            self.flush_frame(frame_id, page_num)?;
        }

        self.page_file.lock().flush_header()
    }

    /// Flush everything and sync the page file.
    pub fn close(self) -> Result<()> {
        self.flush_all_pages()?;
        self.page_file.lock().sync()?;
        debug!(
            "closed buffer manager for {}: {}",
            self.page_file.lock().path().display(),
            self.stats.snapshot()
        );
        Ok(())
    }

    // ========================================================================
    // Public API: Queries
    // ========================================================================

    /// Access the underlying page file.
    pub fn page_file(&self) -> MutexGuard<'_, PageFile> {
        self.page_file.lock()
    }

    /// Page count of the underlying file, including the header slot.
    pub fn file_page_count(&self) -> u64 {
        self.page_file.lock().page_count()
    }

    /// Pin count of a cached page, `None` if not cached.
    pub fn pin_count(&self, page_num: PageNum) -> Option<u32> {
        self.lookup(page_num)
            .map(|frame_id| self.frames[frame_id.0].pin_count())
    }

    /// Dirty flag of a cached page, `None` if not cached.
    pub fn is_dirty(&self, page_num: PageNum) -> Option<bool> {
        self.lookup(page_num)
            .map(|frame_id| self.frames[frame_id.0].is_dirty())
    }

    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Number of pages currently cached.
    pub fn cached_page_count(&self) -> usize {
        self.page_table.read().len()
    }

    // ========================================================================
    // Internal: release path used by the guards
    // ========================================================================

    /// Decrement the pin count of a cached page.
    ///
    /// # Errors
    /// - `Error::PageNotCached` if the page is not in the buffer pool
    /// - `Error::PageNotPinned` if its pin count is already zero
    #[cfg(test)]
    pub(crate) fn unlock_page(&self, page_num: PageNum) -> Result<()> {
        let frame_id = self.lookup(page_num).ok_or(Error::PageNotCached(page_num))?;
        self.unlock_frame(frame_id, page_num, false)
    }

    pub(crate) fn unlock_frame(
        &self,
        frame_id: FrameId,
        page_num: PageNum,
        is_dirty: bool,
    ) -> Result<()> {
        let frame = &self.frames[frame_id.0];

        if is_dirty {
            frame.mark_dirty();
        }

        let remaining = frame.unpin().ok_or(Error::PageNotPinned(page_num))?;
        if remaining == 0 {
            self.replacer.lock().set_evictable(frame_id, true);
        }
        Ok(())
    }

    // ========================================================================
    // Internal: Core fetch logic
    // ========================================================================

    fn lookup(&self, page_num: PageNum) -> Option<FrameId> {
        self.page_table.read().get(&page_num).copied()
    }

    fn fetch_page_internal(&self, page_num: PageNum) -> Result<FrameId> {
        if let Some(frame_id) = self.lookup(page_num) {
            self.handle_cache_hit(frame_id);
            return Ok(frame_id);
        }
        self.handle_cache_miss(page_num)
    }

    fn handle_cache_hit(&self, frame_id: FrameId) {
        self.frames[frame_id.0].pin();
        {
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id);
            replacer.set_evictable(frame_id, false);
        }
        BufferStats::bump(&self.stats.cache_hits);
    }

    fn handle_cache_miss(&self, page_num: PageNum) -> Result<FrameId> {
        BufferStats::bump(&self.stats.cache_misses);

        let frame_id = self.get_free_frame()?;

        let page = match self.page_file.lock().get_this_page(page_num) {
            Ok(page) => page,
            Err(e) => {
                self.free_list.lock().push(frame_id);
                return Err(e);
            }
        };
        BufferStats::bump(&self.stats.pages_read);

        let frame = &self.frames[frame_id.0];
        frame.load(page);
        frame.pin();

        self.page_table.write().insert(page_num, frame_id);
        {
            let mut replacer = self.replacer.lock();
            replacer.record_access(frame_id);
            replacer.set_evictable(frame_id, false);
        }

        Ok(frame_id)
    }

    // ========================================================================
    // Internal: Frame allocation and eviction
    // ========================================================================

    fn get_free_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.lock().pop() {
            return Ok(frame_id);
        }
        self.evict_page()
    }

    fn evict_page(&self) -> Result<FrameId> {
        let frame_id = self.replacer.lock().evict().ok_or(Error::NoFreeFrames)?;

        let frame = &self.frames[frame_id.0];
        let old_page = frame.page_num();

        if let Some(page_num) = old_page {
            if let Err(e) = self.flush_frame(frame_id, page_num) {
                // Put the victim back so the dirty page is not lost.
                let mut replacer = self.replacer.lock();
                replacer.record_access(frame_id);
                replacer.set_evictable(frame_id, true);
                return Err(e);
            }
            self.page_table.write().remove(&page_num);
        }

        frame.reset();
        BufferStats::bump(&self.stats.evictions);
        Ok(frame_id)
    }

    fn flush_frame(&self, frame_id: FrameId, page_num: PageNum) -> Result<()> {
        let frame = &self.frames[frame_id.0];

        if frame.is_dirty() {
            let page = frame.page();
            self.page_file.lock().force_page(page_num, &page)?;
            drop(page);

            frame.clear_dirty();
            BufferStats::bump(&self.stats.pages_written);
        }

        Ok(())
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all_pages() {
            warn!("buffer manager flush on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_bm(pool_size: usize) -> (BufferManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let pf = PageFile::create(dir.path().join("test.pf")).unwrap();
        (BufferManager::with_pool_size(pf, pool_size), dir)
    }

    #[test]
    fn test_allocate_page() {
        let (bm, _dir) = create_test_bm(10);

        let guard = bm.allocate_page().unwrap();
        assert_eq!(guard.page_num(), PageNum::new(1));
        drop(guard);

        let guard = bm.allocate_page().unwrap();
        assert_eq!(guard.page_num(), PageNum::new(2));
        assert_eq!(bm.file_page_count(), 3);
    }

    #[test]
    fn test_allocated_page_is_pinned_and_clean() {
        let (bm, _dir) = create_test_bm(10);

        let guard = bm.allocate_page().unwrap();
        let pn = guard.page_num();
        assert_eq!(bm.pin_count(pn), Some(1));
        assert_eq!(bm.is_dirty(pn), Some(false));
    }

    #[test]
    fn test_write_then_read() {
        let (bm, _dir) = create_test_bm(10);
        {
            let mut guard = bm.allocate_page().unwrap();
            guard.as_mut_slice()[0] = 0xAB;
        }

        let guard = bm.fetch_page_read(PageNum::new(1)).unwrap();
        assert_eq!(guard.as_slice()[0], 0xAB);
    }

    #[test]
    fn test_guard_drop_unpins() {
        let (bm, _dir) = create_test_bm(10);
        let pn = bm.allocate_page().unwrap().page_num();
        assert_eq!(bm.pin_count(pn), Some(0));

        let g1 = bm.fetch_page_read(pn).unwrap();
        let g2 = bm.fetch_page_read(pn).unwrap();
        assert_eq!(bm.pin_count(pn), Some(2));

        drop(g1);
        drop(g2);
        assert_eq!(bm.pin_count(pn), Some(0));
    }

    #[test]
    fn test_guard_released_on_error_path() {
        let (bm, _dir) = create_test_bm(10);
        let pn = bm.allocate_page().unwrap().page_num();

        fn read_then_fail(bm: &BufferManager, pn: PageNum) -> Result<u8> {
            let guard = bm.fetch_page_read(pn)?;
            let first = guard.as_slice()[0];
            bm.fetch_page_read(PageNum::new(99))?;
            Ok(first)
        }

        assert!(read_then_fail(&bm, pn).is_err());
        assert_eq!(bm.pin_count(pn), Some(0));
    }

    #[test]
    fn test_unlock_page_errors() {
        let (bm, _dir) = create_test_bm(10);
        let pn = bm.allocate_page().unwrap().page_num();

        assert!(matches!(bm.unlock_page(pn), Err(Error::PageNotPinned(_))));
        assert!(matches!(
            bm.unlock_page(PageNum::new(42)),
            Err(Error::PageNotCached(_))
        ));
    }

    #[test]
    fn test_unlock_does_not_clear_dirty() {
        let (bm, _dir) = create_test_bm(10);
        let pn = bm.allocate_page().unwrap().page_num();
        assert_eq!(bm.is_dirty(pn), Some(true));

        drop(bm.fetch_page_read(pn).unwrap());
        assert_eq!(bm.is_dirty(pn), Some(true));

        bm.flush_all_pages().unwrap();
        assert_eq!(bm.is_dirty(pn), Some(false));
    }

    #[test]
    fn test_mark_dirty() {
        let (bm, _dir) = create_test_bm(10);
        let pn = bm.allocate_page().unwrap().page_num();
        bm.flush_all_pages().unwrap();

        bm.mark_dirty(pn).unwrap();
        assert_eq!(bm.is_dirty(pn), Some(true));

        assert!(matches!(
            bm.mark_dirty(PageNum::new(7)),
            Err(Error::PageNotCached(_))
        ));
    }

    #[test]
    fn test_file_errors_pass_through() {
        let (bm, _dir) = create_test_bm(10);
        bm.allocate_page().unwrap();

        assert!(matches!(
            bm.fetch_page_read(PageNum::new(0)),
            Err(Error::InvalidPage(_))
        ));
        assert!(matches!(
            bm.fetch_page_read(PageNum::new(999)),
            Err(Error::EndOfFile(_))
        ));
        // Failed loads give their frame back.
        assert_eq!(bm.free_frame_count(), 9);
    }

    #[test]
    fn test_cache_hit() {
        let (bm, _dir) = create_test_bm(10);
        let pn = bm.allocate_page().unwrap().page_num();

        drop(bm.fetch_page_read(pn).unwrap());
        drop(bm.fetch_page_read(pn).unwrap());

        let snapshot = bm.stats().snapshot();
        assert_eq!(snapshot.cache_hits, 2);
        assert_eq!(snapshot.cache_misses, 0);
    }

    #[test]
    fn test_eviction() {
        let (bm, _dir) = create_test_bm(3);

        for _ in 0..3 {
            bm.allocate_page().unwrap();
        }
        assert_eq!(bm.free_frame_count(), 0);

        let guard = bm.allocate_page().unwrap();
        assert_eq!(guard.page_num(), PageNum::new(4));

        assert_eq!(bm.stats().snapshot().evictions, 1);
        // LRU victim was the first page.
        assert_eq!(bm.pin_count(PageNum::new(1)), None);
    }

    #[test]
    fn test_dirty_page_flushed_on_eviction() {
        let (bm, _dir) = create_test_bm(1);
        {
            let mut guard = bm.allocate_page().unwrap();
            guard.as_mut_slice()[0] = 0x42;
        }
        bm.allocate_page().unwrap();

        let guard = bm.fetch_page_read(PageNum::new(1)).unwrap();
        assert_eq!(guard.as_slice()[0], 0x42);
    }

    #[test]
    fn test_no_free_frames() {
        let (bm, _dir) = create_test_bm(2);

        let _g1 = bm.allocate_page().unwrap();
        let _g2 = bm.allocate_page().unwrap();

        assert!(matches!(bm.allocate_page(), Err(Error::NoFreeFrames)));
    }

    #[test]
    fn test_dispose_page() {
        let (bm, _dir) = create_test_bm(10);
        let pn = bm.allocate_page().unwrap().page_num();

        bm.dispose_page(pn).unwrap();

        assert_eq!(bm.cached_page_count(), 0);
        assert_eq!(bm.free_frame_count(), 10);
        assert!(matches!(bm.fetch_page_read(pn), Err(Error::PageFree(_))));
        assert_eq!(bm.stats().snapshot().pages_disposed, 1);
    }

    #[test]
    fn test_dispose_pinned_page_fails() {
        let (bm, _dir) = create_test_bm(10);
        let guard = bm.allocate_page().unwrap();

        assert!(matches!(
            bm.dispose_page(guard.page_num()),
            Err(Error::PagePinned(_))
        ));
    }

    #[test]
    fn test_flush_page() {
        let (bm, _dir) = create_test_bm(10);
        {
            let mut guard = bm.allocate_page().unwrap();
            guard.as_mut_slice()[0] = 0xFF;
        }

        bm.flush_page(PageNum::new(1)).unwrap();
        assert_eq!(bm.stats().snapshot().pages_written, 1);

        // Clean now, nothing more to write.
        bm.flush_page(PageNum::new(1)).unwrap();
        assert_eq!(bm.stats().snapshot().pages_written, 1);
    }

    #[test]
    fn test_concurrent_reads() {
        use std::sync::Arc;
        use std::thread;

        let (bm, _dir) = create_test_bm(10);
        let bm = Arc::new(bm);
        {
            let mut guard = bm.allocate_page().unwrap();
            guard.as_mut_slice()[0] = 0x42;
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bm = Arc::clone(&bm);
                thread::spawn(move || {
                    let guard = bm.fetch_page_read(PageNum::new(1)).unwrap();
                    assert_eq!(guard.as_slice()[0], 0x42);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(bm.pin_count(PageNum::new(1)), Some(0));
    }
}
