//! Index handle - insert, delete and lookup on one open B+tree index.
//!
//! Internal entries carry the largest key of their child's subtree, so
//! descent follows the first child whose key is `>=` the search key and
//! falls back to the last child when the key is larger than everything.
//! Inserting a new maximum rewrites the last key along the rightmost path.

use std::cmp::Ordering;

use log::{debug, warn};

use crate::buffer::BufferManager;
use crate::common::config::Config;
use crate::common::{AttrType, Error, PageNum, RecordId, Result};
use crate::storage::PageFile;

use super::index_header::IndexHeader;
use super::node::{BpTreeNode, NodeKind};

/// Page holding the index header.
pub const INDEX_HEADER_PAGE: PageNum = PageNum(1);

/// One internal level of a descent: the node visited and the entry taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathEntry {
    pub page: PageNum,
    pub slot: usize,
}

/// How to pick a child at each internal level.
#[derive(Debug, Clone, Copy)]
enum Descent<'k> {
    /// Rightmost exact match, else first larger key: where an insert goes.
    Fit(&'k [u8]),
    /// First key `>=` the search key: where a run of equal keys starts.
    LowerBound(&'k [u8]),
    Leftmost,
    Rightmost,
}

/// An open B+tree index over fixed-length keys.
///
/// Nodes are loaded into owned [`BpTreeNode`]s and written back explicitly,
/// so no page is pinned between calls.
///
/// # Example
/// ```no_run
/// use microsql::index::IndexManager;
/// use microsql::{AttrType, Config, PageNum, RecordId};
///
/// let im = IndexManager::new(Config::new("/tmp/db"));
/// im.create_index("people", 0, AttrType::Int, 4)?;
///
/// let mut index = im.open_index("people", 0)?;
/// let rid = RecordId::new(PageNum::new(2), 0);
/// index.insert_entry(&42i32.to_le_bytes(), rid)?;
/// assert_eq!(index.search(&42i32.to_le_bytes())?, vec![rid]);
/// im.close_index(index)?;
/// # Ok::<(), microsql::Error>(())
/// ```
pub struct IndexHandle {
    bm: BufferManager,
    header: IndexHeader,
    /// In-memory header differs from page 1.
    header_modified: bool,
    /// Largest key in the tree, `None` when empty.
    largest_key: Option<Vec<u8>>,
    /// Internal levels of the most recent descent, root first.
    path: Vec<PathEntry>,
}

impl IndexHandle {
    /// Write the header of an empty index into a fresh page file.
    pub(crate) fn create(page_file: PageFile, header: IndexHeader, config: &Config) -> Result<()> {
        if page_file.page_count() != 1 {
            return Err(Error::InvalidIndex(format!(
                "{} is not empty",
                page_file.path().display()
            )));
        }
        let bm = BufferManager::new(page_file, config);
        {
            let mut guard = bm.allocate_page()?;
            debug_assert_eq!(guard.page_num(), INDEX_HEADER_PAGE);
            header.write_to(guard.as_mut_slice());
        }
        bm.close()
    }

    /// Read the header and resolve the root, creating a root leaf for an
    /// empty index.
    pub(crate) fn open(page_file: PageFile, config: &Config) -> Result<Self> {
        let bm = BufferManager::new(page_file, config);
        let header = {
            let guard = bm.fetch_page_read(INDEX_HEADER_PAGE).map_err(|e| match e {
                Error::EndOfFile(_) => Error::InvalidIndex("missing header page".into()),
                other => other,
            })?;
            IndexHeader::from_bytes(guard.as_slice())?
        };

        let mut handle = Self {
            bm,
            header,
            header_modified: false,
            largest_key: None,
            path: Vec::new(),
        };

        if handle.header.height == 0 {
            let root = handle.allocate_node(NodeKind::Leaf)?;
            handle.header.root = root.page();
            handle.header.height = 1;
            handle.header_modified = true;
            debug!("index: created root leaf {}", root.page());
        } else {
            let leaf = handle.find_largest_leaf()?;
            handle.largest_key = leaf.largest_key().map(<[u8]>::to_vec);
        }
        Ok(handle)
    }

    // ========================================================================
    // Insert
    // ========================================================================

    /// Add the entry `(key, rid)`.
    ///
    /// Equal keys with different rids are allowed; a new entry goes after
    /// the existing ones.
    ///
    /// # Errors
    /// - `Error::BadKey` if the key length is wrong
    /// - `Error::EntryExists` if the exact pair is already indexed
    pub fn insert_entry(&mut self, key: &[u8], rid: RecordId) -> Result<()> {
        self.check_key(key)?;
        if self.locate_entry(key, rid)?.is_some() {
            return Err(Error::EntryExists(rid));
        }

        let attr_type = self.header.attr_type;
        let new_max = self
            .largest_key
            .as_deref()
            .map_or(true, |max| attr_type.compare(key, max) == Ordering::Greater);

        let mut node = self.find_leaf(key)?;
        let path = self.path.clone();
        let mut level = path.len();

        let mut pending_key = key.to_vec();
        let mut pending_rid = rid;
        // Internal levels insert by position to keep child order.
        let mut pending_pos: Option<usize> = None;

        loop {
            let inserted = match pending_pos {
                None => node.insert(&pending_key, pending_rid).map(|_| ()),
                Some(pos) => node.insert_at(pos, &pending_key, pending_rid),
            };
            match inserted {
                Ok(()) => {
                    self.store_node(&node)?;
                    break;
                }
                Err(Error::NodeKeysFull(_)) => {}
                Err(e) => return Err(e),
            }

            let mut sibling = self.allocate_node(node.kind())?;
            node.split(&mut sibling)?;
            self.relink_prev(sibling.next(), sibling.page())?;
            debug!("index: split {} into {}", node.page(), sibling.page());

            match pending_pos {
                None => {
                    let goes_right = node
                        .largest_key()
                        .map_or(true, |max| attr_type.compare(&pending_key, max) != Ordering::Less);
                    if goes_right {
                        sibling.insert(&pending_key, pending_rid)?;
                    } else {
                        node.insert(&pending_key, pending_rid)?;
                    }
                }
                Some(pos) => {
                    let keep = node.num_keys();
                    if pos < keep {
                        node.insert_at(pos, &pending_key, pending_rid)?;
                    } else {
                        sibling.insert_at(pos - keep, &pending_key, pending_rid)?;
                    }
                }
            }

            if level == 0 {
                let mut root = self.allocate_node(NodeKind::Internal)?;
                root.insert_at(0, largest(&node)?, RecordId::child(node.page()))?;
                root.insert_at(1, largest(&sibling)?, RecordId::child(sibling.page()))?;
                node.set_parent(root.page());
                sibling.set_parent(root.page());

                self.store_node(&node)?;
                self.store_node(&sibling)?;
                self.store_node(&root)?;
                self.reparent_children(&sibling)?;

                self.header.root = root.page();
                self.header.height += 1;
                self.header_modified = true;
                debug!(
                    "index: new root {}, height {}",
                    root.page(),
                    self.header.height
                );
                break;
            }

            self.store_node(&node)?;
            self.store_node(&sibling)?;
            self.reparent_children(&sibling)?;

            level -= 1;
            let entry = path[level];
            let mut parent = self.load_node(entry.page)?;
            parent.set_key(entry.slot, largest(&node)?)?;

            pending_key = largest(&sibling)?.to_vec();
            pending_rid = RecordId::child(sibling.page());
            pending_pos = Some(entry.slot + 1);
            node = parent;
        }

        if new_max {
            self.refresh_rightmost(key)?;
            self.largest_key = Some(key.to_vec());
        }
        Ok(())
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Remove the entry `(key, rid)`.
    ///
    /// An underflowing node borrows from its left sibling, else its right
    /// one, else merges with a neighbour. An internal root left with one
    /// child is replaced by that child.
    ///
    /// # Errors
    /// - `Error::BadKey` if the key length is wrong
    /// - `Error::KeyNotFound` if the pair is not indexed
    pub fn delete_entry(&mut self, key: &[u8], rid: RecordId) -> Result<()> {
        self.check_key(key)?;
        let (mut node, pos) = self.locate_entry(key, rid)?.ok_or(Error::KeyNotFound)?;
        let path = self.path_to(&node)?;
        node.delete_at(pos)?;

        let mut level = path.len();
        while level > 0 {
            level -= 1;
            let entry = path[level];
            let mut parent = self.load_node(entry.page)?;

            if node.num_keys() < node.min_keys() {
                self.rebalance(node, &mut parent, entry.slot)?;
            } else {
                parent.set_key(entry.slot, largest(&node)?)?;
                self.store_node(&node)?;
            }
            node = parent;
        }
        self.settle_root(node)?;

        self.path = path;
        self.largest_key = self
            .find_largest_leaf()?
            .largest_key()
            .map(<[u8]>::to_vec);
        Ok(())
    }

    /// Restore occupancy of `node`, the child at `slot` of `parent`.
    ///
    /// Writes `node` and any sibling it touches; `parent` is left to the
    /// caller.
    fn rebalance(
        &mut self,
        mut node: BpTreeNode,
        parent: &mut BpTreeNode,
        slot: usize,
    ) -> Result<()> {
        let min = node.min_keys();
        let mut left = if slot > 0 {
            Some(self.load_node(parent.child(slot - 1))?)
        } else {
            None
        };
        let mut right = if slot + 1 < parent.num_keys() {
            Some(self.load_node(parent.child(slot + 1))?)
        } else {
            None
        };

        if let Some(left) = left.as_mut().filter(|l| l.num_keys() > min) {
            let (key, rid) = left.delete_at(left.num_keys() - 1)?;
            node.insert_at(0, &key, rid)?;
            self.adopt(&node, rid.page)?;
            parent.set_key(slot - 1, largest(left)?)?;
            parent.set_key(slot, largest(&node)?)?;
            self.store_node(left)?;
            return self.store_node(&node);
        }

        if let Some(right) = right.as_mut().filter(|r| r.num_keys() > min) {
            let (key, rid) = right.delete_at(0)?;
            node.insert_at(node.num_keys(), &key, rid)?;
            self.adopt(&node, rid.page)?;
            parent.set_key(slot, largest(&node)?)?;
            self.store_node(right)?;
            return self.store_node(&node);
        }

        match (left, right) {
            (Some(mut left), _) => {
                left.merge(&mut node)?;
                self.relink_prev(left.next(), left.page())?;
                self.reparent_children(&left)?;
                parent.delete_at(slot)?;
                parent.set_key(slot - 1, largest(&left)?)?;
                self.store_node(&left)?;
                self.dispose_node(node.page())?;
                debug!("index: merged {} into {}", node.page(), left.page());
            }
            (None, Some(mut right)) => {
                node.merge(&mut right)?;
                self.relink_prev(node.next(), node.page())?;
                self.reparent_children(&node)?;
                parent.delete_at(slot + 1)?;
                parent.set_key(slot, largest(&node)?)?;
                self.store_node(&node)?;
                self.dispose_node(right.page())?;
                debug!("index: merged {} into {}", right.page(), node.page());
            }
            (None, None) => {
                return Err(Error::InvalidIndex(format!(
                    "{} has no sibling under {}",
                    node.page(),
                    parent.page()
                )));
            }
        }
        Ok(())
    }

    /// Write back the root, collapsing it if only one child is left.
    fn settle_root(&mut self, root: BpTreeNode) -> Result<()> {
        if root.is_leaf() || root.num_keys() != 1 {
            return self.store_node(&root);
        }

        let mut child = self.load_node(root.child(0))?;
        child.set_parent(PageNum::INVALID);
        self.store_node(&child)?;

        self.header.root = child.page();
        self.header.height -= 1;
        self.header_modified = true;
        self.dispose_node(root.page())?;

        debug!(
            "index: root {} collapsed into {}, height {}",
            root.page(),
            child.page(),
            self.header.height
        );
        Ok(())
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Rids of every entry with `key`, in leaf-chain order.
    pub fn search(&self, key: &[u8]) -> Result<Vec<RecordId>> {
        self.check_key(key)?;
        let mut rids = Vec::new();
        self.walk_run(key, |rid| {
            rids.push(rid);
            false
        })?;
        Ok(rids)
    }

    /// Whether the exact pair `(key, rid)` is indexed.
    pub fn contains_entry(&self, key: &[u8], rid: RecordId) -> Result<bool> {
        self.check_key(key)?;
        Ok(self.locate_entry(key, rid)?.is_some())
    }

    /// Leaf where `key` would be inserted. Records the descent in
    /// [`path`](Self::path).
    pub fn find_leaf(&mut self, key: &[u8]) -> Result<BpTreeNode> {
        self.check_key(key)?;
        let (leaf, path) = self.descend(Descent::Fit(key))?;
        self.path = path;
        Ok(leaf)
    }

    /// Rightmost leaf.
    pub fn find_largest_leaf(&self) -> Result<BpTreeNode> {
        Ok(self.descend(Descent::Rightmost)?.0)
    }

    /// Leftmost leaf.
    pub fn find_smallest_leaf(&self) -> Result<BpTreeNode> {
        Ok(self.descend(Descent::Leftmost)?.0)
    }

    /// First leaf that may hold `key`.
    pub(crate) fn find_first_leaf_for(&self, key: &[u8]) -> Result<BpTreeNode> {
        Ok(self.descend(Descent::LowerBound(key))?.0)
    }

    /// Decode the node stored on `page`.
    pub fn load_node(&self, page: PageNum) -> Result<BpTreeNode> {
        let guard = self.bm.fetch_page_read(page)?;
        let node = BpTreeNode::from_bytes(guard.as_slice())?;
        if node.page() != page {
            return Err(Error::InvalidIndex(format!(
                "{} holds the node of {}",
                page,
                node.page()
            )));
        }
        Ok(node)
    }

    // ========================================================================
    // Verification
    // ========================================================================

    /// Walk the whole tree and check its structure.
    ///
    /// # Errors
    /// `Error::InvalidIndex` naming the first violation found.
    pub fn check_invariants(&self) -> Result<()> {
        let height = self.header.height as usize;
        let root = self.load_node(self.header.root)?;
        if root.parent().is_valid() {
            return Err(violation(format!("root {} has a parent", root.page())));
        }
        if !root.is_leaf() && root.num_keys() < 2 {
            return Err(violation(format!(
                "internal root {} has {} children",
                root.page(),
                root.num_keys()
            )));
        }

        let mut levels: Vec<Vec<(PageNum, PageNum, PageNum)>> = vec![Vec::new(); height];
        let mut count = 0u64;
        let max = self.check_subtree(root, 0, &mut levels, &mut count)?;

        for (depth, level) in levels.iter().enumerate() {
            for (i, &(page, prev, next)) in level.iter().enumerate() {
                let want_prev = if i == 0 { PageNum::INVALID } else { level[i - 1].0 };
                let want_next = level.get(i + 1).map_or(PageNum::INVALID, |e| e.0);
                if prev != want_prev || next != want_next {
                    return Err(violation(format!(
                        "level {}: {} links to ({}, {}), expected ({}, {})",
                        depth, page, prev, next, want_prev, want_next
                    )));
                }
            }
        }

        if count != self.header.num_pages {
            return Err(violation(format!(
                "{} nodes reachable, header counts {}",
                count, self.header.num_pages
            )));
        }

        let tracked = self.largest_key.as_deref();
        let agrees = match (max.as_deref(), tracked) {
            (None, None) => true,
            (Some(a), Some(b)) => self.compare(a, b) == Ordering::Equal,
            _ => false,
        };
        if !agrees {
            return Err(violation("tracked largest key is stale".into()));
        }
        Ok(())
    }

    fn check_subtree(
        &self,
        node: BpTreeNode,
        depth: usize,
        levels: &mut Vec<Vec<(PageNum, PageNum, PageNum)>>,
        count: &mut u64,
    ) -> Result<Option<Vec<u8>>> {
        *count += 1;
        let height = levels.len();
        if node.is_leaf() != (depth + 1 == height) {
            return Err(violation(format!(
                "{} at depth {} of a height {} tree",
                node.page(),
                depth,
                height
            )));
        }
        if !node.is_sorted() {
            return Err(violation(format!("{} is not sorted", node.page())));
        }
        if depth > 0 && node.num_keys() < node.min_keys() {
            return Err(violation(format!(
                "{} holds {} keys, minimum is {}",
                node.page(),
                node.num_keys(),
                node.min_keys()
            )));
        }
        levels[depth].push((node.page(), node.prev(), node.next()));

        if node.is_leaf() {
            return Ok(node.largest_key().map(<[u8]>::to_vec));
        }

        for i in 0..node.num_keys() {
            let child = self.load_node(node.child(i))?;
            if child.parent() != node.page() {
                return Err(violation(format!(
                    "{} names parent {}, listed under {}",
                    child.page(),
                    child.parent(),
                    node.page()
                )));
            }
            let child_page = child.page();
            let child_max = self.check_subtree(child, depth + 1, levels, count)?;
            let routed = match child_max {
                Some(max) => self.compare(&max, node.key(i)) == Ordering::Equal,
                None => false,
            };
            if !routed {
                return Err(violation(format!(
                    "entry {} of {} is not the maximum of {}",
                    i,
                    node.page(),
                    child_page
                )));
            }
        }
        Ok(node.largest_key().map(<[u8]>::to_vec))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Write the header and every dirty node back to the file.
    pub fn force_pages(&mut self) -> Result<()> {
        self.write_header()?;
        self.bm.flush_all_pages()
    }

    /// Flush everything and sync the file.
    pub fn close(mut self) -> Result<()> {
        self.force_pages()?;
        self.bm.page_file().sync()?;
        debug!(
            "closed index {}: height {}, {} nodes",
            self.bm.page_file().path().display(),
            self.header.height,
            self.header.num_pages
        );
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[inline]
    pub fn height(&self) -> u32 {
        self.header.height
    }

    #[inline]
    pub fn root_page(&self) -> PageNum {
        self.header.root
    }

    /// Node order.
    #[inline]
    pub fn max_keys(&self) -> usize {
        self.header.max_keys
    }

    #[inline]
    pub fn attr_type(&self) -> AttrType {
        self.header.attr_type
    }

    #[inline]
    pub fn attr_len(&self) -> usize {
        self.header.attr_len
    }

    /// Node pages in use.
    #[inline]
    pub fn num_pages(&self) -> u64 {
        self.header.num_pages
    }

    pub fn largest_key(&self) -> Option<&[u8]> {
        self.largest_key.as_deref()
    }

    /// Internal levels of the most recent descent, root first.
    pub fn path(&self) -> &[PathEntry] {
        &self.path
    }

    /// The buffer manager backing this index.
    pub fn buffer(&self) -> &BufferManager {
        &self.bm
    }

    // ========================================================================
    // Internal
    // ========================================================================

    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.header.attr_type.compare(a, b)
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.header.attr_len {
            return Err(Error::BadKey {
                expected: self.header.attr_len,
                actual: key.len(),
            });
        }
        Ok(())
    }

    fn descend(&self, how: Descent<'_>) -> Result<(BpTreeNode, Vec<PathEntry>)> {
        let mut path = Vec::with_capacity(self.header.height as usize);
        let mut node = self.load_node(self.header.root)?;

        while !node.is_leaf() {
            let last = node.num_keys().checked_sub(1).ok_or_else(|| {
                Error::InvalidIndex(format!("internal node {} is empty", node.page()))
            })?;
            let slot = match how {
                Descent::Fit(key) => node.find_key_pos_fit(key).map_or(last, |i| i.min(last)),
                Descent::LowerBound(key) => node.lower_bound(key).min(last),
                Descent::Leftmost => 0,
                Descent::Rightmost => last,
            };
            path.push(PathEntry {
                page: node.page(),
                slot,
            });
            node = self.load_node(node.child(slot))?;
        }
        Ok((node, path))
    }

    /// Visit the rids of the run of entries equal to `key` until `visit`
    /// returns true. Returns the leaf and position where it stopped.
    fn walk_run<F>(&self, key: &[u8], mut visit: F) -> Result<Option<(BpTreeNode, usize)>>
    where
        F: FnMut(RecordId) -> bool,
    {
        let mut leaf = self.find_first_leaf_for(key)?;
        let mut pos = leaf.lower_bound(key);
        loop {
            while pos < leaf.num_keys() {
                match self.compare(leaf.key(pos), key) {
                    Ordering::Greater => return Ok(None),
                    Ordering::Equal if visit(leaf.rid(pos)) => return Ok(Some((leaf, pos))),
                    _ => pos += 1,
                }
            }
            if !leaf.next().is_valid() {
                return Ok(None);
            }
            leaf = self.load_node(leaf.next())?;
            pos = 0;
        }
    }

    /// Leaf and position of the exact pair `(key, rid)`.
    fn locate_entry(&self, key: &[u8], rid: RecordId) -> Result<Option<(BpTreeNode, usize)>> {
        self.walk_run(key, |found| found == rid)
    }

    /// Internal levels from the root down to `node`, via parent links.
    fn path_to(&self, node: &BpTreeNode) -> Result<Vec<PathEntry>> {
        let mut path = Vec::new();
        let mut child = node.page();
        let mut parent_page = node.parent();

        while parent_page.is_valid() {
            if path.len() >= self.header.height as usize {
                return Err(Error::InvalidIndex(format!(
                    "parent chain of {} is longer than the tree",
                    node.page()
                )));
            }
            let parent = self.load_node(parent_page)?;
            let slot = parent.position_of_child(child).ok_or_else(|| {
                Error::InvalidIndex(format!("{} does not list child {}", parent_page, child))
            })?;
            path.push(PathEntry {
                page: parent_page,
                slot,
            });
            child = parent_page;
            parent_page = parent.parent();
        }

        if child != self.header.root {
            return Err(Error::InvalidIndex(format!(
                "parent chain of {} ends at {}, root is {}",
                node.page(),
                child,
                self.header.root
            )));
        }
        path.reverse();
        Ok(path)
    }

    /// Set the last key of every internal node on the rightmost path.
    fn refresh_rightmost(&self, key: &[u8]) -> Result<()> {
        let mut node = self.load_node(self.header.root)?;
        while !node.is_leaf() {
            let last = node.num_keys().checked_sub(1).ok_or_else(|| {
                Error::InvalidIndex(format!("internal node {} is empty", node.page()))
            })?;
            if self.compare(node.key(last), key) != Ordering::Equal {
                node.set_key(last, key)?;
                self.store_node(&node)?;
            }
            node = self.load_node(node.child(last))?;
        }
        Ok(())
    }

    /// Point every child of `node` back at it.
    fn reparent_children(&self, node: &BpTreeNode) -> Result<()> {
        if node.is_leaf() {
            return Ok(());
        }
        for i in 0..node.num_keys() {
            self.adopt(node, node.child(i))?;
        }
        Ok(())
    }

    fn adopt(&self, node: &BpTreeNode, child: PageNum) -> Result<()> {
        if node.is_leaf() {
            return Ok(());
        }
        let mut child = self.load_node(child)?;
        if child.parent() != node.page() {
            child.set_parent(node.page());
            self.store_node(&child)?;
        }
        Ok(())
    }

    /// Point `page`'s `prev` link at `prev`, if `page` exists.
    fn relink_prev(&self, page: PageNum, prev: PageNum) -> Result<()> {
        if !page.is_valid() {
            return Ok(());
        }
        let mut node = self.load_node(page)?;
        node.set_prev(prev);
        self.store_node(&node)
    }

    fn store_node(&self, node: &BpTreeNode) -> Result<()> {
        let mut guard = self.bm.fetch_page_write(node.page())?;
        node.write_to(guard.as_mut_slice());
        Ok(())
    }

    fn allocate_node(&mut self, kind: NodeKind) -> Result<BpTreeNode> {
        let node = {
            let mut guard = self.bm.allocate_page()?;
            let node = BpTreeNode::new(
                kind,
                guard.page_num(),
                self.header.attr_type,
                self.header.attr_len,
                self.header.max_keys,
            );
            node.write_to(guard.as_mut_slice());
            node
        };
        self.header.num_pages += 1;
        self.header_modified = true;
        Ok(node)
    }

    fn dispose_node(&mut self, page: PageNum) -> Result<()> {
        self.bm.dispose_page(page)?;
        self.header.num_pages = self.header.num_pages.saturating_sub(1);
        self.header_modified = true;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        if !self.header_modified {
            return Ok(());
        }
        let mut guard = self.bm.fetch_page_write(INDEX_HEADER_PAGE)?;
        self.header.write_to(guard.as_mut_slice());
        drop(guard);
        self.header_modified = false;
        Ok(())
    }
}

impl Drop for IndexHandle {
    fn drop(&mut self) {
        if let Err(e) = self.write_header() {
            warn!("failed to save index header on drop: {}", e);
        }
    }
}

fn largest(node: &BpTreeNode) -> Result<&[u8]> {
    node.largest_key()
        .ok_or_else(|| Error::InvalidIndex(format!("{} is empty", node.page())))
}

fn violation(msg: String) -> Error {
    Error::InvalidIndex(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_index(dir: &std::path::Path, max_keys: usize) -> IndexHandle {
        let config = Config::new(dir);
        let pf = PageFile::create(dir.join("t.0")).unwrap();
        IndexHandle::create(pf, IndexHeader::new(AttrType::Int, 4, max_keys), &config).unwrap();
        IndexHandle::open(PageFile::open(dir.join("t.0")).unwrap(), &config).unwrap()
    }

    fn k(v: i32) -> [u8; 4] {
        v.to_le_bytes()
    }

    fn rid(v: i32) -> RecordId {
        RecordId::new(PageNum::new(2 + v as u64 / 40), v as u32 % 40)
    }

    #[test]
    fn test_open_creates_root_leaf() {
        let dir = tempdir().unwrap();
        let index = open_index(dir.path(), 5);
        assert_eq!(index.height(), 1);
        assert_eq!(index.num_pages(), 1);
        assert!(index.load_node(index.root_page()).unwrap().is_leaf());
        assert_eq!(index.largest_key(), None);
        index.check_invariants().unwrap();
    }

    #[test]
    fn test_root_split() {
        let dir = tempdir().unwrap();
        let mut index = open_index(dir.path(), 5);
        for v in 1..=5 {
            index.insert_entry(&k(v), rid(v)).unwrap();
        }

        assert_eq!(index.height(), 2);
        let root = index.load_node(index.root_page()).unwrap();
        assert_eq!(root.num_keys(), 2);
        assert_eq!(root.key(1), &k(5));
        index.check_invariants().unwrap();
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let dir = tempdir().unwrap();
        let mut index = open_index(dir.path(), 5);
        index.insert_entry(&k(3), rid(1)).unwrap();
        index.insert_entry(&k(3), rid(2)).unwrap();
        assert!(matches!(
            index.insert_entry(&k(3), rid(1)),
            Err(Error::EntryExists(_))
        ));
        assert_eq!(index.search(&k(3)).unwrap(), vec![rid(1), rid(2)]);
    }

    #[test]
    fn test_bad_key() {
        let dir = tempdir().unwrap();
        let mut index = open_index(dir.path(), 5);
        assert!(matches!(
            index.insert_entry(b"xy", rid(0)),
            Err(Error::BadKey { .. })
        ));
        assert!(matches!(
            index.delete_entry(b"xyzzy", rid(0)),
            Err(Error::BadKey { .. })
        ));
    }

    #[test]
    fn test_delete_missing_entry() {
        let dir = tempdir().unwrap();
        let mut index = open_index(dir.path(), 5);
        index.insert_entry(&k(1), rid(1)).unwrap();
        assert!(matches!(
            index.delete_entry(&k(1), rid(2)),
            Err(Error::KeyNotFound)
        ));
        assert!(matches!(
            index.delete_entry(&k(2), rid(1)),
            Err(Error::KeyNotFound)
        ));
    }

    #[test]
    fn test_delete_collapses_root() {
        let dir = tempdir().unwrap();
        let mut index = open_index(dir.path(), 5);
        for v in 1..=5 {
            index.insert_entry(&k(v), rid(v)).unwrap();
        }
        assert_eq!(index.height(), 2);

        for v in 1..=4 {
            index.delete_entry(&k(v), rid(v)).unwrap();
            index.check_invariants().unwrap();
        }
        assert_eq!(index.height(), 1);
        assert_eq!(index.num_pages(), 1);
        assert_eq!(index.largest_key(), Some(&k(5)[..]));
    }

    #[test]
    fn test_path_follows_descent() {
        let dir = tempdir().unwrap();
        let mut index = open_index(dir.path(), 5);
        for v in 0..40 {
            index.insert_entry(&k(v), rid(v)).unwrap();
        }
        let leaf = index.find_leaf(&k(17)).unwrap();
        assert_eq!(index.path().len(), index.height() as usize - 1);
        assert_eq!(index.path()[0].page, index.root_page());
        assert!(leaf.find_key(&k(17), None).is_some());
    }
}
