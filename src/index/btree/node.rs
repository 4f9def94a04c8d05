//! B+tree node - one page of an index file, decoded into owned arrays.
//!
//! Leaves and internal nodes share one layout. Every entry is a `(key, rid)`
//! pair: in a leaf the rid addresses an indexed record, in an internal node
//! its page is a child and its key is the largest key in that child's
//! subtree.
//!
//! Nodes are copies. Changing one does nothing to the page until the owner
//! writes it back with [`BpTreeNode::write_to`].

use std::cmp::Ordering;

use crate::common::config::PAGE_SIZE;
use crate::common::{AttrType, Error, PageNum, RecordId, Result};

/// Size of the node header at the start of the page data.
pub const NODE_HEADER_SIZE: usize = 48;

/// Smallest node order an index accepts.
pub const MIN_ORDER: usize = 5;

const LEAF_TAG: u8 = b'L';
const INTERNAL_TAG: u8 = b'I';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Internal,
}

impl NodeKind {
    fn tag(self) -> u8 {
        match self {
            NodeKind::Leaf => LEAF_TAG,
            NodeKind::Internal => INTERNAL_TAG,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            LEAF_TAG => Some(NodeKind::Leaf),
            INTERNAL_TAG => Some(NodeKind::Internal),
            _ => None,
        }
    }
}

/// Largest node order a page can hold for `attr_len`-byte keys.
#[inline]
pub const fn max_keys_for(attr_len: usize) -> usize {
    (PAGE_SIZE - NODE_HEADER_SIZE) / (attr_len + RecordId::SIZE)
}

/// An order-`max_keys` B+tree node.
///
/// # Layout
/// ```text
/// Offset  Size  Field
/// 0       1     tag ('L' or 'I')
/// 1       1     attr_type
/// 2       2     (padding)
/// 4       4     max_keys
/// 8       4     num_keys
/// 12      4     attr_len
/// 16      8     parent
/// 24      8     page
/// 32      8     prev (same-level neighbour)
/// 40      8     next (same-level neighbour)
/// 48      ...   keys[num_keys], then rids[num_keys]
/// ```
///
/// A node holds at most `max_keys - 1` entries, kept in non-decreasing key
/// order. Equal keys stay in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct BpTreeNode {
    kind: NodeKind,
    attr_type: AttrType,
    attr_len: usize,
    max_keys: usize,
    parent: PageNum,
    page: PageNum,
    prev: PageNum,
    next: PageNum,
    keys: Vec<Vec<u8>>,
    rids: Vec<RecordId>,
}

impl BpTreeNode {
    /// Create an empty, unlinked node for `page`.
    pub fn new(
        kind: NodeKind,
        page: PageNum,
        attr_type: AttrType,
        attr_len: usize,
        max_keys: usize,
    ) -> Self {
        Self {
            kind,
            attr_type,
            attr_len,
            max_keys,
            parent: PageNum::INVALID,
            page,
            prev: PageNum::INVALID,
            next: PageNum::INVALID,
            keys: Vec::new(),
            rids: Vec::new(),
        }
    }

    /// Decode a node from page data.
    ///
    /// # Errors
    /// `Error::InvalidIndex` if the header is not a node header or its
    /// counts do not fit the page.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let kind = NodeKind::from_tag(data[0])
            .ok_or_else(|| Error::InvalidIndex(format!("bad node tag {:#04x}", data[0])))?;
        let attr_type = AttrType::from_u8(data[1])
            .ok_or_else(|| Error::InvalidIndex(format!("bad attribute type {}", data[1])))?;
        let u32_at = |at: usize| {
            u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]) as usize
        };
        let max_keys = u32_at(4);
        let num_keys = u32_at(8);
        let attr_len = u32_at(12);

        if attr_len == 0 || max_keys < 3 || max_keys > max_keys_for(attr_len) {
            return Err(Error::InvalidIndex(format!(
                "node order {} does not fit {}-byte keys",
                max_keys, attr_len
            )));
        }
        if num_keys >= max_keys {
            return Err(Error::InvalidIndex(format!(
                "node holds {} keys, order is {}",
                num_keys, max_keys
            )));
        }

        let keys_at = NODE_HEADER_SIZE;
        let rids_at = keys_at + num_keys * attr_len;
        let keys = (0..num_keys)
            .map(|i| data[keys_at + i * attr_len..keys_at + (i + 1) * attr_len].to_vec())
            .collect();
        let rids = (0..num_keys)
            .map(|i| RecordId::from_bytes(&data[rids_at + i * RecordId::SIZE..]))
            .collect();

        Ok(Self {
            kind,
            attr_type,
            attr_len,
            max_keys,
            parent: PageNum::from_le_slice(&data[16..24]),
            page: PageNum::from_le_slice(&data[24..32]),
            prev: PageNum::from_le_slice(&data[32..40]),
            next: PageNum::from_le_slice(&data[40..48]),
            keys,
            rids,
        })
    }

    /// Encode the node into page data.
    pub fn write_to(&self, data: &mut [u8]) {
        data[0] = self.kind.tag();
        data[1] = self.attr_type as u8;
        data[2..4].fill(0);
        data[4..8].copy_from_slice(&(self.max_keys as u32).to_le_bytes());
        data[8..12].copy_from_slice(&(self.keys.len() as u32).to_le_bytes());
        data[12..16].copy_from_slice(&(self.attr_len as u32).to_le_bytes());
        data[16..24].copy_from_slice(&self.parent.to_le_bytes());
        data[24..32].copy_from_slice(&self.page.to_le_bytes());
        data[32..40].copy_from_slice(&self.prev.to_le_bytes());
        data[40..48].copy_from_slice(&self.next.to_le_bytes());

        let mut at = NODE_HEADER_SIZE;
        for key in &self.keys {
            data[at..at + self.attr_len].copy_from_slice(key);
            at += self.attr_len;
        }
        for rid in &self.rids {
            rid.write_to(&mut data[at..at + RecordId::SIZE]);
            at += RecordId::SIZE;
        }
    }

    // ========================================================================
    // Header fields
    // ========================================================================

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    #[inline]
    pub fn page(&self) -> PageNum {
        self.page
    }

    #[inline]
    pub fn parent(&self) -> PageNum {
        self.parent
    }

    pub fn set_parent(&mut self, parent: PageNum) {
        self.parent = parent;
    }

    #[inline]
    pub fn prev(&self) -> PageNum {
        self.prev
    }

    pub fn set_prev(&mut self, prev: PageNum) {
        self.prev = prev;
    }

    #[inline]
    pub fn next(&self) -> PageNum {
        self.next
    }

    pub fn set_next(&mut self, next: PageNum) {
        self.next = next;
    }

    #[inline]
    pub fn attr_type(&self) -> AttrType {
        self.attr_type
    }

    #[inline]
    pub fn attr_len(&self) -> usize {
        self.attr_len
    }

    /// Node order.
    #[inline]
    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    #[inline]
    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    /// Most entries the node can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.max_keys - 1
    }

    /// Fewest entries a non-root node may hold.
    #[inline]
    pub fn min_keys(&self) -> usize {
        self.max_keys.div_ceil(2) - 1
    }

    // ========================================================================
    // Entries
    // ========================================================================

    #[inline]
    pub fn key(&self, pos: usize) -> &[u8] {
        &self.keys[pos]
    }

    #[inline]
    pub fn rid(&self, pos: usize) -> RecordId {
        self.rids[pos]
    }

    /// Child page of internal entry `pos`.
    #[inline]
    pub fn child(&self, pos: usize) -> PageNum {
        self.rids[pos].page
    }

    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.keys.iter().map(Vec::as_slice)
    }

    pub fn rids(&self) -> &[RecordId] {
        &self.rids
    }

    pub fn largest_key(&self) -> Option<&[u8]> {
        self.keys.last().map(Vec::as_slice)
    }

    pub fn smallest_key(&self) -> Option<&[u8]> {
        self.keys.first().map(Vec::as_slice)
    }

    /// Position of the entry pointing at child `page`.
    pub fn position_of_child(&self, page: PageNum) -> Option<usize> {
        self.rids.iter().position(|rid| rid.page == page)
    }

    /// Replace the key of entry `pos`.
    pub fn set_key(&mut self, pos: usize, key: &[u8]) -> Result<()> {
        self.check_key(key)?;
        let len = self.keys.len();
        let slot = self.keys.get_mut(pos).ok_or(Error::OutOfRange { pos, len })?;
        slot.copy_from_slice(key);
        Ok(())
    }

    /// Insert in key order, after any entries with an equal key.
    ///
    /// Returns the position of the new entry.
    ///
    /// # Errors
    /// - `Error::NodeKeysFull` if the node already holds `max_keys - 1` entries
    /// - `Error::BadKey` if the key length is wrong
    pub fn insert(&mut self, key: &[u8], rid: RecordId) -> Result<usize> {
        self.check_room()?;
        self.check_key(key)?;

        let mut pos = self.keys.len();
        while pos > 0 && self.compare(key, &self.keys[pos - 1]) == Ordering::Less {
            pos -= 1;
        }
        self.keys.insert(pos, key.to_vec());
        self.rids.insert(pos, rid);
        Ok(pos)
    }

    /// Insert at a fixed position, without looking at keys.
    ///
    /// Internal nodes use this to keep child order when keys repeat.
    pub fn insert_at(&mut self, pos: usize, key: &[u8], rid: RecordId) -> Result<()> {
        self.check_room()?;
        self.check_key(key)?;
        if pos > self.keys.len() {
            return Err(Error::OutOfRange {
                pos,
                len: self.keys.len(),
            });
        }
        self.keys.insert(pos, key.to_vec());
        self.rids.insert(pos, rid);
        Ok(())
    }

    /// Remove the first entry with `key`.
    pub fn delete(&mut self, key: &[u8]) -> Result<RecordId> {
        let pos = self
            .keys
            .iter()
            .position(|k| self.compare(k, key) == Ordering::Equal)
            .ok_or(Error::KeyNotFound)?;
        self.delete_at(pos).map(|(_, rid)| rid)
    }

    /// Remove entry `pos`, returning it.
    pub fn delete_at(&mut self, pos: usize) -> Result<(Vec<u8>, RecordId)> {
        if pos >= self.keys.len() {
            return Err(Error::OutOfRange {
                pos,
                len: self.keys.len(),
            });
        }
        Ok((self.keys.remove(pos), self.rids.remove(pos)))
    }

    /// Position of an entry with `key`, and with `rid` too when given.
    ///
    /// Without a rid this is the rightmost entry with the key.
    pub fn find_key(&self, key: &[u8], rid: Option<RecordId>) -> Option<usize> {
        match rid {
            Some(rid) => (0..self.keys.len()).find(|&i| {
                self.rids[i] == rid && self.compare(&self.keys[i], key) == Ordering::Equal
            }),
            None => (0..self.keys.len())
                .rev()
                .find(|&i| self.compare(&self.keys[i], key) == Ordering::Equal),
        }
    }

    /// Descent or insertion point for `key`.
    ///
    /// Scanning from the end, returns the rightmost exact match, else the
    /// position just after the last smaller key. `num_keys()` means the key
    /// is larger than every entry. `None` only for an empty node.
    pub fn find_key_pos_fit(&self, key: &[u8]) -> Option<usize> {
        if self.keys.is_empty() {
            return None;
        }
        for i in (0..self.keys.len()).rev() {
            match self.compare(&self.keys[i], key) {
                Ordering::Equal => return Some(i),
                Ordering::Less => return Some(i + 1),
                Ordering::Greater => {}
            }
        }
        Some(0)
    }

    /// First position whose key is `>= key`, `num_keys()` if none.
    pub fn lower_bound(&self, key: &[u8]) -> usize {
        self.keys
            .iter()
            .position(|k| self.compare(k, key) != Ordering::Less)
            .unwrap_or(self.keys.len())
    }

    /// Move the upper half of the entries into the empty node `rhs` and link
    /// `rhs` in after this node.
    ///
    /// The first `ceil(n / 2)` entries stay. The caller repoints the old
    /// right neighbour's `prev` at `rhs`.
    pub fn split(&mut self, rhs: &mut BpTreeNode) -> Result<()> {
        if !rhs.keys.is_empty() || rhs.kind != self.kind {
            return Err(Error::InvalidIndex(format!(
                "cannot split {} into non-empty or mismatched {}",
                self.page, rhs.page
            )));
        }
        let keep = self.keys.len().div_ceil(2);
        if self.keys.len() - keep > rhs.capacity() {
            return Err(Error::NodeKeysFull(rhs.page));
        }

        rhs.keys = self.keys.split_off(keep);
        rhs.rids = self.rids.split_off(keep);

        rhs.parent = self.parent;
        rhs.next = self.next;
        rhs.prev = self.page;
        self.next = rhs.page;
        Ok(())
    }

    /// Move every entry of the neighbour `rhs` into this node and unlink it.
    ///
    /// `rhs` must be the node's `next` or `prev`. The caller repoints the
    /// outer neighbour's back link at this node and disposes `rhs`.
    pub fn merge(&mut self, rhs: &mut BpTreeNode) -> Result<()> {
        if self.keys.len() + rhs.keys.len() > self.capacity() {
            return Err(Error::NodeKeysFull(self.page));
        }

        if rhs.page == self.next {
            self.keys.append(&mut rhs.keys);
            self.rids.append(&mut rhs.rids);
            self.next = rhs.next;
        } else if rhs.page == self.prev {
            rhs.keys.append(&mut self.keys);
            rhs.rids.append(&mut self.rids);
            std::mem::swap(&mut self.keys, &mut rhs.keys);
            std::mem::swap(&mut self.rids, &mut rhs.rids);
            self.prev = rhs.prev;
        } else {
            return Err(Error::InvalidIndex(format!(
                "{} is not adjacent to {}",
                rhs.page, self.page
            )));
        }

        rhs.next = PageNum::INVALID;
        rhs.prev = PageNum::INVALID;
        Ok(())
    }

    /// Keys are in non-decreasing order.
    pub fn is_sorted(&self) -> bool {
        self.keys
            .windows(2)
            .all(|w| self.compare(&w[0], &w[1]) != Ordering::Greater)
    }

    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.attr_type.compare(a, b)
    }

    fn check_room(&self) -> Result<()> {
        if self.keys.len() + 1 >= self.max_keys {
            return Err(Error::NodeKeysFull(self.page));
        }
        Ok(())
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.attr_len {
            return Err(Error::BadKey {
                expected: self.attr_len,
                actual: key.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(page: u64, max_keys: usize) -> BpTreeNode {
        BpTreeNode::new(
            NodeKind::Leaf,
            PageNum::new(page),
            AttrType::Int,
            4,
            max_keys,
        )
    }

    fn k(v: i32) -> [u8; 4] {
        v.to_le_bytes()
    }

    fn rid(p: u64, s: u32) -> RecordId {
        RecordId::new(PageNum::new(p), s)
    }

    fn values(node: &BpTreeNode) -> Vec<i32> {
        node.keys()
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    #[test]
    fn test_max_keys_for_int() {
        assert_eq!(max_keys_for(4), 253);
        assert_eq!(max_keys_for(255), 15);
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut node = leaf(2, 10);
        for v in [5, 3, 8, 1, 9] {
            node.insert(&k(v), rid(9, v as u32)).unwrap();
        }
        assert_eq!(values(&node), vec![1, 3, 5, 8, 9]);
        assert!(node.is_sorted());
        assert_eq!(node.largest_key(), Some(&k(9)[..]));
        assert_eq!(node.smallest_key(), Some(&k(1)[..]));
    }

    #[test]
    fn test_equal_keys_go_right() {
        let mut node = leaf(2, 10);
        node.insert(&k(4), rid(1, 0)).unwrap();
        node.insert(&k(7), rid(1, 1)).unwrap();
        let pos = node.insert(&k(4), rid(1, 2)).unwrap();

        assert_eq!(pos, 1);
        assert_eq!(node.rid(0), rid(1, 0));
        assert_eq!(node.rid(1), rid(1, 2));
    }

    #[test]
    fn test_full_node_rejects_insert() {
        let mut node = leaf(2, 5);
        for v in 0..4 {
            node.insert(&k(v), rid(1, v as u32)).unwrap();
        }
        assert_eq!(node.num_keys(), node.capacity());
        assert!(matches!(
            node.insert(&k(9), rid(1, 9)),
            Err(Error::NodeKeysFull(_))
        ));
    }

    #[test]
    fn test_bad_key_length() {
        let mut node = leaf(2, 5);
        assert!(matches!(
            node.insert(b"ab", rid(1, 0)),
            Err(Error::BadKey {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_find_key_with_and_without_rid() {
        let mut node = leaf(2, 10);
        node.insert(&k(1), rid(1, 0)).unwrap();
        node.insert(&k(6), rid(3, 1)).unwrap();
        node.insert(&k(6), rid(4, 2)).unwrap();
        node.insert(&k(8), rid(1, 3)).unwrap();

        assert_eq!(node.find_key(&k(6), Some(rid(3, 1))), Some(1));
        assert_eq!(node.find_key(&k(6), Some(rid(4, 2))), Some(2));
        assert_eq!(node.find_key(&k(6), None), Some(2));
        assert_eq!(node.find_key(&k(6), Some(rid(5, 5))), None);
        assert_eq!(node.find_key(&k(2), None), None);
    }

    #[test]
    fn test_find_key_pos_fit() {
        let mut node = leaf(2, 10);
        assert_eq!(node.find_key_pos_fit(&k(1)), None);

        for v in [10, 20, 20, 30] {
            node.insert(&k(v), rid(1, 0)).unwrap();
        }
        assert_eq!(node.find_key_pos_fit(&k(5)), Some(0));
        assert_eq!(node.find_key_pos_fit(&k(10)), Some(0));
        assert_eq!(node.find_key_pos_fit(&k(15)), Some(1));
        assert_eq!(node.find_key_pos_fit(&k(20)), Some(2));
        assert_eq!(node.find_key_pos_fit(&k(99)), Some(4));
        assert_eq!(node.lower_bound(&k(20)), 1);
    }

    #[test]
    fn test_delete() {
        let mut node = leaf(2, 10);
        for v in [1, 2, 3] {
            node.insert(&k(v), rid(1, v as u32)).unwrap();
        }
        assert_eq!(node.delete(&k(2)).unwrap(), rid(1, 2));
        assert!(matches!(node.delete(&k(2)), Err(Error::KeyNotFound)));
        assert!(matches!(
            node.delete_at(5),
            Err(Error::OutOfRange { pos: 5, len: 2 })
        ));
        assert_eq!(values(&node), vec![1, 3]);
    }

    #[test]
    fn test_split_full_leaf() {
        let mut left = leaf(2, 6);
        left.set_next(PageNum::new(7));
        for v in 1..=5 {
            left.insert(&k(v), rid(1, v as u32)).unwrap();
        }
        let mut right = leaf(5, 6);
        left.split(&mut right).unwrap();

        assert_eq!(values(&left), vec![1, 2, 3]);
        assert_eq!(values(&right), vec![4, 5]);
        assert_eq!(left.next(), PageNum::new(5));
        assert_eq!(right.prev(), PageNum::new(2));
        assert_eq!(right.next(), PageNum::new(7));
    }

    #[test]
    fn test_merge_both_sides() {
        let mut a = leaf(2, 8);
        let mut b = leaf(3, 8);
        a.set_next(PageNum::new(3));
        b.set_prev(PageNum::new(2));
        b.set_next(PageNum::new(4));
        a.insert(&k(1), rid(1, 1)).unwrap();
        b.insert(&k(2), rid(1, 2)).unwrap();

        let mut right_into_left = a.clone();
        let mut b1 = b.clone();
        right_into_left.merge(&mut b1).unwrap();
        assert_eq!(values(&right_into_left), vec![1, 2]);
        assert_eq!(right_into_left.next(), PageNum::new(4));

        let mut left_into_right = b.clone();
        let mut a1 = a.clone();
        left_into_right.merge(&mut a1).unwrap();
        assert_eq!(values(&left_into_right), vec![1, 2]);
        assert_eq!(left_into_right.prev(), PageNum::INVALID);

        let mut far = leaf(9, 8);
        assert!(matches!(a.merge(&mut far), Err(Error::InvalidIndex(_))));
    }

    #[test]
    fn test_bytes_roundtrip() {
        let mut node = BpTreeNode::new(
            NodeKind::Internal,
            PageNum::new(4),
            AttrType::String,
            3,
            max_keys_for(3),
        );
        node.set_parent(PageNum::new(2));
        node.insert(b"abc", RecordId::child(PageNum::new(5))).unwrap();
        node.insert(b"abd", RecordId::child(PageNum::new(6))).unwrap();

        let mut data = vec![0u8; PAGE_SIZE];
        node.write_to(&mut data);
        assert_eq!(data[0], b'I');
        assert_eq!(BpTreeNode::from_bytes(&data).unwrap(), node);
    }

    #[test]
    fn test_zeroed_page_is_not_a_node() {
        let data = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            BpTreeNode::from_bytes(&data),
            Err(Error::InvalidIndex(_))
        ));
    }

    #[test]
    fn test_min_keys() {
        assert_eq!(leaf(2, 5).min_keys(), 2);
        assert_eq!(leaf(2, 6).min_keys(), 2);
        assert_eq!(leaf(2, 253).min_keys(), 126);
    }
}
