//! Range scan over the leaf chain of an index.

use std::cmp::Ordering;

use crate::common::{CompOp, Error, RecordId, Result};

use super::{BpTreeNode, IndexHandle};

/// Cursor over the entries of an [`IndexHandle`] whose key satisfies
/// `key <comp_op> value`, in key order.
///
/// `Eq`, `Ge` and `Gt` start at the first leaf that can hold `value`; the
/// other operators start at the leftmost leaf. `Eq`, `Lt` and `Le` stop as
/// soon as keys pass `value`.
pub struct IndexScan<'a> {
    handle: &'a IndexHandle,
    comp_op: CompOp,
    value: Vec<u8>,
    /// Copy of the leaf being walked, `None` once exhausted.
    leaf: Option<BpTreeNode>,
    pos: usize,
    closed: bool,
}

impl<'a> IndexScan<'a> {
    /// # Errors
    /// `Error::InvalidScan` if `value` is not a key of the index.
    pub fn open(handle: &'a IndexHandle, comp_op: CompOp, value: &[u8]) -> Result<Self> {
        if comp_op != CompOp::NoOp && value.len() != handle.attr_len() {
            return Err(Error::InvalidScan(format!(
                "value is {} bytes, keys are {}",
                value.len(),
                handle.attr_len()
            )));
        }

        let (leaf, pos) = match comp_op {
            CompOp::Eq | CompOp::Ge | CompOp::Gt => {
                let leaf = handle.find_first_leaf_for(value)?;
                let pos = leaf.lower_bound(value);
                (leaf, pos)
            }
            _ => (handle.find_smallest_leaf()?, 0),
        };

        Ok(Self {
            handle,
            comp_op,
            value: value.to_vec(),
            leaf: Some(leaf),
            pos,
            closed: false,
        })
    }

    /// Next matching `(key, rid)`.
    ///
    /// # Errors
    /// - `Error::EndOfScan` when no entries are left
    /// - `Error::InvalidScan` after [`close`](Self::close)
    pub fn next_entry(&mut self) -> Result<(Vec<u8>, RecordId)> {
        if self.closed {
            return Err(Error::InvalidScan("scan is closed".into()));
        }
        let attr_type = self.handle.attr_type();

        loop {
            let leaf = match &self.leaf {
                Some(leaf) => leaf,
                None => return Err(Error::EndOfScan),
            };

            if self.pos >= leaf.num_keys() {
                let next = leaf.next();
                self.leaf = if next.is_valid() {
                    Some(self.handle.load_node(next)?)
                } else {
                    None
                };
                self.pos = 0;
                continue;
            }

            let key = leaf.key(self.pos).to_vec();
            let rid = leaf.rid(self.pos);
            self.pos += 1;

            if self.past_bound(&key) {
                self.leaf = None;
                return Err(Error::EndOfScan);
            }
            if self.comp_op.eval(attr_type, &key, &self.value) {
                return Ok((key, rid));
            }
        }
    }

    /// Finish the scan. Further calls to [`next_entry`](Self::next_entry) fail.
    pub fn close(&mut self) {
        self.closed = true;
        self.leaf = None;
    }

    fn past_bound(&self, key: &[u8]) -> bool {
        match self.comp_op {
            CompOp::Eq | CompOp::Lt | CompOp::Le => {
                self.handle.attr_type().compare(key, &self.value) == Ordering::Greater
            }
            _ => false,
        }
    }
}

impl Iterator for IndexScan<'_> {
    type Item = Result<(Vec<u8>, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        match self.next_entry() {
            Ok(entry) => Some(Ok(entry)),
            Err(Error::EndOfScan) => None,
            Err(e) => {
                self.leaf = None;
                Some(Err(e))
            }
        }
    }
}
