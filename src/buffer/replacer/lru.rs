//! LRU (Least Recently Used) replacement policy.

use std::collections::{HashSet, VecDeque};

use crate::common::FrameId;

/// Evicts the least recently accessed frame among those not pinned.
pub struct LruReplacer {
    /// Frames in access order (front = least recent).
    order: VecDeque<FrameId>,

    /// Frames that are currently evictable (pin_count == 0).
    evictable: HashSet<FrameId>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
            evictable: HashSet::new(),
        }
    }

    /// Record an access: the frame becomes the most recently used.
    pub fn record_access(&mut self, frame_id: FrameId) {
        self.order.retain(|&f| f != frame_id);
        self.order.push_back(frame_id);
    }

    pub fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        if evictable {
            self.evictable.insert(frame_id);
        } else {
            self.evictable.remove(&frame_id);
        }
    }

    /// Select a victim: the least recently used evictable frame.
    pub fn evict(&mut self) -> Option<FrameId> {
        let pos = self
            .order
            .iter()
            .position(|frame_id| self.evictable.contains(frame_id))?;
        let frame_id = self.order.remove(pos)?;
        self.evictable.remove(&frame_id);
        Some(frame_id)
    }

    /// Forget a frame entirely (its page was disposed).
    pub fn remove(&mut self, frame_id: FrameId) {
        self.order.retain(|&f| f != frame_id);
        self.evictable.remove(&frame_id);
    }

    /// Number of evictable frames.
    pub fn size(&self) -> usize {
        self.evictable.len()
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}
