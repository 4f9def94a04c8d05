//! Record - an owned copy of one slot's bytes.

use crate::common::RecordId;

/// Bytes of one record together with the rid they were read from or will be
/// written to.
///
/// A record is a copy, not a view: changing it does nothing to the file
/// until it is handed to [`RecordFile::update_rec`](super::RecordFile::update_rec).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    rid: RecordId,
    data: Vec<u8>,
}

impl Record {
    pub fn new(rid: RecordId, data: Vec<u8>) -> Self {
        Self { rid, data }
    }

    #[inline]
    pub fn rid(&self) -> RecordId {
        self.rid
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
