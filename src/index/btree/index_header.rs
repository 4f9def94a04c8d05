//! Index file header, stored in page 1.

use crate::common::config::IDENTIFY_LEN;
use crate::common::{AttrType, Error, PageNum, Result};
use crate::storage::page::{encode_identify, matches_identify};

use super::node::{max_keys_for, MIN_ORDER};

pub const INDEX_IDENTIFY: &str = "MicroSQL IndexHandle";

/// # Layout (64 bytes)
/// ```text
/// Offset  Size  Field
/// 0       32    identify ("MicroSQL IndexHandle")
/// 32      1     attr_type
/// 33      3     (padding)
/// 36      4     attr_len
/// 40      8     root (INVALID while height is 0)
/// 48      4     max_keys
/// 52      4     height
/// 56      8     num_pages (node pages in use)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub attr_type: AttrType,
    pub attr_len: usize,
    pub root: PageNum,
    pub max_keys: usize,
    pub height: u32,
    pub num_pages: u64,
}

impl IndexHeader {
    pub const SIZE: usize = IDENTIFY_LEN + 32;

    /// Header of an empty index.
    pub fn new(attr_type: AttrType, attr_len: usize, max_keys: usize) -> Self {
        Self {
            attr_type,
            attr_len,
            root: PageNum::INVALID,
            max_keys,
            height: 0,
            num_pages: 0,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if !matches_identify(data, INDEX_IDENTIFY) {
            return Err(Error::InvalidIndex("bad identify string".into()));
        }
        let attr_type = AttrType::from_u8(data[32])
            .ok_or_else(|| Error::InvalidIndex(format!("bad attribute type {}", data[32])))?;
        let u32_at = |at: usize| {
            u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
        };

        let header = Self {
            attr_type,
            attr_len: u32_at(36) as usize,
            root: PageNum::from_le_slice(&data[40..48]),
            max_keys: u32_at(48) as usize,
            height: u32_at(52),
            num_pages: PageNum::from_le_slice(&data[56..64]).0,
        };

        if header.attr_len == 0
            || header.max_keys < MIN_ORDER
            || header.max_keys > max_keys_for(header.attr_len)
        {
            return Err(Error::InvalidIndex(format!(
                "order {} does not fit {}-byte keys",
                header.max_keys, header.attr_len
            )));
        }
        if (header.height == 0) == header.root.is_valid() {
            return Err(Error::InvalidIndex(format!(
                "height {} with root {}",
                header.height, header.root
            )));
        }
        Ok(header)
    }

    pub fn write_to(&self, data: &mut [u8]) {
        data[..IDENTIFY_LEN].copy_from_slice(&encode_identify(INDEX_IDENTIFY));
        data[32] = self.attr_type as u8;
        data[33..36].fill(0);
        data[36..40].copy_from_slice(&(self.attr_len as u32).to_le_bytes());
        data[40..48].copy_from_slice(&self.root.to_le_bytes());
        data[48..52].copy_from_slice(&(self.max_keys as u32).to_le_bytes());
        data[52..56].copy_from_slice(&self.height.to_le_bytes());
        data[56..64].copy_from_slice(&self.num_pages.to_le_bytes());
    }
}
