//! Common types and utilities shared across MicroSQL.
//!
//! - Configuration constants and the runtime [`Config`](config::Config)
//! - Error types
//! - Identifiers (PageNum, FrameId, RecordId)
//! - Attribute types and comparison operators

mod attr;
pub mod config;
pub mod error;
mod frame_id;
mod page_num;
mod rid;

pub use attr::{AttrType, CompOp};
pub use error::{Error, ErrorKind, Result};
pub use frame_id::FrameId;
pub use page_num::PageNum;
pub use rid::{RecordId, SlotNum};
