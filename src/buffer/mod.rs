//! Buffer management.
//!
//! The buffer manager is the only path through which the record and index
//! layers touch page bytes. It caches pages of one page file in a fixed pool
//! of frames.
//!
//! # Components
//! - [`BufferManager`] - The page cache
//! - [`Frame`] - A slot in the pool holding a page + metadata
//! - [`PageReadGuard`] / [`PageWriteGuard`] - RAII pins
//! - [`BufferStats`] - Counters
//! - [`replacer`] - Eviction policy

mod buffer_manager;
mod frame;
mod page_guard;
pub mod replacer;
mod stats;

pub use buffer_manager::BufferManager;
pub use frame::Frame;
pub use page_guard::{PageReadGuard, PageWriteGuard};
pub use stats::{BufferStats, StatsSnapshot};
