//! B+tree index.
//!
//! Order-`m` B+tree over fixed-length keys. Every internal entry stores the
//! largest key of its child's subtree together with the child's page.
//!
//! # Components
//! - [`BpTreeNode`] - One node page, decoded
//! - [`IndexHandle`] - Insert, delete, search on an open index
//! - [`IndexScan`] - Predicate scan along the leaf chain
//! - [`IndexManager`] - Index file lifecycle

mod index_handle;
mod index_header;
mod index_manager;
mod index_scan;
mod node;

pub use index_handle::{IndexHandle, PathEntry, INDEX_HEADER_PAGE};
pub use index_header::{IndexHeader, INDEX_IDENTIFY};
pub use index_manager::IndexManager;
pub use index_scan::IndexScan;
pub use node::{max_keys_for, BpTreeNode, NodeKind, MIN_ORDER, NODE_HEADER_SIZE};
