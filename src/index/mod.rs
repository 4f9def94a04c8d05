//! Index structures.

pub mod btree;

pub use btree::{BpTreeNode, IndexHandle, IndexManager, IndexScan};
