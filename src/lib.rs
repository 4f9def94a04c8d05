//! MicroSQL - a paged storage engine.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            MicroSQL                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────┐   ┌──────────────────────────┐   │
//! │  │   Record heap (record/)  │   │   B+tree (index/)        │   │
//! │  │ RecordFile + Scan        │   │ IndexHandle + IndexScan  │   │
//! │  │ slotted pages, free chain│   │ largest-key routing      │   │
//! │  └──────────────────────────┘   └──────────────────────────┘   │
//! │                 ↓                             ↓                 │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Buffer Manager (buffer/)                    │   │
//! │  │     Frame pool + pin guards + LRU eviction + stats       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Storage Layer (storage/)                  │   │
//! │  │         PageFile + Page + PageHeader (checksummed)       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every open record file or index owns one page file and one buffer
//! manager. Nothing is shared between open files.
//!
//! # Modules
//! - [`common`] - Shared primitives (PageNum, RecordId, Error, config)
//! - [`storage`] - Page files and page formats
//! - [`buffer`] - Page cache
//! - [`record`] - Fixed-size record heap
//! - [`index`] - B+tree index
//!
//! # Quick Start
//! ```no_run
//! use microsql::index::IndexManager;
//! use microsql::record::RecordFileManager;
//! use microsql::{AttrType, Config};
//!
//! let config = Config::new("/tmp/microsql");
//! let rfm = RecordFileManager::new(config.clone());
//! let im = IndexManager::new(config);
//!
//! rfm.create_file("emp", 8)?;
//! im.create_index("emp", 0, AttrType::Int, 4)?;
//!
//! let mut records = rfm.open_file("emp")?;
//! let mut index = im.open_index("emp", 0)?;
//!
//! let rid = records.insert_rec(&[1, 0, 0, 0, b'a', b'b', b'c', 0])?;
//! index.insert_entry(&1i32.to_le_bytes(), rid)?;
//!
//! im.close_index(index)?;
//! rfm.close_file(records)?;
//! # Ok::<(), microsql::Error>(())
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod record;
pub mod storage;

pub use common::config::{Config, PAGE_SIZE};
pub use common::{AttrType, CompOp, Error, ErrorKind, FrameId, PageNum, RecordId, Result, SlotNum};

pub use buffer::{BufferManager, StatsSnapshot};
pub use index::{IndexHandle, IndexManager};
pub use record::{Record, RecordFile, RecordFileManager};
pub use storage::PageFile;
