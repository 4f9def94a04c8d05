//! Eviction policy implementations (replacers).

mod lru;

pub use lru::LruReplacer;
