//! Derived-artifact file cache
//!
//! Content-addressed, size-bounded cache of page rasters, thumbnails and
//! extracted-text artifacts. Eviction is decoupled from the write path and
//! handled by the garbage collector in [`gc`].

pub mod gc;
pub mod store;

pub use gc::GarbageCollector;
pub use store::{FileCache, Namespace, SETTINGS_FILE};
