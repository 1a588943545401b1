//! Folio Cache Library
//!
//! Positional page cache: decoded pages stay resident while they are near
//! the reading position and are evicted when the window moves away.

pub mod page_cache;
pub mod window;

pub use page_cache::{CacheEntry, CacheStats, PageCache};
pub use window::{PageWindow, WindowError, WindowPolicy};
