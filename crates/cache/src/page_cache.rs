//! Positional page cache
//!
//! Maps page index to decoded page. Unlike the LRU tile caches a desktop
//! viewer uses, this cache never evicts on its own: eviction is driven by the
//! prefetch window through [`PageCache::evict_outside`], so memory is bounded
//! by the window size rather than the access pattern.
//!
//! A page that failed to decode is kept as a [`CacheEntry::Failed`] marker so
//! the UI can tell "failed" apart from "not decoded yet".

use crate::window::PageWindow;
use folio_render::{DecodeError, DecodedPage, PageIndex};
use std::cell::Cell;
use std::collections::HashMap;
use tracing::{debug, trace};

/// A resident cache slot
#[derive(Debug, Clone)]
pub enum CacheEntry {
    Ready(DecodedPage),
    Failed(DecodeError),
}

impl CacheEntry {
    pub fn page(&self) -> Option<&DecodedPage> {
        match self {
            CacheEntry::Ready(page) => Some(page),
            CacheEntry::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CacheEntry::Failed(_))
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct CacheStats {
    /// Decoded pages currently resident
    pub ready_pages: usize,

    /// Pages currently marked as failed
    pub failed_pages: usize,

    /// Configured capacity in pages
    pub capacity: usize,

    /// Bytes held by resident rasters
    pub resident_bytes: usize,

    /// Highest value `resident_bytes` has reached
    pub peak_resident_bytes: usize,

    /// Lookups that found a decoded page
    pub hits: u64,

    /// Lookups that found nothing decoded
    pub misses: u64,

    /// Pages inserted
    pub insertions: u64,

    /// Entries removed by window eviction or clearing
    pub evictions: u64,

    /// Rasters whose buffer was freed at removal time
    pub buffers_freed: u64,

    /// Failure markers recorded
    pub failures: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded mapping from page index to decoded page
///
/// # Example
///
/// ```
/// use folio_cache::{PageCache, PageWindow};
/// use folio_render::{DecodedPage, PageSize, RasterSurface};
///
/// let mut cache = PageCache::new(10);
/// for index in 1..=4 {
///     let surface = RasterSurface::filled(8, 8, [255, 255, 255, 255]);
///     cache.put(index, DecodedPage::new(index, 1.0, PageSize::LETTER, surface));
/// }
///
/// let evicted = cache.evict_outside(PageWindow::new(3, 6).unwrap());
/// assert_eq!(evicted, vec![1, 2]);
/// assert!(cache.get(3).is_some());
/// ```
#[derive(Debug)]
pub struct PageCache {
    entries: HashMap<PageIndex, CacheEntry>,
    capacity: usize,
    resident_bytes: usize,
    peak_resident_bytes: usize,
    hits: Cell<u64>,
    misses: Cell<u64>,
    insertions: u64,
    evictions: u64,
    buffers_freed: u64,
    failures: u64,
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            resident_bytes: 0,
            peak_resident_bytes: 0,
            hits: Cell::new(0),
            misses: Cell::new(0),
            insertions: 0,
            evictions: 0,
            buffers_freed: 0,
            failures: 0,
        }
    }

    /// Look up a decoded page. Never triggers decoding.
    pub fn get(&self, index: PageIndex) -> Option<&DecodedPage> {
        let page = self.entries.get(&index).and_then(CacheEntry::page);
        let counter = if page.is_some() { &self.hits } else { &self.misses };
        counter.set(counter.get() + 1);
        page
    }

    /// Look up an entry without touching statistics
    pub fn entry(&self, index: PageIndex) -> Option<&CacheEntry> {
        self.entries.get(&index)
    }

    /// Whether a decoded page is resident for `index`
    pub fn contains(&self, index: PageIndex) -> bool {
        matches!(self.entries.get(&index), Some(CacheEntry::Ready(_)))
    }

    pub fn is_failed(&self, index: PageIndex) -> bool {
        self.entries.get(&index).is_some_and(CacheEntry::is_failed)
    }

    /// Insert or overwrite a decoded page.
    ///
    /// Capacity is not enforced here; the window policy keeps the resident
    /// set bounded.
    pub fn put(&mut self, index: PageIndex, page: DecodedPage) {
        self.resident_bytes += page.byte_len();
        self.peak_resident_bytes = self.peak_resident_bytes.max(self.resident_bytes);
        self.insertions += 1;

        if let Some(previous) = self.entries.insert(index, CacheEntry::Ready(page)) {
            self.release(previous);
        }
    }

    /// Record that `index` failed to decode, replacing any previous entry
    pub fn mark_failed(&mut self, index: PageIndex, error: DecodeError) {
        self.failures += 1;

        if let Some(previous) = self.entries.insert(index, CacheEntry::Failed(error)) {
            self.release(previous);
        }
    }

    /// Drop a failure marker so the page can be requested again.
    ///
    /// Returns `false` if `index` was not marked as failed.
    pub fn clear_failure(&mut self, index: PageIndex) -> bool {
        if self.is_failed(index) {
            self.entries.remove(&index);
            true
        } else {
            false
        }
    }

    /// Remove every entry whose index lies outside `window`.
    ///
    /// Returns the removed indices in ascending order. Each removed raster is
    /// released immediately.
    pub fn evict_outside(&mut self, window: PageWindow) -> Vec<PageIndex> {
        let mut evicted: Vec<PageIndex> =
            self.entries.keys().copied().filter(|index| !window.contains(*index)).collect();
        evicted.sort_unstable();

        for index in &evicted {
            if let Some(entry) = self.entries.remove(index) {
                self.evictions += 1;
                self.release(entry);
            }
        }

        if !evicted.is_empty() {
            debug!(
                start = window.start(),
                end = window.end(),
                evicted = evicted.len(),
                resident = self.entries.len(),
                "evicted pages outside window"
            );
        }

        evicted
    }

    /// Evict everything. Returns the number of removed entries.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        let entries: Vec<CacheEntry> = self.entries.drain().map(|(_, entry)| entry).collect();

        for entry in entries {
            self.evictions += 1;
            self.release(entry);
        }

        count
    }

    fn release(&mut self, entry: CacheEntry) {
        let CacheEntry::Ready(page) = entry else {
            return;
        };

        let index = page.index();
        self.resident_bytes = self.resident_bytes.saturating_sub(page.byte_len());
        if page.release() {
            self.buffers_freed += 1;
            trace!(index, "raster freed");
        } else {
            trace!(index, "raster released, still shared");
        }
    }

    /// Number of entries, decoded or failed
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Resident indices in ascending order
    pub fn indices(&self) -> Vec<PageIndex> {
        let mut indices: Vec<PageIndex> = self.entries.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// Entries in ascending index order
    pub fn entries(&self) -> Vec<(PageIndex, &CacheEntry)> {
        let mut entries: Vec<_> = self.entries.iter().map(|(index, entry)| (*index, entry)).collect();
        entries.sort_unstable_by_key(|(index, _)| *index);
        entries
    }

    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let failed_pages = self.entries.values().filter(|entry| entry.is_failed()).count();

        CacheStats {
            ready_pages: self.entries.len() - failed_pages,
            failed_pages,
            capacity: self.capacity,
            resident_bytes: self.resident_bytes,
            peak_resident_bytes: self.peak_resident_bytes,
            hits: self.hits.get(),
            misses: self.misses.get(),
            insertions: self.insertions,
            evictions: self.evictions,
            buffers_freed: self.buffers_freed,
            failures: self.failures,
        }
    }
}
