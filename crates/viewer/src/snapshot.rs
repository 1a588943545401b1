//! Published viewer state
//!
//! [`ResidentPages`] is what the page-flip UI renders from: every page index of
//! the document maps to a decoded raster, a placeholder, or a failure marker.

use crate::error::ViewerError;
use folio_cache::CacheEntry;
use folio_render::{DecodeError, DecodedPage, PageIndex};
use std::collections::BTreeMap;

/// Session lifecycle as seen by the UI
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ViewerState {
    /// No document was ever opened
    #[default]
    Idle,
    /// A document is opening or running its initial burst
    Loading,
    Ready,
    /// The session hit a fatal error; no further scheduling happens
    Failed(ViewerError),
    Closed,
}

impl ViewerState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ViewerState::Ready)
    }
}

/// What the UI should draw for one page
#[derive(Debug, Clone)]
pub enum PageSlot {
    Ready(DecodedPage),
    /// Not decoded yet; draw a placeholder at the first-page size
    Pending,
    /// Decode failed; draw a placeholder with a retry affordance
    Failed(DecodeError),
}

impl PageSlot {
    pub fn page(&self) -> Option<&DecodedPage> {
        match self {
            PageSlot::Ready(page) => Some(page),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PageSlot::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PageSlot::Failed(_))
    }
}

impl From<&CacheEntry> for PageSlot {
    fn from(entry: &CacheEntry) -> Self {
        match entry {
            CacheEntry::Ready(page) => PageSlot::Ready(page.clone()),
            CacheEntry::Failed(error) => PageSlot::Failed(error.clone()),
        }
    }
}

/// Snapshot of the resident set, republished after every cache mutation
///
/// Rasters are shared with the cache; holding a snapshot keeps an evicted
/// raster alive only until the snapshot is dropped.
#[derive(Debug, Clone, Default)]
pub struct ResidentPages {
    pub generation: u64,
    pub page_count: u32,
    /// Last settled navigation target
    pub cursor: PageIndex,
    pub zoom: f32,
    /// Raster scale pages are decoded at
    pub scale: f32,
    /// First page dimensions at `scale`, used to size placeholders
    pub first_page: Option<(u32, u32)>,
    /// Resident and failed pages; every other index is pending
    pub entries: BTreeMap<PageIndex, PageSlot>,
    /// Pages currently being decoded
    pub in_flight: Vec<PageIndex>,
}

impl ResidentPages {
    /// The slot for `index`, or `None` outside `1..=page_count`
    pub fn slot(&self, index: PageIndex) -> Option<PageSlot> {
        if index == 0 || index > self.page_count {
            return None;
        }
        Some(self.entries.get(&index).cloned().unwrap_or(PageSlot::Pending))
    }

    /// Every page in document order, as the flip widget consumes them
    pub fn slots(&self) -> impl Iterator<Item = (PageIndex, PageSlot)> + '_ {
        (1..=self.page_count).map(|index| {
            let slot = self.entries.get(&index).cloned().unwrap_or(PageSlot::Pending);
            (index, slot)
        })
    }

    /// Indices with a decoded raster, ascending
    pub fn ready(&self) -> Vec<PageIndex> {
        self.entries.iter().filter(|(_, slot)| slot.is_ready()).map(|(index, _)| *index).collect()
    }

    /// Indices marked as failed, ascending
    pub fn failed(&self) -> Vec<PageIndex> {
        self.entries.iter().filter(|(_, slot)| slot.is_failed()).map(|(index, _)| *index).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.page_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_render::{DecodeCause, PageSize, RasterSurface};

    fn snapshot() -> ResidentPages {
        let page = DecodedPage::new(2, 1.0, PageSize::LETTER, RasterSurface::filled(4, 4, [255; 4]));
        let mut entries = BTreeMap::new();
        entries.insert(2, PageSlot::Ready(page));
        entries.insert(3, PageSlot::Failed(DecodeError::new(3, DecodeCause::Corrupt("bad".into()))));

        ResidentPages { page_count: 4, cursor: 2, zoom: 1.0, scale: 1.0, entries, ..Default::default() }
    }

    #[test]
    fn test_missing_indices_are_pending() {
        let pages = snapshot();
        assert!(matches!(pages.slot(1), Some(PageSlot::Pending)));
        assert!(pages.slot(2).is_some_and(|slot| slot.is_ready()));
        assert!(pages.slot(3).is_some_and(|slot| slot.is_failed()));
        assert!(pages.slot(0).is_none());
        assert!(pages.slot(5).is_none());
    }

    #[test]
    fn test_slots_cover_the_whole_document_in_order() {
        let pages = snapshot();
        let order: Vec<_> = pages.slots().map(|(index, _)| index).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert_eq!(pages.ready(), vec![2]);
        assert_eq!(pages.failed(), vec![3]);
    }
}
