//! Page windows and the policy that sizes them
//!
//! A [`PageWindow`] is an inclusive, non-empty range of 1-based page indices.
//! The [`WindowPolicy`] derives two windows from a center page:
//! - the *prefetch window* `[center - look_behind, center + look_ahead]`, the
//!   pages that should be decoded;
//! - the *retained window*, the prefetch window padded up to the cache
//!   capacity, the pages that may stay resident.
//!
//! Padding the retained window is what makes eviction lag behind prefetch: a
//! reader turning back one page finds it still resident.

use folio_render::PageIndex;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Inclusive range of page indices, `1 <= start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageWindow {
    start: PageIndex,
    end: PageIndex,
}

impl PageWindow {
    /// Returns `None` for an empty or zero-based range
    pub fn new(start: PageIndex, end: PageIndex) -> Option<Self> {
        if start == 0 || start > end {
            return None;
        }
        Some(Self { start, end })
    }

    /// The window `[center - behind, center + ahead]` clamped to `1..=page_count`.
    ///
    /// `center` itself is clamped into the document first. Returns `None` for
    /// an empty document.
    pub fn around(center: PageIndex, behind: u32, ahead: u32, page_count: u32) -> Option<Self> {
        if page_count == 0 {
            return None;
        }

        let center = center.clamp(1, page_count);
        let start = center.saturating_sub(behind).max(1);
        let end = center.saturating_add(ahead).min(page_count);

        Some(Self { start, end })
    }

    pub fn start(&self) -> PageIndex {
        self.start
    }

    pub fn end(&self) -> PageIndex {
        self.end
    }

    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, index: PageIndex) -> bool {
        (self.start..=self.end).contains(&index)
    }

    pub fn iter(&self) -> RangeInclusive<PageIndex> {
        self.start..=self.end
    }

    /// Grow the window by `pad` pages, staying inside `1..=page_count`.
    ///
    /// The padding is split evenly, the odd page going behind. When one edge
    /// hits the document boundary its share moves to the other edge, so the
    /// result is `min(len + pad, page_count)` pages long.
    pub fn padded(self, pad: u32, page_count: u32) -> Self {
        let room_behind = self.start - 1;
        let room_ahead = page_count.saturating_sub(self.end);

        let behind = pad.div_ceil(2).min(room_behind);
        let ahead = (pad - behind).min(room_ahead);
        let behind = (pad - ahead).min(room_behind);

        Self { start: self.start - behind, end: self.end + ahead }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error("cache capacity must be at least 1")]
    ZeroCapacity,
    #[error("cache capacity {capacity} cannot hold a {window}-page prefetch window")]
    CapacityBelowWindow { capacity: u32, window: u32 },
}

/// How many pages are prefetched around the reading position and how many
/// may stay resident
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    capacity: u32,
    look_behind: u32,
    look_ahead: u32,
}

impl WindowPolicy {
    /// Validate and build a policy.
    ///
    /// The capacity must contain the largest possible prefetch window or
    /// eviction would thrash.
    pub fn new(capacity: u32, look_behind: u32, look_ahead: u32) -> Result<Self, WindowError> {
        if capacity == 0 {
            return Err(WindowError::ZeroCapacity);
        }

        let window = look_behind.saturating_add(look_ahead).saturating_add(1);
        if capacity < window {
            return Err(WindowError::CapacityBelowWindow { capacity, window });
        }

        Ok(Self { capacity, look_behind, look_ahead })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn look_behind(&self) -> u32 {
        self.look_behind
    }

    pub fn look_ahead(&self) -> u32 {
        self.look_ahead
    }

    /// Largest prefetch window this policy can produce
    pub fn max_window_len(&self) -> u32 {
        self.look_behind + self.look_ahead + 1
    }

    /// Pages that should be decoded around `center`
    pub fn prefetch_window(&self, center: PageIndex, page_count: u32) -> Option<PageWindow> {
        PageWindow::around(center, self.look_behind, self.look_ahead, page_count)
    }

    /// Pages allowed to stay resident while `window` is the prefetch window
    pub fn retained_window(&self, window: PageWindow, page_count: u32) -> PageWindow {
        let pad = self.capacity.saturating_sub(window.len());
        window.padded(pad, page_count)
    }
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self { capacity: 15, look_behind: 2, look_ahead: 3 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_around_clamps_to_document() {
        let window = PageWindow::around(10, 2, 3, 20).expect("non-empty");
        assert_eq!((window.start(), window.end()), (8, 13));

        let first = PageWindow::around(1, 2, 3, 20).expect("non-empty");
        assert_eq!((first.start(), first.end()), (1, 4));

        let last = PageWindow::around(20, 2, 3, 20).expect("non-empty");
        assert_eq!((last.start(), last.end()), (18, 20));

        let beyond = PageWindow::around(99, 2, 3, 20).expect("non-empty");
        assert_eq!((beyond.start(), beyond.end()), (18, 20));

        assert!(PageWindow::around(1, 2, 3, 0).is_none());
    }

    #[test]
    fn test_new_rejects_empty_ranges() {
        assert!(PageWindow::new(0, 3).is_none());
        assert!(PageWindow::new(4, 3).is_none());
        assert_eq!(PageWindow::new(3, 3).map(|w| w.len()), Some(1));
    }

    #[test]
    fn test_padding_splits_evenly_in_the_middle() {
        let window = PageWindow::new(8, 13).expect("valid");
        let padded = window.padded(4, 20);
        assert_eq!((padded.start(), padded.end()), (6, 15));

        let odd = window.padded(3, 20);
        assert_eq!((odd.start(), odd.end()), (6, 14));
    }

    #[test]
    fn test_padding_shifts_to_the_open_edge() {
        let head = PageWindow::new(1, 4).expect("valid").padded(6, 20);
        assert_eq!((head.start(), head.end()), (1, 10));

        let tail = PageWindow::new(17, 20).expect("valid").padded(6, 20);
        assert_eq!((tail.start(), tail.end()), (11, 20));

        let short = PageWindow::new(2, 3).expect("valid").padded(10, 5);
        assert_eq!((short.start(), short.end()), (1, 5));
    }

    #[test]
    fn test_policy_rejects_capacity_below_window() {
        assert_eq!(WindowPolicy::new(0, 0, 0), Err(WindowError::ZeroCapacity));
        assert_eq!(
            WindowPolicy::new(5, 2, 3),
            Err(WindowError::CapacityBelowWindow { capacity: 5, window: 6 })
        );
        assert!(WindowPolicy::new(6, 2, 3).is_ok());
    }

    #[test]
    fn test_retained_window_never_exceeds_capacity() {
        let policy = WindowPolicy::new(10, 2, 3).expect("valid policy");

        for page_count in 1..40 {
            for center in 1..=page_count {
                let window = policy.prefetch_window(center, page_count).expect("non-empty");
                let retained = policy.retained_window(window, page_count);

                assert!(window.len() <= policy.max_window_len());
                assert!(retained.len() <= policy.capacity());
                assert!(retained.start() <= window.start() && window.end() <= retained.end());
                assert!(retained.end() <= page_count);
            }
        }
    }
}
