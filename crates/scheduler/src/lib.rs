//! Folio Scheduler Library
//!
//! Decode scheduling for the paged render cache.
//!
//! - [`RenderTaskTracker`] keeps at most one decode in flight per page and
//!   lets later requests join it.
//! - [`PrefetchScheduler`] decodes the window around the reading position
//!   and evicts pages that fall out of the retained window.
//! - [`NavigationDebouncer`] collapses rapid page changes into one scheduling
//!   pass.
//! - [`Generation`] tokens invalidate work issued before a document swap or
//!   zoom change.
//!
//! Everything here is single-threaded: futures are `!Send` and are spawned
//! onto the current [`tokio::task::LocalSet`].
//!
//! # Example
//!
//! ```
//! use folio_cache::{PageCache, WindowPolicy};
//! use folio_render::{DecoderAdapter, DocumentRef, DocumentSource, SyntheticSource, SyntheticSpec};
//! use folio_scheduler::{Generation, PrefetchScheduler, RenderTaskTracker};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! # let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! # tokio::task::LocalSet::new().block_on(&runtime, async {
//! let source = SyntheticSource::new(SyntheticSpec::new(40));
//! let handle = source.open(&DocumentRef::from("demo")).await.unwrap();
//!
//! let cache = Rc::new(RefCell::new(PageCache::new(15)));
//! let generation = Generation::new();
//! let scheduler = PrefetchScheduler::builder(DecoderAdapter::new(handle), cache.clone(), RenderTaskTracker::new())
//!     .with_policy(WindowPolicy::default())
//!     .with_generation(generation.token())
//!     .build();
//!
//! let report = scheduler.burst(1).await;
//! assert_eq!(report.decoded, (1..=10).collect::<Vec<_>>());
//! # });
//! ```

mod debounce;
mod generation;
mod prefetch;
mod tracker;

pub use debounce::{NavigationDebouncer, SettleCallback};
pub use generation::{Generation, GenerationToken};
pub use prefetch::{
    BurstReport, PrefetchScheduler, SchedulePass, SchedulerBuilder, SchedulerEvent,
    SchedulerListener,
};
pub use tracker::{DecodeResult, PendingDecode, RenderTaskTracker, TrackerStats};
