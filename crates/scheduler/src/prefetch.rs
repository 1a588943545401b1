//! Prefetch scheduler
//!
//! Decides which pages should be resident around a center page, requests the
//! missing ones through the [`RenderTaskTracker`], and evicts everything
//! outside the retained window.
//!
//! Each decode commits its own result (insert, failure marker, or discard)
//! before it leaves the in-flight set, so at no point is a finished page
//! neither in flight nor resident.
//!
//! # Scheduling pass
//!
//! 1. `window = [center - look_behind, center + look_ahead]` clamped to the
//!    document.
//! 2. Every index in `window` that is neither resident nor in flight is
//!    requested. A failed index is only retried when it is the center.
//! 3. The cache is trimmed to the retained window, the prefetch window
//!    padded up to the cache capacity.
//!
//! Results are committed only while the scheduler's generation is current
//! and the page still lies inside the latest retained window.

use crate::generation::{Generation, GenerationToken};
use crate::tracker::{DecodeResult, PendingDecode, RenderTaskTracker};
use folio_cache::{PageCache, PageWindow, WindowPolicy};
use folio_render::{DecodeError, DecoderAdapter, PageIndex};
use futures::future::{join_all, FutureExt, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Something the controller may want to republish
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// A decoded page was inserted into the cache
    PageReady(PageIndex),
    /// A page failed to decode and was marked as failed
    PageFailed(PageIndex),
    /// Pages were evicted by a scheduling pass
    Evicted(Vec<PageIndex>),
    /// The document handle became unusable; the session cannot continue
    HandleLost(DecodeError),
}

/// Callback invoked after every cache mutation the scheduler makes
pub type SchedulerListener = Rc<dyn Fn(SchedulerEvent)>;

/// Outcome of one [`PrefetchScheduler::schedule`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePass {
    pub center: PageIndex,
    /// Pages that should be resident
    pub window: PageWindow,
    /// Pages allowed to stay resident
    pub retained: PageWindow,
    /// Pages whose decode was started by this pass
    pub requested: Vec<PageIndex>,
    /// Pages evicted by this pass
    pub evicted: Vec<PageIndex>,
}

/// Outcome of the initial burst
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BurstReport {
    /// Pages the burst covered, in request order
    pub pages: Vec<PageIndex>,
    /// Pages resident when the burst finished
    pub decoded: Vec<PageIndex>,
    /// Pages that failed to decode
    pub failed: Vec<PageIndex>,
}

struct Inner {
    decoder: DecoderAdapter,
    cache: Rc<RefCell<PageCache>>,
    tracker: RenderTaskTracker,
    policy: WindowPolicy,
    scale: f32,
    initial_burst: u32,
    token: GenerationToken,
    retained: Cell<Option<PageWindow>>,
    listener: Option<SchedulerListener>,
}

impl Inner {
    fn emit(&self, event: SchedulerEvent) {
        if let Some(listener) = &self.listener {
            listener(event);
        }
    }

    fn commit(&self, index: PageIndex, result: &DecodeResult) {
        if self.token.is_stale() {
            trace!(index, generation = self.token.generation(), "stale result discarded");
            return;
        }

        match result {
            Err(err) if err.is_fatal() => {
                warn!(index, error = %err, "document handle lost");
                self.emit(SchedulerEvent::HandleLost(err.clone()));
            }
            _ if !self.retained.get().is_some_and(|window| window.contains(index)) => {
                trace!(index, "result landed outside retained window, discarded");
            }
            Ok(page) => {
                self.cache.borrow_mut().put(index, page.clone());
                self.emit(SchedulerEvent::PageReady(index));
            }
            Err(err) => {
                warn!(index, error = %err, "page decode failed");
                self.cache.borrow_mut().mark_failed(index, err.clone());
                self.emit(SchedulerEvent::PageFailed(index));
            }
        }
    }
}

/// Windowed prefetch over one document handle at one render scale
///
/// A scheduler belongs to one generation: once that generation is
/// superseded it refuses new passes and discards late results.
#[derive(Clone)]
pub struct PrefetchScheduler {
    inner: Rc<Inner>,
}

impl PrefetchScheduler {
    pub fn builder(
        decoder: DecoderAdapter,
        cache: Rc<RefCell<PageCache>>,
        tracker: RenderTaskTracker,
    ) -> SchedulerBuilder {
        SchedulerBuilder {
            decoder,
            cache,
            tracker,
            policy: WindowPolicy::default(),
            scale: 1.0,
            initial_burst: 10,
            token: None,
            listener: None,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.inner.decoder.page_count()
    }

    pub fn scale(&self) -> f32 {
        self.inner.scale
    }

    pub fn policy(&self) -> WindowPolicy {
        self.inner.policy
    }

    pub fn generation(&self) -> u64 {
        self.inner.token.generation()
    }

    pub fn is_current(&self) -> bool {
        self.inner.token.is_current()
    }

    /// Latest retained window, if a pass has run
    pub fn retained_window(&self) -> Option<PageWindow> {
        self.inner.retained.get()
    }

    /// Run one scheduling pass around `center`.
    ///
    /// Returns `None` when the scheduler's generation is stale. Calling it
    /// twice with no state change in between requests nothing the second
    /// time.
    pub fn schedule(&self, center: PageIndex) -> Option<SchedulePass> {
        if self.inner.token.is_stale() {
            trace!(center, "schedule ignored, generation superseded");
            return None;
        }

        let page_count = self.page_count();
        let center = center.clamp(1, page_count.max(1));
        let window = self.inner.policy.prefetch_window(center, page_count)?;
        let retained = self.inner.policy.retained_window(window, page_count);
        self.inner.retained.set(Some(retained));

        let mut requested = Vec::new();
        for index in window.iter() {
            if self.inner.tracker.is_in_flight(index) {
                continue;
            }

            {
                let mut cache = self.inner.cache.borrow_mut();
                if cache.contains(index) {
                    continue;
                }
                if cache.is_failed(index) {
                    if index != center {
                        continue;
                    }
                    cache.clear_failure(index);
                }
            }

            drop(self.request(index));
            requested.push(index);
        }

        let evicted = self.inner.cache.borrow_mut().evict_outside(retained);
        if !evicted.is_empty() {
            self.inner.emit(SchedulerEvent::Evicted(evicted.clone()));
        }

        debug!(
            center,
            window_start = window.start(),
            window_end = window.end(),
            requested = requested.len(),
            evicted = evicted.len(),
            "schedule pass"
        );

        Some(SchedulePass { center, window, retained, requested, evicted })
    }

    /// Eagerly decode the pages nearest `anchor`, up to the initial burst size.
    ///
    /// Pages are taken from the retained window around `anchor`, closest
    /// first, so a burst at page 1 covers pages `1..=initial_burst`. The
    /// returned future resolves once every burst page has settled.
    pub fn burst(&self, anchor: PageIndex) -> LocalBoxFuture<'static, BurstReport> {
        let page_count = self.page_count();
        let Some(window) = self.inner.policy.prefetch_window(anchor, page_count) else {
            return async { BurstReport::default() }.boxed_local();
        };
        if self.inner.token.is_stale() {
            return async { BurstReport::default() }.boxed_local();
        }

        let anchor = anchor.clamp(1, page_count);
        let retained = self.inner.policy.retained_window(window, page_count);
        self.inner.retained.set(Some(retained));

        let mut pages: Vec<PageIndex> = retained.iter().collect();
        pages.sort_by_key(|index| (index.abs_diff(anchor), *index < anchor));
        pages.truncate(self.inner.initial_burst as usize);

        let pending: Vec<PendingDecode> = pages
            .iter()
            .filter(|index| {
                let cache = self.inner.cache.borrow();
                !cache.contains(**index) && !cache.is_failed(**index)
            })
            .map(|index| self.request(*index))
            .collect();

        let evicted = self.inner.cache.borrow_mut().evict_outside(retained);
        if !evicted.is_empty() {
            self.inner.emit(SchedulerEvent::Evicted(evicted));
        }

        debug!(anchor, pages = pages.len(), requested = pending.len(), "burst started");

        let cache = Rc::clone(&self.inner.cache);
        async move {
            join_all(pending).await;

            let cache = cache.borrow();
            let decoded = pages.iter().copied().filter(|index| cache.contains(*index)).collect();
            let failed = pages.iter().copied().filter(|index| cache.is_failed(*index)).collect();
            BurstReport { pages, decoded, failed }
        }
        .boxed_local()
    }

    /// Request a single page regardless of window position.
    ///
    /// Joins the pending decode if one exists. The result is still only
    /// committed if the page lies inside the retained window.
    pub fn request(&self, index: PageIndex) -> PendingDecode {
        let inner = Rc::clone(&self.inner);

        self.inner.tracker.ensure(index, move || {
            let decode = inner.decoder.decode(index, inner.scale);
            async move {
                let result = decode.await;
                inner.commit(index, &result);
                result
            }
            .boxed_local()
        })
    }
}

/// Configures a [`PrefetchScheduler`]
pub struct SchedulerBuilder {
    decoder: DecoderAdapter,
    cache: Rc<RefCell<PageCache>>,
    tracker: RenderTaskTracker,
    policy: WindowPolicy,
    scale: f32,
    initial_burst: u32,
    token: Option<GenerationToken>,
    listener: Option<SchedulerListener>,
}

impl SchedulerBuilder {
    pub fn with_policy(mut self, policy: WindowPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Render scale passed to the decoder
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Number of pages decoded by [`PrefetchScheduler::burst`]
    pub fn with_initial_burst(mut self, pages: u32) -> Self {
        self.initial_burst = pages;
        self
    }

    pub fn with_generation(mut self, token: GenerationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_listener(mut self, listener: SchedulerListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn build(self) -> PrefetchScheduler {
        PrefetchScheduler {
            inner: Rc::new(Inner {
                decoder: self.decoder,
                cache: self.cache,
                tracker: self.tracker,
                policy: self.policy,
                scale: self.scale,
                initial_burst: self.initial_burst,
                token: self.token.unwrap_or_else(|| Generation::new().token()),
                retained: Cell::new(None),
                listener: self.listener,
            }),
        }
    }
}
