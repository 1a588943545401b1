//! Viewer controller
//!
//! Composes the decoder, cache, tracker, scheduler and debouncer for one
//! viewing session at a time, and republishes the resident set after every
//! cache mutation.
//!
//! Session lifecycle:
//! - `open` tears down any previous session, opens the handle, derives the
//!   page count and first-page geometry, runs the initial burst, then marks
//!   the session ready.
//! - While ready, navigation goes through the debouncer; each settled
//!   navigation runs one scheduling pass.
//! - `close`, replacement and drop cancel the debouncer, advance the
//!   generation, abandon in-flight decodes, clear the cache and close the
//!   handle.
//! - Zoom keeps the handle, so decodes abandoned by a zoom still hold their
//!   page until they settle; the re-decode at the new scale starts after.
//!
//! A handle that dies mid-session moves the controller to
//! [`ViewerState::Failed`]; nothing is scheduled after that until the next
//! `open`.

use crate::config::{ConfigError, ViewerConfig};
use crate::error::ViewerError;
use crate::snapshot::{PageSlot, ResidentPages, ViewerState};
use folio_cache::{CacheStats, PageCache, WindowPolicy};
use folio_render::{
    DecodeError, DecoderAdapter, DocumentRef, DocumentSource, PageIndex, PageSize, SourceError,
};
use folio_scheduler::{
    BurstReport, Generation, GenerationToken, NavigationDebouncer, PrefetchScheduler,
    RenderTaskTracker, SchedulerEvent, SchedulerListener, TrackerStats,
};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Counters across the cache and the in-flight set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewerStats {
    pub generation: u64,
    pub cache: CacheStats,
    pub tracker: TrackerStats,
}

struct Session {
    reference: DocumentRef,
    decoder: DecoderAdapter,
    scheduler: PrefetchScheduler,
    first_page: PageSize,
}

struct Inner {
    this: Weak<Inner>,
    source: Rc<dyn DocumentSource>,
    config: ViewerConfig,
    policy: WindowPolicy,
    cache: Rc<RefCell<PageCache>>,
    tracker: RenderTaskTracker,
    generation: Generation,
    debouncer: NavigationDebouncer,
    session: RefCell<Option<Session>>,
    cursor: Cell<PageIndex>,
    zoom: Cell<f32>,
    state: watch::Sender<ViewerState>,
    pages: watch::Sender<ResidentPages>,
}

impl Inner {
    fn scale(&self) -> f32 {
        self.config.render_scale * self.zoom.get()
    }

    fn current_scheduler(&self) -> Option<PrefetchScheduler> {
        self.session.borrow().as_ref().map(|session| session.scheduler.clone())
    }

    /// Page count of a session that accepts navigation
    fn active_page_count(&self) -> Result<u32, ViewerError> {
        if !matches!(*self.state.borrow(), ViewerState::Loading | ViewerState::Ready) {
            return Err(ViewerError::NotReady);
        }

        self.session
            .borrow()
            .as_ref()
            .map(|session| session.decoder.page_count())
            .ok_or(ViewerError::NotReady)
    }

    fn build_scheduler(&self, decoder: DecoderAdapter, token: GenerationToken) -> PrefetchScheduler {
        let this = self.this.clone();
        let listener: SchedulerListener = Rc::new(move |event| {
            let Some(inner) = this.upgrade() else {
                return;
            };
            match event {
                SchedulerEvent::HandleLost(error) => inner.fail(error),
                _ => inner.publish(),
            }
        });

        PrefetchScheduler::builder(decoder, Rc::clone(&self.cache), self.tracker.clone())
            .with_policy(self.policy)
            .with_scale(self.scale())
            .with_initial_burst(self.config.initial_burst)
            .with_generation(token)
            .with_listener(listener)
            .build()
    }

    fn settle(&self, index: PageIndex) {
        self.cursor.set(index);

        if let Some(scheduler) = self.current_scheduler() {
            scheduler.schedule(index);
        }
        self.publish();
    }

    fn fail(&self, cause: DecodeError) {
        let reference = self
            .session
            .borrow()
            .as_ref()
            .map(|session| session.reference.to_string())
            .unwrap_or_default();
        let error = ViewerError::HandleUnavailable { reference, reason: cause.to_string() };
        warn!(%error, "session failed");

        self.debouncer.cancel();
        self.generation.advance();
        self.tracker.abandon_all();
        self.state.send_replace(ViewerState::Failed(error));
        self.publish();
    }

    fn teardown(&self) {
        self.debouncer.cancel();
        self.generation.advance();
        let abandoned = self.tracker.reset();
        let cleared = self.cache.borrow_mut().clear();

        let session = self.session.borrow_mut().take();
        if let Some(session) = session {
            session.decoder.handle().close();
            debug!(reference = %session.reference, abandoned, cleared, "session ended");
        }
    }

    fn publish(&self) {
        let generation = self.generation.current();
        let zoom = self.zoom.get();

        let snapshot = match self.session.borrow().as_ref() {
            None => ResidentPages { generation, zoom, scale: self.scale(), ..Default::default() },
            Some(session) => {
                let scale = session.scheduler.scale();
                let cache = self.cache.borrow();

                ResidentPages {
                    generation,
                    page_count: session.decoder.page_count(),
                    cursor: self.cursor.get(),
                    zoom,
                    scale,
                    first_page: Some(session.first_page.scaled(scale)),
                    entries: cache
                        .entries()
                        .into_iter()
                        .map(|(index, entry)| (index, PageSlot::from(entry)))
                        .collect(),
                    in_flight: self
                        .tracker
                        .in_flight()
                        .into_iter()
                        .filter(|index| cache.entry(*index).is_none())
                        .collect(),
                }
            }
        };

        self.pages.send_replace(snapshot);
    }

    /// The error a stale session should report to its caller
    fn superseded_error(&self) -> ViewerError {
        match &*self.state.borrow() {
            ViewerState::Failed(error) => error.clone(),
            _ => ViewerError::Superseded,
        }
    }
}

/// Owns one viewing session at a time
///
/// Must be driven from within a `tokio::task::LocalSet`.
///
/// # Example
///
/// ```
/// use folio_render::{SyntheticSource, SyntheticSpec};
/// use folio_viewer::{ViewerConfig, ViewerController};
/// use std::rc::Rc;
///
/// # let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
/// # tokio::task::LocalSet::new().block_on(&runtime, async {
/// let source = Rc::new(SyntheticSource::new(SyntheticSpec::new(40)));
/// let viewer = ViewerController::new(source, ViewerConfig::default()).unwrap();
///
/// viewer.open("issue-7").await.unwrap();
/// assert!(viewer.is_ready());
///
/// viewer.on_flip(11).unwrap(); // the flip widget counts from 0
/// # });
/// ```
pub struct ViewerController {
    inner: Rc<Inner>,
}

impl ViewerController {
    pub fn new(source: Rc<dyn DocumentSource>, config: ViewerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = config.window_policy()?;
        let debounce = config.debounce();
        let capacity = config.capacity as usize;

        let inner = Rc::new_cyclic(|this: &Weak<Inner>| {
            let settle = this.clone();
            let debouncer = NavigationDebouncer::new(
                debounce,
                Rc::new(move |index| {
                    if let Some(inner) = settle.upgrade() {
                        inner.settle(index);
                    }
                }),
            );

            Inner {
                this: this.clone(),
                source,
                config,
                policy,
                cache: Rc::new(RefCell::new(PageCache::new(capacity))),
                tracker: RenderTaskTracker::new(),
                generation: Generation::new(),
                debouncer,
                session: RefCell::new(None),
                cursor: Cell::new(1),
                zoom: Cell::new(1.0),
                state: watch::channel(ViewerState::Idle).0,
                pages: watch::channel(ResidentPages::default()).0,
            }
        });

        Ok(Self { inner })
    }

    /// Start a session on `reference`, replacing any current one.
    ///
    /// Resolves once the initial burst has settled. Returns
    /// [`ViewerError::Superseded`] if another `open` or `close` happened
    /// meanwhile.
    pub async fn open(&self, reference: impl Into<DocumentRef>) -> Result<BurstReport, ViewerError> {
        let inner = &self.inner;
        let reference = reference.into();

        inner.teardown();
        inner.zoom.set(1.0);
        inner.cursor.set(1);
        let token = inner.generation.token();
        inner.state.send_replace(ViewerState::Loading);
        inner.publish();

        let opened = inner.source.open(&reference).await;
        if token.is_stale() {
            if let Ok(handle) = opened {
                handle.close();
            }
            return Err(ViewerError::Superseded);
        }

        let unavailable = |err: SourceError| ViewerError::HandleUnavailable {
            reference: reference.to_string(),
            reason: err.to_string(),
        };
        let geometry = opened.and_then(|handle| match handle.page_size(1) {
            Ok(first_page) => Ok((handle, first_page)),
            Err(err) => {
                handle.close();
                Err(err)
            }
        });
        let (handle, first_page) = match geometry {
            Ok(geometry) => geometry,
            Err(err) => {
                let error = unavailable(err);
                warn!(%error, "failed to open document");
                inner.state.send_replace(ViewerState::Failed(error.clone()));
                inner.publish();
                return Err(error);
            }
        };

        let page_count = handle.page_count();
        let decoder = DecoderAdapter::new(handle);
        let scheduler = inner.build_scheduler(decoder.clone(), token.clone());
        debug!(%reference, page_count, generation = token.generation(), "session started");

        *inner.session.borrow_mut() =
            Some(Session { reference, decoder, scheduler: scheduler.clone(), first_page });
        inner.publish();

        let report = scheduler.burst(1).await;
        if token.is_stale() {
            return Err(inner.superseded_error());
        }

        debug!(decoded = report.decoded.len(), failed = report.failed.len(), "initial burst finished");
        inner.state.send_replace(ViewerState::Ready);
        inner.publish();
        Ok(report)
    }

    /// Record a page turn. The scheduling pass runs once navigation settles.
    pub fn on_navigate(&self, index: PageIndex) -> Result<(), ViewerError> {
        let page_count = self.inner.active_page_count()?;
        if index == 0 || index > page_count {
            return Err(ViewerError::PageOutOfRange { page: index, page_count });
        }

        self.inner.debouncer.on_navigate(index);
        Ok(())
    }

    /// [`on_navigate`](Self::on_navigate) for a 0-based flip event
    pub fn on_flip(&self, zero_based: u32) -> Result<(), ViewerError> {
        self.on_navigate(zero_based.saturating_add(1))
    }

    /// Clear a failed mark and decode `index` again.
    ///
    /// Only pages inside the current resident window can be retried; a result
    /// for any other page would be dropped on arrival.
    pub async fn retry(&self, index: PageIndex) -> Result<(), ViewerError> {
        let page_count = self.inner.active_page_count()?;
        if index == 0 || index > page_count {
            return Err(ViewerError::PageOutOfRange { page: index, page_count });
        }
        let scheduler = self.inner.current_scheduler().ok_or(ViewerError::NotReady)?;
        if let Some(retained) = scheduler.retained_window() {
            if !retained.contains(index) {
                return Err(ViewerError::NotRetained {
                    page: index,
                    start: retained.start(),
                    end: retained.end(),
                });
            }
        }

        if self.inner.cache.borrow_mut().clear_failure(index) {
            self.inner.publish();
        }

        scheduler.request(index).await?;
        Ok(())
    }

    /// Set the zoom factor, clamped to the configured limits.
    ///
    /// Invalidates every raster and runs a fresh burst at the new scale around
    /// the cursor. Returns `false` if the clamped factor did not change.
    pub async fn zoom(&self, factor: f32) -> Result<bool, ViewerError> {
        let inner = &self.inner;
        if !inner.state.borrow().is_ready() {
            return Err(ViewerError::NotReady);
        }

        let zoom = inner.config.clamp_zoom(factor);
        if (zoom - inner.zoom.get()).abs() < f32::EPSILON {
            return Ok(false);
        }

        inner.zoom.set(zoom);
        inner.generation.advance();
        let abandoned = inner.tracker.abandon_all();
        let cleared = inner.cache.borrow_mut().clear();
        let token = inner.generation.token();

        let scheduler = {
            let mut session = inner.session.borrow_mut();
            let Some(session) = session.as_mut() else {
                return Err(ViewerError::NotReady);
            };
            let scheduler = inner.build_scheduler(session.decoder.clone(), token.clone());
            session.scheduler = scheduler.clone();
            scheduler
        };
        debug!(zoom, scale = scheduler.scale(), abandoned, cleared, "zoom changed");
        inner.publish();

        scheduler.burst(inner.cursor.get()).await;
        if token.is_stale() {
            return Err(inner.superseded_error());
        }

        inner.publish();
        Ok(true)
    }

    pub async fn zoom_in(&self) -> Result<bool, ViewerError> {
        self.zoom(self.zoom_factor() + self.inner.config.zoom_step).await
    }

    pub async fn zoom_out(&self) -> Result<bool, ViewerError> {
        self.zoom(self.zoom_factor() - self.inner.config.zoom_step).await
    }

    /// End the session and release every raster
    pub fn close(&self) {
        self.inner.teardown();
        self.inner.state.send_replace(ViewerState::Closed);
        self.inner.publish();
    }

    /// Latest published resident set
    pub fn resident_pages(&self) -> ResidentPages {
        self.inner.pages.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResidentPages> {
        self.inner.pages.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ViewerState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> ViewerState {
        self.inner.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.borrow().is_ready()
    }

    pub fn page_count(&self) -> Option<u32> {
        self.inner.session.borrow().as_ref().map(|session| session.decoder.page_count())
    }

    /// Last settled navigation target
    pub fn cursor(&self) -> PageIndex {
        self.inner.cursor.get()
    }

    pub fn zoom_factor(&self) -> f32 {
        self.inner.zoom.get()
    }

    /// Effective raster scale, `render_scale * zoom`
    pub fn scale(&self) -> f32 {
        self.inner.scale()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> ViewerStats {
        ViewerStats {
            generation: self.inner.generation.current(),
            cache: self.inner.cache.borrow().stats(),
            tracker: self.inner.tracker.stats(),
        }
    }
}

impl Drop for ViewerController {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}
