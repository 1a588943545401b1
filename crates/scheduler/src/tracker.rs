//! Render task tracker
//!
//! Guarantees at most one outstanding decode per page index. The first caller
//! of [`RenderTaskTracker::ensure`] for an index starts the work; callers that
//! arrive while it is pending join the same shared future and observe the
//! same outcome.
//!
//! Tracked work is spawned onto the current [`tokio::task::LocalSet`], so it
//! runs to completion even if every caller drops its future. An index leaves
//! the in-flight set when its work settles, before any joined caller is
//! woken.
//!
//! Abandoned work stays known to the tracker until it settles. A fresh
//! request for the same index waits for it before invoking its producer, so
//! one handle never decodes the same page twice at once. [`reset`] forgets
//! abandoned work too, for when the handle itself is being replaced.
//!
//! [`reset`]: RenderTaskTracker::reset

use folio_render::{DecodeError, DecodedPage, PageIndex};
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::trace;

pub type DecodeResult = Result<DecodedPage, DecodeError>;

/// A decode any number of callers can await
pub type PendingDecode = Shared<LocalBoxFuture<'static, DecodeResult>>;

/// Statistics about tracked work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Decodes started
    pub started: u64,

    /// Requests that joined an already pending decode
    pub joined: u64,

    /// Decodes still pending
    pub in_flight: usize,

    /// Pending decodes dropped from tracking by `abandon_all`
    pub abandoned: u64,

    /// Decodes that waited for abandoned work on the same index
    pub deferred: u64,
}

struct InFlight {
    ticket: u64,
    future: PendingDecode,
}

#[derive(Default)]
struct TrackerState {
    in_flight: HashMap<PageIndex, InFlight>,
    /// Abandoned work that has not settled yet
    stale: HashMap<PageIndex, InFlight>,
    next_ticket: u64,
    started: u64,
    joined: u64,
    abandoned: u64,
    deferred: u64,
}

/// In-flight set with join semantics
///
/// Clones share the same in-flight set.
#[derive(Clone, Default)]
pub struct RenderTaskTracker {
    state: Rc<RefCell<TrackerState>>,
}

impl RenderTaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the pending decode for `index`, or start one with `producer`.
    ///
    /// `producer` is only invoked when nothing is in flight for `index`. If
    /// abandoned work for `index` is still running, the producer is invoked
    /// once that work settles.
    /// Must be called from within a `LocalSet`.
    pub fn ensure<F>(&self, index: PageIndex, producer: F) -> PendingDecode
    where
        F: FnOnce() -> LocalBoxFuture<'static, DecodeResult> + 'static,
    {
        if let Some(pending) = self.join(index) {
            return pending;
        }

        let (ticket, stale) = {
            let mut state = self.state.borrow_mut();
            state.next_ticket += 1;
            let stale = state.stale.remove(&index).map(|entry| entry.future);
            if stale.is_some() {
                state.deferred += 1;
            }
            (state.next_ticket, stale)
        };

        let work = match stale {
            None => producer(),
            Some(stale) => {
                trace!(index, "waiting for abandoned decode");
                async move {
                    let _ = stale.await;
                    producer().await
                }
                .boxed_local()
            }
        };
        let state = Rc::downgrade(&self.state);
        let future = async move {
            let result = work.await;

            if let Some(state) = state.upgrade() {
                let mut state = state.borrow_mut();
                let owned = state.in_flight.get(&index).is_some_and(|entry| entry.ticket == ticket);
                if owned {
                    state.in_flight.remove(&index);
                }
                let stale = state.stale.get(&index).is_some_and(|entry| entry.ticket == ticket);
                if stale {
                    state.stale.remove(&index);
                }
            }

            result
        }
        .boxed_local()
        .shared();

        {
            let mut state = self.state.borrow_mut();
            state.started += 1;
            state.in_flight.insert(index, InFlight { ticket, future: future.clone() });
        }

        trace!(index, "decode started");
        tokio::task::spawn_local(future.clone().map(|_| ()));

        future
    }

    fn join(&self, index: PageIndex) -> Option<PendingDecode> {
        let mut state = self.state.borrow_mut();
        let pending = state.in_flight.get(&index).map(|entry| entry.future.clone())?;
        state.joined += 1;
        trace!(index, "joined pending decode");
        Some(pending)
    }

    pub fn is_in_flight(&self, index: PageIndex) -> bool {
        self.state.borrow().in_flight.contains_key(&index)
    }

    /// Pending indices in ascending order
    pub fn in_flight(&self) -> Vec<PageIndex> {
        let mut indices: Vec<PageIndex> = self.state.borrow().in_flight.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    pub fn len(&self) -> usize {
        self.state.borrow().in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().in_flight.is_empty()
    }

    /// Stop tracking every pending decode.
    ///
    /// The work itself keeps running to completion; its owners are expected
    /// to discard the result through their generation token. A later
    /// `ensure` for the same index does not join it, but starts fresh work
    /// once it settles.
    pub fn abandon_all(&self) -> usize {
        let mut state = self.state.borrow_mut();
        let pending: Vec<_> = state.in_flight.drain().collect();
        let count = pending.len();
        state.stale.extend(pending);
        state.abandoned += count as u64;
        count
    }

    /// Abandon every pending decode and forget abandoned work entirely.
    ///
    /// For a handle that is being closed: later requests target another
    /// handle and never wait on this one.
    pub fn reset(&self) -> usize {
        let count = self.abandon_all();
        self.state.borrow_mut().stale.clear();
        count
    }

    pub fn stats(&self) -> TrackerStats {
        let state = self.state.borrow();
        TrackerStats {
            started: state.started,
            joined: state.joined,
            in_flight: state.in_flight.len(),
            abandoned: state.abandoned,
            deferred: state.deferred,
        }
    }
}
