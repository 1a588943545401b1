//! Navigation debouncer
//!
//! Coalesces bursts of page changes into a single settle notification. Each
//! navigation restarts the quiet period; the settle callback only fires once
//! no further navigation arrived within the delay, and only with the latest
//! page.

use folio_render::PageIndex;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Callback receiving the page navigation settled on
pub type SettleCallback = Rc<dyn Fn(PageIndex)>;

#[derive(Default)]
struct DebounceState {
    pending: Option<JoinHandle<()>>,
    target: Option<PageIndex>,
    cursor: Option<PageIndex>,
    settled: u64,
}

/// Trailing-edge debouncer for page navigation
///
/// Must be used from within a `LocalSet`. Dropping the debouncer cancels the
/// pending settle.
pub struct NavigationDebouncer {
    delay: Duration,
    on_settle: SettleCallback,
    state: Rc<RefCell<DebounceState>>,
}

impl NavigationDebouncer {
    pub fn new(delay: Duration, on_settle: SettleCallback) -> Self {
        Self { delay, on_settle, state: Rc::new(RefCell::new(DebounceState::default())) }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record a navigation to `index` and restart the quiet period
    pub fn on_navigate(&self, index: PageIndex) {
        let state = Rc::clone(&self.state);
        let on_settle = Rc::clone(&self.on_settle);
        let delay = self.delay;

        let task = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;

            {
                let mut state = state.borrow_mut();
                state.pending = None;
                state.cursor = Some(index);
                state.settled += 1;
            }

            trace!(index, "navigation settled");
            on_settle(index);
        });

        let mut state = self.state.borrow_mut();
        if let Some(previous) = state.pending.replace(task) {
            previous.abort();
        }
        state.target = Some(index);
    }

    /// Drop the pending settle, if any. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        let pending = self.state.borrow_mut().pending.take();
        match pending {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.borrow().pending.is_some()
    }

    /// Page of the most recent settle
    pub fn cursor(&self) -> Option<PageIndex> {
        self.state.borrow().cursor
    }

    /// Page of the most recent navigation, settled or not
    pub fn target(&self) -> Option<PageIndex> {
        self.state.borrow().target
    }

    /// Number of times the settle callback fired
    pub fn settled_count(&self) -> u64 {
        self.state.borrow().settled
    }
}

impl Drop for NavigationDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::LocalSet;

    fn recording(delay_ms: u64) -> (NavigationDebouncer, Rc<RefCell<Vec<PageIndex>>>) {
        let settled = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&settled);
        let debouncer = NavigationDebouncer::new(
            Duration::from_millis(delay_ms),
            Rc::new(move |index| sink.borrow_mut().push(index)),
        );
        (debouncer, settled)
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_rapid_navigation_settles_once_on_latest_page() {
        LocalSet::new()
            .run_until(async {
                let (debouncer, settled) = recording(100);

                for index in 1..=5 {
                    debouncer.on_navigate(index);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                assert!(settled.borrow().is_empty());
                assert_eq!(debouncer.target(), Some(5));

                tokio::time::sleep(Duration::from_millis(200)).await;
                assert_eq!(*settled.borrow(), vec![5]);
                assert_eq!(debouncer.cursor(), Some(5));
                assert_eq!(debouncer.settled_count(), 1);
                assert!(!debouncer.is_pending());
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_spaced_navigation_settles_each_time() {
        LocalSet::new()
            .run_until(async {
                let (debouncer, settled) = recording(100);

                debouncer.on_navigate(3);
                tokio::time::sleep(Duration::from_millis(150)).await;
                debouncer.on_navigate(4);
                tokio::time::sleep(Duration::from_millis(150)).await;

                assert_eq!(*settled.borrow(), vec![3, 4]);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_cancel_drops_pending_settle() {
        LocalSet::new()
            .run_until(async {
                let (debouncer, settled) = recording(100);

                debouncer.on_navigate(7);
                assert!(debouncer.is_pending());
                assert!(debouncer.cancel());
                assert!(!debouncer.cancel());

                tokio::time::sleep(Duration::from_millis(500)).await;
                assert!(settled.borrow().is_empty());
                assert_eq!(debouncer.cursor(), None);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_drop_cancels_pending_settle() {
        LocalSet::new()
            .run_until(async {
                let (debouncer, settled) = recording(100);

                debouncer.on_navigate(2);
                drop(debouncer);

                tokio::time::sleep(Duration::from_millis(500)).await;
                assert!(settled.borrow().is_empty());
            })
            .await;
    }
}
