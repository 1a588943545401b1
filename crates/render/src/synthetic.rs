//! Synthetic in-memory document source
//!
//! Produces solid-color pages after a configurable latency and keeps an
//! account of every decode call. Used by the CLI simulator and by tests that
//! need to observe how often, and how concurrently, pages are decoded.

use crate::source::{DocumentHandle, DocumentRef, DocumentSource, SourceError};
use crate::surface::{PageIndex, PageSize, RasterSurface};
use futures::future::{FutureExt, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

/// Shape and behavior of one synthetic document
#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub page_count: u32,
    pub page_size: PageSize,
    /// Time each decode stays suspended before producing its raster
    pub latency: Duration,
    /// Pages whose decode always fails
    pub failing_pages: HashSet<PageIndex>,
    /// Fill color of every page
    pub fill: [u8; 4],
    /// Whether opening this document fails
    pub fail_open: bool,
}

impl SyntheticSpec {
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            page_size: PageSize::new(60.0, 80.0),
            latency: Duration::from_millis(10),
            failing_pages: HashSet::new(),
            fill: [255, 255, 255, 255],
            fail_open: false,
        }
    }

    pub fn with_page_size(mut self, size: PageSize) -> Self {
        self.page_size = size;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_failing_pages(mut self, pages: impl IntoIterator<Item = PageIndex>) -> Self {
        self.failing_pages.extend(pages);
        self
    }

    pub fn with_fill(mut self, fill: [u8; 4]) -> Self {
        self.fill = fill;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }
}

#[derive(Debug, Default)]
struct DecodeLog {
    calls: HashMap<PageIndex, u32>,
    active: HashMap<PageIndex, u32>,
    max_active: HashMap<PageIndex, u32>,
    total: u64,
}

/// Source serving synthetic documents
///
/// Any reference opens the default spec unless a named document was
/// registered with [`SyntheticSource::with_document`].
pub struct SyntheticSource {
    default: Option<SyntheticSpec>,
    named: HashMap<String, SyntheticSpec>,
    opened: RefCell<Vec<Rc<SyntheticDocument>>>,
}

impl SyntheticSource {
    pub fn new(default: SyntheticSpec) -> Self {
        Self { default: Some(default), named: HashMap::new(), opened: RefCell::new(Vec::new()) }
    }

    /// A source that only serves registered names
    pub fn empty() -> Self {
        Self { default: None, named: HashMap::new(), opened: RefCell::new(Vec::new()) }
    }

    pub fn with_document(mut self, name: impl Into<String>, spec: SyntheticSpec) -> Self {
        self.named.insert(name.into(), spec);
        self
    }

    /// Every document opened so far, oldest first
    pub fn opened(&self) -> Vec<Rc<SyntheticDocument>> {
        self.opened.borrow().clone()
    }

    pub fn last_opened(&self) -> Option<Rc<SyntheticDocument>> {
        self.opened.borrow().last().cloned()
    }

    fn resolve(&self, reference: &DocumentRef) -> Result<SyntheticSpec, SourceError> {
        let named = match reference {
            DocumentRef::Name(name) => self.named.get(name),
            _ => None,
        };

        named
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| SourceError::NotFound(reference.to_string()))
    }
}

impl DocumentSource for SyntheticSource {
    fn open(
        &self,
        reference: &DocumentRef,
    ) -> LocalBoxFuture<'static, Result<Rc<dyn DocumentHandle>, SourceError>> {
        let resolved = self.resolve(reference).and_then(|spec| {
            if spec.fail_open {
                return Err(SourceError::NotFound(reference.to_string()));
            }
            if spec.page_count == 0 {
                return Err(SourceError::Empty);
            }
            Ok(spec)
        });

        let document = resolved.map(|spec| {
            let document = Rc::new(SyntheticDocument::new(spec));
            self.opened.borrow_mut().push(Rc::clone(&document));
            document
        });

        async move { document.map(|document| document as Rc<dyn DocumentHandle>) }.boxed_local()
    }
}

/// An open synthetic document
pub struct SyntheticDocument {
    spec: SyntheticSpec,
    closed: Cell<bool>,
    log: Rc<RefCell<DecodeLog>>,
}

impl SyntheticDocument {
    fn new(spec: SyntheticSpec) -> Self {
        Self { spec, closed: Cell::new(false), log: Rc::new(RefCell::new(DecodeLog::default())) }
    }

    pub fn spec(&self) -> &SyntheticSpec {
        &self.spec
    }

    /// Number of decode calls made for `index`
    pub fn decode_calls(&self, index: PageIndex) -> u32 {
        self.log.borrow().calls.get(&index).copied().unwrap_or(0)
    }

    /// Highest number of simultaneously pending decodes ever seen for `index`
    pub fn max_concurrent(&self, index: PageIndex) -> u32 {
        self.log.borrow().max_active.get(&index).copied().unwrap_or(0)
    }

    /// Decodes currently suspended
    pub fn pending(&self) -> u32 {
        self.log.borrow().active.values().sum()
    }

    pub fn total_decodes(&self) -> u64 {
        self.log.borrow().total
    }

    /// Indices that were decoded at least once, ascending
    pub fn decoded_pages(&self) -> Vec<PageIndex> {
        let mut pages: Vec<_> = self.log.borrow().calls.keys().copied().collect();
        pages.sort_unstable();
        pages
    }
}

impl DocumentHandle for SyntheticDocument {
    fn page_count(&self) -> u32 {
        self.spec.page_count
    }

    fn page_size(&self, index: PageIndex) -> Result<PageSize, SourceError> {
        if index == 0 || index > self.spec.page_count {
            return Err(SourceError::PageOutOfRange { page: index, page_count: self.spec.page_count });
        }
        Ok(self.spec.page_size)
    }

    fn decode(
        &self,
        index: PageIndex,
        scale: f32,
    ) -> LocalBoxFuture<'static, Result<RasterSurface, SourceError>> {
        if self.closed.get() {
            return async { Err(SourceError::Closed) }.boxed_local();
        }

        {
            let mut log = self.log.borrow_mut();
            log.total += 1;
            *log.calls.entry(index).or_default() += 1;
            let active = log.active.entry(index).or_default();
            *active += 1;
            let active = *active;
            let max = log.max_active.entry(index).or_default();
            *max = (*max).max(active);
        }

        let log = Rc::clone(&self.log);
        let latency = self.spec.latency;
        let fails = self.spec.failing_pages.contains(&index);
        let (width, height) = self.spec.page_size.scaled(scale);
        let fill = self.spec.fill;

        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            if let Some(active) = log.borrow_mut().active.get_mut(&index) {
                *active = active.saturating_sub(1);
            }

            if fails {
                return Err(SourceError::Raster(format!("synthetic failure on page {index}")));
            }

            Ok(RasterSurface::filled(width, height, fill))
        }
        .boxed_local()
    }

    fn close(&self) {
        self.closed.set(true);
    }

    fn is_closed(&self) -> bool {
        self.closed.get()
    }
}
