//! Document source interface
//!
//! A [`DocumentSource`] opens a [`DocumentRef`] into a [`DocumentHandle`]. The
//! handle is owned by one viewing session and rasterizes pages on request.
//! Futures returned here are `!Send`: the render cache runs on a single
//! cooperative thread.

use crate::surface::{PageIndex, PageSize, RasterSurface};
use futures::future::LocalBoxFuture;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Reference to a document a source knows how to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRef {
    Path(PathBuf),
    Bytes(Vec<u8>),
    /// Logical name, resolved by the source (used by the synthetic source)
    Name(String),
}

impl From<PathBuf> for DocumentRef {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for DocumentRef {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for DocumentRef {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&str> for DocumentRef {
    fn from(value: &str) -> Self {
        Self::Name(value.to_owned())
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentRef::Path(path) => write!(f, "{}", path.display()),
            DocumentRef::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            DocumentRef::Name(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    Empty,
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: PageIndex, page_count: u32 },
    #[error("document handle is closed")]
    Closed,
    #[error("rasterization failed: {0}")]
    Raster(String),
}

/// An open document, valid until [`DocumentHandle::close`]
pub trait DocumentHandle {
    fn page_count(&self) -> u32;

    /// Geometry of a 1-based page index
    fn page_size(&self, index: PageIndex) -> Result<PageSize, SourceError>;

    /// Rasterize a page at `scale`.
    ///
    /// Must be safe to call concurrently for different indices. Calls made
    /// after `close()` fail with [`SourceError::Closed`].
    fn decode(
        &self,
        index: PageIndex,
        scale: f32,
    ) -> LocalBoxFuture<'static, Result<RasterSurface, SourceError>>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Opens documents into handles
pub trait DocumentSource {
    fn open(
        &self,
        reference: &DocumentRef,
    ) -> LocalBoxFuture<'static, Result<Rc<dyn DocumentHandle>, SourceError>>;
}
