//! Decoder adapter
//!
//! Wraps a [`DocumentHandle`] and produces [`DecodedPage`]s. The adapter owns no
//! cache state; callers are responsible for not decoding the same index twice
//! concurrently.

use crate::source::{DocumentHandle, SourceError};
use crate::surface::{DecodedPage, PageIndex};
use futures::future::{FutureExt, LocalBoxFuture};
use std::rc::Rc;
use tracing::trace;

/// Why a single page failed to decode
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeCause {
    #[error("page is outside 1..={page_count}")]
    OutOfRange { page_count: u32 },
    #[error("document handle is closed")]
    HandleClosed,
    #[error("corrupt page: {0}")]
    Corrupt(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("rasterization failed: {0}")]
    Raster(String),
}

/// A page that failed to rasterize
///
/// Cloneable so every caller joined on the same decode observes the same
/// outcome.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to decode page {index}: {cause}")]
pub struct DecodeError {
    pub index: PageIndex,
    pub cause: DecodeCause,
}

impl DecodeError {
    pub fn new(index: PageIndex, cause: DecodeCause) -> Self {
        Self { index, cause }
    }

    pub fn from_source(index: PageIndex, err: SourceError) -> Self {
        let cause = match err {
            SourceError::Closed => DecodeCause::HandleClosed,
            SourceError::Io(err) => DecodeCause::Io(err.to_string()),
            SourceError::Parse(err) => DecodeCause::Corrupt(err.to_string()),
            SourceError::EncryptedUnsupported | SourceError::Empty => {
                DecodeCause::Corrupt(err.to_string())
            }
            SourceError::PageOutOfRange { page_count, .. } => {
                DecodeCause::OutOfRange { page_count }
            }
            SourceError::NotFound(_) | SourceError::Raster(_) => {
                DecodeCause::Raster(err.to_string())
            }
        };
        Self { index, cause }
    }

    /// Whether this failure means the whole session has lost its document.
    pub fn is_fatal(&self) -> bool {
        matches!(self.cause, DecodeCause::HandleClosed)
    }
}

/// Turns page indices into decoded pages through one document handle
#[derive(Clone)]
pub struct DecoderAdapter {
    handle: Rc<dyn DocumentHandle>,
}

impl DecoderAdapter {
    pub fn new(handle: Rc<dyn DocumentHandle>) -> Self {
        Self { handle }
    }

    pub fn page_count(&self) -> u32 {
        self.handle.page_count()
    }

    pub fn handle(&self) -> &Rc<dyn DocumentHandle> {
        &self.handle
    }

    /// Decode one page at `scale`.
    ///
    /// Loads the page geometry, rasterizes, and wraps the result. A handle
    /// closed before or during rasterization yields
    /// [`DecodeCause::HandleClosed`].
    pub fn decode(
        &self,
        index: PageIndex,
        scale: f32,
    ) -> LocalBoxFuture<'static, Result<DecodedPage, DecodeError>> {
        let handle = Rc::clone(&self.handle);

        async move {
            if handle.is_closed() {
                return Err(DecodeError::new(index, DecodeCause::HandleClosed));
            }

            let page_count = handle.page_count();
            if index == 0 || index > page_count {
                return Err(DecodeError::new(index, DecodeCause::OutOfRange { page_count }));
            }

            let size =
                handle.page_size(index).map_err(|err| DecodeError::from_source(index, err))?;
            let surface = handle
                .decode(index, scale)
                .await
                .map_err(|err| DecodeError::from_source(index, err))?;

            if handle.is_closed() {
                return Err(DecodeError::new(index, DecodeCause::HandleClosed));
            }

            trace!(index, width = surface.width(), height = surface.height(), "page decoded");
            Ok(DecodedPage::new(index, scale, size, surface))
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{SyntheticSource, SyntheticSpec};
    use crate::{DocumentRef, DocumentSource, PageSize};

    async fn open(spec: SyntheticSpec) -> DecoderAdapter {
        let source = SyntheticSource::new(spec);
        let handle = source.open(&DocumentRef::from("doc")).await.expect("open should succeed");
        DecoderAdapter::new(handle)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_decodes_page_at_requested_scale() {
        let decoder = open(SyntheticSpec::new(3).with_page_size(PageSize::new(100.0, 200.0))).await;

        let page = decoder.decode(2, 1.5).await.expect("decode should succeed");
        assert_eq!(page.index(), 2);
        assert_eq!(page.width(), 150);
        assert_eq!(page.height(), 300);
        assert_eq!(page.scale(), 1.5);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_rejects_indices_outside_document() {
        let decoder = open(SyntheticSpec::new(3)).await;

        let zero = decoder.decode(0, 1.0).await.expect_err("page 0 is invalid");
        assert_eq!(zero.cause, DecodeCause::OutOfRange { page_count: 3 });

        let past_end = decoder.decode(4, 1.0).await.expect_err("page 4 is invalid");
        assert_eq!(past_end.index, 4);
        assert!(!past_end.is_fatal());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_closed_handle_is_fatal() {
        let decoder = open(SyntheticSpec::new(3)).await;
        decoder.handle().close();

        let err = decoder.decode(1, 1.0).await.expect_err("closed handle cannot decode");
        assert_eq!(err.cause, DecodeCause::HandleClosed);
        assert!(err.is_fatal());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_source_failures_carry_the_page_index() {
        let decoder = open(SyntheticSpec::new(5).with_failing_pages([4])).await;

        let err = decoder.decode(4, 1.0).await.expect_err("page 4 is configured to fail");
        assert_eq!(err.index, 4);
        assert!(matches!(err.cause, DecodeCause::Raster(_)));
    }
}
