use folio_cache::WindowError;
use folio_render::{DecodeError, PageIndex};

/// Errors surfaced by the viewer controller
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewerError {
    /// The document could not be opened, or its handle died mid-session.
    /// Fatal to the session.
    #[error("document {reference} unavailable: {reason}")]
    HandleUnavailable { reference: String, reason: String },

    #[error("no document is ready")]
    NotReady,

    /// Another open or close replaced this session before it became ready
    #[error("session was replaced before it became ready")]
    Superseded,

    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: PageIndex, page_count: u32 },

    /// The page is valid but too far from the cursor to be kept resident
    #[error("page {page} is outside the resident window {start}-{end}")]
    NotRetained { page: PageIndex, start: PageIndex, end: PageIndex },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Window(#[from] WindowError),
}
