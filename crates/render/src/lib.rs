//! Folio Render Library
//!
//! Document sources and the decoder adapter that turns a page index into a
//! display-ready raster surface.

pub mod decoder;
pub mod encode;
pub mod lopdf_source;
pub mod source;
pub mod surface;
pub mod synthetic;

pub use decoder::{DecodeCause, DecodeError, DecoderAdapter};
pub use encode::EncodeError;
pub use lopdf_source::{LopdfDocument, LopdfSource};
pub use source::{DocumentHandle, DocumentRef, DocumentSource, SourceError};
pub use surface::{DecodedPage, PageIndex, PageSize, RasterSurface, RgbaImage, MAX_RASTER_SIDE};
pub use synthetic::{SyntheticDocument, SyntheticSource, SyntheticSpec};
