//! Folio Viewer Library
//!
//! The viewer controller ties the render cache together for one reading
//! session: it opens a document, runs the initial burst, debounces
//! navigation into prefetch passes, and publishes the resident pages for the
//! page-flip UI.

pub mod config;
pub mod controller;
pub mod error;
pub mod snapshot;

pub use config::{ConfigError, ViewerConfig};
pub use controller::{ViewerController, ViewerStats};
pub use error::ViewerError;
pub use snapshot::{PageSlot, ResidentPages, ViewerState};
