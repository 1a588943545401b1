//! lopdf-backed document source
//!
//! Reads page geometry from each page's MediaBox and rasterizes a blank page
//! with a light border at the requested scale. Parsing and rasterization run
//! on the blocking pool so the cooperative thread is never stalled.

use crate::source::{DocumentHandle, DocumentRef, DocumentSource, SourceError};
use crate::surface::{PageIndex, PageSize, RasterSurface, RgbaImage, MAX_RASTER_SIDE};
use futures::future::{FutureExt, LocalBoxFuture};
use image::Rgba;
use lopdf::Document;
use std::cell::Cell;
use std::fs;
use std::rc::Rc;
use tracing::debug;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BORDER: Rgba<u8> = Rgba([220, 220, 220, 255]);

/// Opens PDF files and byte buffers with lopdf
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfSource;

impl LopdfSource {
    pub fn new() -> Self {
        Self
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, SourceError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(SourceError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            let dict = doc.get_dictionary(object_id)?;
            let size = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| {
                    if array.len() != 4 {
                        return None;
                    }
                    let x0 = array[0].as_float().ok()?;
                    let y0 = array[1].as_float().ok()?;
                    let x1 = array[2].as_float().ok()?;
                    let y1 = array[3].as_float().ok()?;
                    Some(PageSize::new((x1 - x0).abs(), (y1 - y0).abs()))
                })
                .unwrap_or(PageSize::LETTER);

            sizes.push(size);
        }

        if sizes.is_empty() {
            return Err(SourceError::Empty);
        }

        Ok(sizes)
    }

    /// Open a document synchronously
    pub fn open_blocking(reference: &DocumentRef) -> Result<LopdfDocument, SourceError> {
        let bytes = match reference {
            DocumentRef::Path(path) => fs::read(path)?,
            DocumentRef::Bytes(bytes) => bytes.clone(),
            DocumentRef::Name(name) => fs::read(name)?,
        };

        let page_sizes = Self::parse_sizes(&bytes)?;
        debug!(%reference, pages = page_sizes.len(), "opened PDF");

        Ok(LopdfDocument { page_sizes, closed: Cell::new(false) })
    }
}

impl DocumentSource for LopdfSource {
    fn open(
        &self,
        reference: &DocumentRef,
    ) -> LocalBoxFuture<'static, Result<Rc<dyn DocumentHandle>, SourceError>> {
        let reference = reference.clone();

        async move {
            let page_sizes = tokio::task::spawn_blocking(move || {
                Self::open_blocking(&reference).map(|document| document.page_sizes)
            })
            .await
            .map_err(|err| SourceError::Raster(err.to_string()))??;

            Ok(Rc::new(LopdfDocument { page_sizes, closed: Cell::new(false) })
                as Rc<dyn DocumentHandle>)
        }
        .boxed_local()
    }
}

/// An open PDF parsed by lopdf
#[derive(Debug)]
pub struct LopdfDocument {
    page_sizes: Vec<PageSize>,
    closed: Cell<bool>,
}

impl LopdfDocument {
    /// Rasterize a blank page of `size` at `scale`
    ///
    /// Fails without allocating if the raster would exceed
    /// [`MAX_RASTER_SIDE`] on either side.
    pub fn rasterize(size: PageSize, scale: f32) -> Result<RasterSurface, SourceError> {
        let (width, height) = size.raster_dimensions(scale).ok_or_else(|| {
            SourceError::Raster(format!(
                "{}x{} pt at scale {scale} exceeds the {MAX_RASTER_SIDE} px raster limit",
                size.width_pt, size.height_pt
            ))
        })?;
        let mut image = RgbaImage::from_pixel(width, height, PAPER);

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, BORDER);
                image.put_pixel(x, height - 1, BORDER);
            }
            for y in 0..height {
                image.put_pixel(0, y, BORDER);
                image.put_pixel(width - 1, y, BORDER);
            }
        }

        Ok(RasterSurface::new(image))
    }
}

impl DocumentHandle for LopdfDocument {
    fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    fn page_size(&self, index: PageIndex) -> Result<PageSize, SourceError> {
        let page_count = self.page_count();
        index
            .checked_sub(1)
            .and_then(|zero_based| self.page_sizes.get(zero_based as usize))
            .copied()
            .ok_or(SourceError::PageOutOfRange { page: index, page_count })
    }

    fn decode(
        &self,
        index: PageIndex,
        scale: f32,
    ) -> LocalBoxFuture<'static, Result<RasterSurface, SourceError>> {
        if self.closed.get() {
            return async { Err(SourceError::Closed) }.boxed_local();
        }

        let size = self.page_size(index);

        async move {
            let size = size?;
            tokio::task::spawn_blocking(move || LopdfDocument::rasterize(size, scale))
                .await
                .map_err(|err| SourceError::Raster(err.to_string()))?
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
