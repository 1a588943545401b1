//! Raster surfaces and decoded pages
//!
//! A [`RasterSurface`] is the RGBA image a document source produces for one
//! page. A [`DecodedPage`] pairs it with the page index and the scale it was
//! rendered at; it is immutable once produced.

use image::{ImageBuffer, Rgba};
use std::rc::Rc;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// 1-based page index, stable for the life of a viewing session.
pub type PageIndex = u32;

/// Largest raster side a source will allocate, in pixels
pub const MAX_RASTER_SIDE: u32 = 16_384;

/// Page geometry in points (1/72 inch) at scale 1.0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    /// US Letter, used when a document does not declare a media box
    pub const LETTER: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

    pub fn new(width_pt: f32, height_pt: f32) -> Self {
        Self { width_pt, height_pt }
    }

    /// Pixel dimensions of this page rasterized at `scale`.
    ///
    /// Never returns a zero dimension.
    pub fn scaled(self, scale: f32) -> (u32, u32) {
        let scale = if scale <= 0.0 { 1.0 } else { scale };
        let width = (self.width_pt * scale).round().max(1.0) as u32;
        let height = (self.height_pt * scale).round().max(1.0) as u32;
        (width, height)
    }

    /// [`scaled`](Self::scaled), or `None` if either side would exceed
    /// [`MAX_RASTER_SIDE`]
    pub fn raster_dimensions(self, scale: f32) -> Option<(u32, u32)> {
        if !(self.width_pt.is_finite() && self.height_pt.is_finite() && scale.is_finite()) {
            return None;
        }
        let (width, height) = self.scaled(scale);
        (width <= MAX_RASTER_SIDE && height <= MAX_RASTER_SIDE).then_some((width, height))
    }
}

/// A rasterized page in RGBA format
#[derive(Debug, Clone)]
pub struct RasterSurface {
    pixels: RgbaImage,
}

impl RasterSurface {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Create a surface of the given size filled with one color
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::new(RgbaImage::from_pixel(width.max(1), height.max(1), Rgba(rgba)))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Size of the pixel buffer in bytes
    pub fn byte_len(&self) -> usize {
        self.pixels.as_raw().len()
    }
}

/// A page decoded at a specific render scale
///
/// Cloning is cheap: clones share the same raster buffer. The buffer is
/// freed when the last holder releases it.
#[derive(Debug, Clone)]
pub struct DecodedPage {
    index: PageIndex,
    scale: f32,
    size: PageSize,
    surface: Rc<RasterSurface>,
}

impl DecodedPage {
    pub fn new(index: PageIndex, scale: f32, size: PageSize, surface: RasterSurface) -> Self {
        Self { index, scale, size, surface: Rc::new(surface) }
    }

    pub fn index(&self) -> PageIndex {
        self.index
    }

    /// Render scale this page was rasterized at
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Intrinsic page geometry in points
    pub fn page_size(&self) -> PageSize {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    pub fn surface(&self) -> &RasterSurface {
        &self.surface
    }

    pub fn byte_len(&self) -> usize {
        self.surface.byte_len()
    }

    /// Release this holder's reference to the raster.
    ///
    /// Returns `true` if the pixel buffer was freed by this call, `false` if
    /// another holder (for example a published UI snapshot) still shares it.
    pub fn release(self) -> bool {
        match Rc::try_unwrap(self.surface) {
            Ok(surface) => {
                drop(surface);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_size_rounds_and_never_hits_zero() {
        let size = PageSize::new(612.0, 792.0);
        assert_eq!(size.scaled(1.5), (918, 1188));
        assert_eq!(PageSize::new(0.1, 0.1).scaled(1.0), (1, 1));
        assert_eq!(size.scaled(0.0), (612, 792));
    }

    #[test]
    fn test_raster_dimensions_are_capped() {
        assert_eq!(PageSize::LETTER.raster_dimensions(2.0), Some((1224, 1584)));
        assert_eq!(PageSize::new(100_000.0, 100.0).raster_dimensions(1.0), None);
        assert_eq!(PageSize::new(10_000.0, 10_000.0).raster_dimensions(2.0), None);
        assert_eq!(PageSize::new(f32::INFINITY, 10.0).raster_dimensions(1.0), None);
    }

    #[test]
    fn test_filled_surface_reports_dimensions_and_bytes() {
        let surface = RasterSurface::filled(4, 3, [255, 255, 255, 255]);
        assert_eq!(surface.width(), 4);
        assert_eq!(surface.height(), 3);
        assert_eq!(surface.byte_len(), 4 * 3 * 4);
    }

    #[test]
    fn test_release_frees_only_the_last_holder() {
        let page = DecodedPage::new(
            1,
            1.0,
            PageSize::LETTER,
            RasterSurface::filled(2, 2, [0, 0, 0, 255]),
        );
        let shared = page.clone();

        assert!(!page.release());
        assert!(shared.release());
    }
}
