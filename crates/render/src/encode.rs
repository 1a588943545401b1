//! Display-ready export of decoded pages

use crate::surface::DecodedPage;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("JPEG quality must be within 1..=100, got {0}")]
    InvalidQuality(u8),
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

impl DecodedPage {
    /// Encode this page as a JPEG.
    ///
    /// JPEG has no alpha channel, so the raster is flattened to RGB first.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, EncodeError> {
        if !(1..=100).contains(&quality) {
            return Err(EncodeError::InvalidQuality(quality));
        }

        let rgb = DynamicImage::ImageRgba8(self.surface().pixels().clone()).to_rgb8();
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&rgb)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use crate::{DecodedPage, PageSize, RasterSurface};

    fn page() -> DecodedPage {
        DecodedPage::new(1, 1.0, PageSize::LETTER, RasterSurface::filled(16, 8, [10, 20, 30, 255]))
    }

    #[test]
    fn test_encodes_readable_jpeg() {
        let bytes = page().encode_jpeg(85).expect("encoding should succeed");
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&bytes).expect("output should decode");
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_rejects_out_of_range_quality() {
        assert!(page().encode_jpeg(0).is_err());
        assert!(page().encode_jpeg(101).is_err());
    }
}
