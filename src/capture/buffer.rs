use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use super::errors::EncodeError;
use super::types::Resolution;

pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Off-screen surface a single video frame is drawn into before encoding.
pub struct CaptureBuffer {
    image: RgbImage,
    has_frame: bool,
}

impl CaptureBuffer {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            image: RgbImage::new(resolution.width, resolution.height),
            has_frame: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Resolution::new(0, 0))
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }

    pub fn has_frame(&self) -> bool {
        self.has_frame
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Resize the surface. Previous contents are discarded.
    pub fn resize(&mut self, resolution: Resolution) {
        if self.resolution() != resolution {
            self.image = RgbImage::new(resolution.width, resolution.height);
        }
        self.has_frame = false;
    }

    /// Draw `frame` over the whole surface, scaling when sizes differ.
    pub fn draw(&mut self, frame: &RgbImage) -> Result<(), EncodeError> {
        let target = self.resolution();
        if target.is_empty() || frame.width() == 0 || frame.height() == 0 {
            return Err(EncodeError::EmptyBuffer);
        }

        if frame.dimensions() == self.image.dimensions() {
            self.image.copy_from_slice(frame.as_raw());
        } else {
            self.image = imageops::resize(frame, target.width, target.height, FilterType::Triangle);
        }

        self.has_frame = true;
        Ok(())
    }

    /// Blank the surface without changing its size.
    pub fn clear(&mut self) {
        self.image.fill(0);
        self.has_frame = false;
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, EncodeError> {
        if self.resolution().is_empty() {
            return Err(EncodeError::EmptyBuffer);
        }

        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
        encoder
            .encode_image(&self.image)
            .map_err(|e| EncodeError::Jpeg(e.to_string()))?;

        Ok(bytes)
    }

    /// Encode as a `data:image/jpeg;base64,...` URL.
    pub fn to_data_url(&self, quality: u8) -> Result<String, EncodeError> {
        let bytes = self.encode_jpeg(quality)?;
        Ok(format!("{}{}", JPEG_DATA_URL_PREFIX, STANDARD.encode(bytes)))
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    #[test]
    fn test_draw_same_size_copies() {
        let mut buffer = CaptureBuffer::new(Resolution::new(4, 2));
        buffer.draw(&solid(4, 2, 200)).unwrap();

        assert!(buffer.has_frame());
        assert_eq!(buffer.image().get_pixel(3, 1), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_draw_scales_to_buffer_size() {
        let mut buffer = CaptureBuffer::new(Resolution::new(8, 6));
        buffer.draw(&solid(16, 12, 50)).unwrap();

        assert_eq!(buffer.resolution(), Resolution::new(8, 6));
        assert_eq!(buffer.image().get_pixel(0, 0), &Rgb([50, 50, 50]));
    }

    #[test]
    fn test_draw_into_empty_buffer_fails() {
        let mut buffer = CaptureBuffer::empty();
        assert_eq!(buffer.draw(&solid(2, 2, 1)), Err(EncodeError::EmptyBuffer));
    }

    #[test]
    fn test_data_url_is_jpeg() {
        let mut buffer = CaptureBuffer::new(Resolution::new(16, 16));
        buffer.draw(&solid(16, 16, 128)).unwrap();

        let url = buffer.to_data_url(80).unwrap();
        assert!(url.starts_with(JPEG_DATA_URL_PREFIX));

        let bytes = STANDARD.decode(&url[JPEG_DATA_URL_PREFIX.len()..]).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_clear_keeps_size() {
        let mut buffer = CaptureBuffer::new(Resolution::new(4, 4));
        buffer.draw(&solid(4, 4, 255)).unwrap();
        buffer.clear();

        assert!(!buffer.has_frame());
        assert_eq!(buffer.resolution(), Resolution::new(4, 4));
        assert_eq!(buffer.image().get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_encode_empty_buffer_fails() {
        assert_eq!(
            CaptureBuffer::empty().encode_jpeg(80),
            Err(EncodeError::EmptyBuffer)
        );
    }
}
