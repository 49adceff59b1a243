//! RGB frames observed from the environment

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ConstructError, Result};

/// An RGB pixel buffer, row-major, 3 bytes per pixel.
///
/// Cloning shares the underlying buffer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl Frame {
    /// Bytes per RGB pixel
    pub const CHANNELS: usize = 3;

    /// Wrap an RGB buffer, checking it matches the declared dimensions
    pub fn from_rgb(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let data = data.into();
        let expected = width as usize * height as usize * Self::CHANNELS;
        if data.len() != expected {
            return Err(ConstructError::InvalidFrame(format!(
                "{}x{} RGB frame needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with a single colour
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let data: Vec<u8> = rgb.iter().copied().cycle().take(pixels * Self::CHANNELS).collect();
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at `(x, y)`, if in bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    /// Encode as an 8-bit RGB PNG.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFrame` when the encoder rejects the frame (for example
    /// a zero-sized one).
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let encode_error = |e: png::EncodingError| {
            ConstructError::InvalidFrame(format!("PNG encoding failed: {}", e))
        };

        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().map_err(encode_error)?;
        writer.write_image_data(&self.data).map_err(encode_error)?;
        writer.finish().map_err(encode_error)?;
        Ok(out)
    }

    /// `data:image/png;base64,...` URL for vision chat APIs
    pub fn to_png_data_url(&self) -> Result<String> {
        Ok(format!(
            "data:image/png;base64,{}",
            BASE64_STANDARD.encode(self.to_png()?)
        ))
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgb_checks_length() {
        assert!(Frame::from_rgb(2, 2, vec![0u8; 12]).is_ok());

        let err = Frame::from_rgb(2, 2, vec![0u8; 11]).unwrap_err();
        assert!(matches!(err, ConstructError::InvalidFrame(_)));
    }

    #[test]
    fn test_solid_pixels() {
        let frame = Frame::solid(3, 2, [10, 20, 30]);
        assert_eq!(frame.data().len(), 18);
        assert_eq!(frame.pixel(2, 1), Some([10, 20, 30]));
        assert_eq!(frame.pixel(3, 0), None);
    }

    #[test]
    fn test_clone_shares_buffer() {
        let frame = Frame::solid(64, 64, [1, 2, 3]);
        let copy = frame.clone();
        assert!(std::ptr::eq(frame.data().as_ptr(), copy.data().as_ptr()));
    }

    #[test]
    fn test_png_encoding() {
        let frame = Frame::solid(5, 3, [200, 10, 10]);
        let png_bytes = frame.to_png().unwrap();
        assert_eq!(&png_bytes[..8], b"\x89PNG\r\n\x1a\n");

        let reader = png::Decoder::new(png_bytes.as_slice()).read_info().unwrap();
        assert_eq!(reader.info().width, 5);
        assert_eq!(reader.info().height, 3);
        assert_eq!(reader.info().color_type, png::ColorType::Rgb);

        let url = frame.to_png_data_url().unwrap();
        assert!(url.starts_with("data:image/png;base64,iVBORw0KGgo"));
    }

    #[test]
    fn test_empty_frame_does_not_encode() {
        let err = Frame::solid(0, 0, [0, 0, 0]).to_png().unwrap_err();
        assert!(matches!(err, ConstructError::InvalidFrame(_)));
    }
}
