//! Frame type and color-order handling.

use image::RgbImage;
use std::path::Path;

/// Byte order of the three color channels in a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    /// OpenCV-style capture buffers.
    Bgr,
}

/// A decoded 8-bit, 3-channel image.
#[derive(Clone)]
pub struct Frame {
    /// Packed pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub order: ChannelOrder,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, order: ChannelOrder) -> Self {
        Self {
            data,
            width,
            height,
            order,
        }
    }

    /// Decode an encoded image (JPEG, PNG, ...) into an RGB frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let img = image::load_from_memory(bytes)?.to_rgb8();
        Ok(Self::from(img))
    }

    /// Read and decode an image file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FrameError> {
        let img = image::open(path.as_ref())?.to_rgb8();
        Ok(Self::from(img))
    }

    /// Convert to an RGB image, swapping channels for BGR input.
    pub fn to_rgb(&self) -> Result<RgbImage, FrameError> {
        let expected = self.width as usize * self.height as usize * 3;
        if self.data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: self.data.len(),
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::Empty);
        }

        let data = match self.order {
            ChannelOrder::Rgb => self.data.clone(),
            ChannelOrder::Bgr => bgr_to_rgb(&self.data),
        };
        RgbImage::from_raw(self.width, self.height, data).ok_or(FrameError::InvalidLength {
            expected,
            actual: self.data.len(),
        })
    }
}

impl From<RgbImage> for Frame {
    fn from(img: RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self::new(img.into_raw(), width, height, ChannelOrder::Rgb)
    }
}

/// Swap the first and third byte of every pixel.
pub fn bgr_to_rgb(bgr: &[u8]) -> Vec<u8> {
    bgr.chunks_exact(3)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame has zero width or height")]
    Empty,
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}
