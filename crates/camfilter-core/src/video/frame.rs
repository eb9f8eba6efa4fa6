use std::fmt;

use image::{Rgba, RgbImage, RgbaImage};

use crate::error::TransformError;

/// Byte layout of a single pixel in a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Blue, green, red, alpha. Little-endian 32-bit packed color as delivered by capture hardware.
    Bgra8,
    Rgba8,
    Rgb8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Bgra8 => write!(f, "bgra8"),
            PixelFormat::Rgba8 => write!(f, "rgba8"),
            PixelFormat::Rgb8 => write!(f, "rgb8"),
        }
    }
}

/// Geometry of a 4-byte-per-pixel buffer, independent of the bytes themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub width: u32,
    pub height: u32,
    /// Distance in bytes between the starts of consecutive rows. May include padding.
    pub bytes_per_row: usize,
}

impl FrameLayout {
    /// Bytes occupied by the visible pixels of one row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * 4
    }

    /// `bytes_per_row * height`, or `None` on overflow.
    pub fn required_len(&self) -> Option<usize> {
        self.bytes_per_row.checked_mul(self.height as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Check that every pixel offset of this layout falls inside a buffer of `len` bytes.
    /// Returns the number of bytes the layout covers.
    pub fn validate(&self, len: usize) -> Result<usize, TransformError> {
        if self.bytes_per_row < self.row_bytes() {
            return Err(TransformError::InvalidStride {
                bytes_per_row: self.bytes_per_row,
                min: self.row_bytes(),
            });
        }

        match self.required_len() {
            Some(required) if required <= len => Ok(required),
            required => Err(TransformError::OutOfBounds {
                required,
                actual: len,
            }),
        }
    }
}

/// A single captured video frame with metadata.
///
/// The buffer is not validated on construction; an inconsistent frame can be
/// represented and is rejected when it is transformed or converted.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: usize,
    pub format: PixelFormat,
    /// Raw pixel bytes, row-major, `bytes_per_row` apart.
    pub data: Vec<u8>,
    /// Frame number from the start of the source (0-based).
    pub frame_number: u32,
    /// Elapsed seconds from the start of the source.
    pub timestamp_seconds: f64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        bytes_per_row: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Self {
        Self {
            width,
            height,
            bytes_per_row,
            format,
            data,
            frame_number: 0,
            timestamp_seconds: 0.0,
        }
    }

    /// A BGRA frame without row padding.
    pub fn packed_bgra(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self::new(width, height, width as usize * 4, PixelFormat::Bgra8, data)
    }

    pub fn from_rgb_image(image: &RgbImage) -> Self {
        let data = image
            .pixels()
            .flat_map(|p| [p[2], p[1], p[0], u8::MAX])
            .collect();
        Self::packed_bgra(image.width(), image.height(), data)
    }

    pub fn from_rgba_image(image: &RgbaImage) -> Self {
        let data = image
            .pixels()
            .flat_map(|p| [p[2], p[1], p[0], p[3]])
            .collect();
        Self::packed_bgra(image.width(), image.height(), data)
    }

    pub fn layout(&self) -> FrameLayout {
        FrameLayout {
            width: self.width,
            height: self.height,
            bytes_per_row: self.bytes_per_row,
        }
    }

    pub fn required_len(&self) -> Option<usize> {
        self.layout().required_len()
    }

    /// Read the `(b, g, r, a)` bytes at `(row, col)`, or `None` outside the frame or buffer.
    pub fn pixel(&self, row: u32, col: u32) -> Option<[u8; 4]> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let offset = (row as usize)
            .checked_mul(self.bytes_per_row)?
            .checked_add(col as usize * 4)?;
        let bytes = self.data.get(offset..offset.checked_add(4)?)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Reinterpret the BGRA bytes as little-endian alpha-first 32-bit color, the way the
    /// display side reads the buffer. Row padding is skipped.
    pub fn to_rgba_image(&self) -> Result<RgbaImage, TransformError> {
        if self.format != PixelFormat::Bgra8 {
            return Err(TransformError::UnsupportedFormat(self.format));
        }
        self.layout().validate(self.data.len())?;

        Ok(RgbaImage::from_fn(self.width, self.height, |x, y| {
            let offset = y as usize * self.bytes_per_row + x as usize * 4;
            let px = &self.data[offset..offset + 4];
            Rgba([px[2], px[1], px[0], px[3]])
        }))
    }
}
