use thiserror::Error;

use crate::video::frame::PixelFormat;

/// Reasons a frame is rejected before any of its bytes are touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The buffer is shorter than `bytes_per_row * height`, or that product overflows.
    #[error("pixel buffer too small: layout needs {required:?} bytes, buffer has {actual}")]
    OutOfBounds {
        /// Bytes the layout needs, or `None` if the computation overflowed.
        required: Option<usize>,
        actual: usize,
    },

    #[error("unsupported pixel format {0}, expected 4-byte BGRA")]
    UnsupportedFormat(PixelFormat),

    /// A row's pixels would spill into the next row.
    #[error("row stride {bytes_per_row} is smaller than the row width of {min} bytes")]
    InvalidStride { bytes_per_row: usize, min: usize },
}
