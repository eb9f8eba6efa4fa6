use tracing::{debug, warn};

use crate::error::TransformError;
use crate::video::frame::{Frame, FrameLayout, PixelFormat};

/// A pixel is highlighted when its red channel is above this...
const RED_MIN: u8 = 128;
/// ...and its green channel is below this.
const GREEN_MAX: u8 = 128;

/// Bytes written to the (blue, green, red) positions of a highlighted pixel.
pub const HIGHLIGHT_BYTES: [u8; 3] = [255, 0, 0];

/// Which branch of the threshold rule a pixel takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelClass {
    /// Strongly red pixel, painted with [`HIGHLIGHT_BYTES`].
    Highlight,
    /// Everything else; color bytes rotate one position.
    Rotate,
}

pub fn classify_pixel(_b: u8, g: u8, r: u8) -> PixelClass {
    if r > RED_MIN && g < GREEN_MAX {
        PixelClass::Highlight
    } else {
        PixelClass::Rotate
    }
}

/// New (blue, green, red) bytes for a pixel under the threshold rule.
pub fn recolor(b: u8, g: u8, r: u8) -> [u8; 3] {
    match classify_pixel(b, g, r) {
        PixelClass::Highlight => HIGHLIGHT_BYTES,
        PixelClass::Rotate => [g, r, b],
    }
}

/// Rewrites BGRA frames in place with the threshold rule. Holds no per-frame state.
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelTransformer;

impl PixelTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Transform every visible pixel of `frame`. Alpha and row padding are left untouched.
    ///
    /// The frame is validated up front; on error no byte has been written.
    pub fn transform(&self, frame: &mut Frame) -> Result<(), TransformError> {
        if frame.format != PixelFormat::Bgra8 {
            warn!(
                frame_number = frame.frame_number,
                format = %frame.format,
                "rejecting frame with unsupported pixel format"
            );
            return Err(TransformError::UnsupportedFormat(frame.format));
        }

        let layout = frame.layout();
        let highlighted = self
            .transform_buffer(&mut frame.data, layout)
            .inspect_err(|e| {
                warn!(frame_number = frame.frame_number, error = %e, "rejecting frame");
            })?;

        debug!(
            frame_number = frame.frame_number,
            width = frame.width,
            height = frame.height,
            bytes_per_row = frame.bytes_per_row,
            highlighted,
            "frame transformed"
        );
        Ok(())
    }

    /// Transform a bare BGRA byte view described by `layout`.
    /// Returns how many pixels took the highlight branch.
    pub fn transform_buffer(
        &self,
        data: &mut [u8],
        layout: FrameLayout,
    ) -> Result<usize, TransformError> {
        if layout.is_empty() {
            return Ok(0);
        }

        let required = layout.validate(data.len())?;
        let row_bytes = layout.row_bytes();
        let mut highlighted = 0;

        for row in data[..required].chunks_exact_mut(layout.bytes_per_row) {
            for px in row[..row_bytes].chunks_exact_mut(4) {
                let (b, g, r) = (px[0], px[1], px[2]);
                if classify_pixel(b, g, r) == PixelClass::Highlight {
                    highlighted += 1;
                }
                px[..3].copy_from_slice(&recolor(b, g, r));
            }
        }

        Ok(highlighted)
    }
}
