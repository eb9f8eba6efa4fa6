pub mod display;
pub mod error;
pub mod pipeline;
pub mod transform;
pub mod video;

pub use error::TransformError;
pub use transform::PixelTransformer;
pub use video::frame::{Frame, FrameLayout, PixelFormat};
