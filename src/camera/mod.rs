pub mod v4l2;

pub use v4l2::Camera;

use crate::common::Result;
use image::DynamicImage;

/// Anything that can produce a single still frame on demand.
pub trait FrameSource {
    fn capture(&mut self) -> Result<DynamicImage>;
}
