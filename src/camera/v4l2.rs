use crate::camera::FrameSource;
use crate::common::{FaceAuthError, Result, Config};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};
use image::{DynamicImage, ImageBuffer, Luma, Rgb};
use std::time::Duration;

/// A V4L2 device opened for a single request. Dropping it releases the device.
pub struct Camera {
    device: Device,
    warmup_frames: u32,
    warmup_delay: Duration,
}

impl Camera {
    pub fn new(config: &Config) -> Result<Self> {
        let index = config.camera.device_index;
        tracing::debug!("Opening camera device {}", index);

        let device = Device::new(index as usize)
            .map_err(|e| FaceAuthError::Camera(format!("Webcam not accessible ({}): {}", index, e)))?;

        let caps = device.query_caps()
            .map_err(|e| FaceAuthError::Camera(format!("Failed to query capabilities: {}", e)))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            tracing::warn!("Device {} ({}) may not support standard video capture", index, caps.card);
        }

        let mut fmt = device.format()
            .map_err(|e| FaceAuthError::Camera(format!("Failed to get format: {}", e)))?;
        fmt.width = config.camera.width;
        fmt.height = config.camera.height;

        // Keep GREY for IR cameras, otherwise ask for MJPG
        if fmt.fourcc.repr != *b"GREY" {
            fmt.fourcc = FourCC::new(b"MJPG");
        }
        if let Err(e) = device.set_format(&fmt) {
            tracing::warn!("Could not set exact format: {}. Using device defaults.", e);
        }

        let actual = device.format()
            .map_err(|e| FaceAuthError::Camera(format!("Failed to get final format: {}", e)))?;
        if actual.width != config.camera.width || actual.height != config.camera.height {
            tracing::warn!(
                "Camera resolution {}x{} differs from requested {}x{}",
                actual.width, actual.height, config.camera.width, config.camera.height
            );
        }

        Ok(Self {
            device,
            warmup_frames: config.camera.warmup_frames,
            warmup_delay: Duration::from_millis(config.camera.warmup_delay_ms),
        })
    }

    pub fn capture_frame(&mut self) -> Result<DynamicImage> {
        let fmt = self.device.format()
            .map_err(|e| FaceAuthError::Camera(format!("Failed to get format: {}", e)))?;

        let mut stream = v4l::io::mmap::Stream::with_buffers(&mut self.device, Type::VideoCapture, 4)
            .map_err(|e| FaceAuthError::Camera(format!("Failed to create stream: {}", e)))?;

        // Let exposure settle before the frame that counts
        for i in 0..self.warmup_frames {
            stream.next()
                .map_err(|e| FaceAuthError::Camera(format!("Failed to capture warmup frame {}: {}", i, e)))?;
            std::thread::sleep(self.warmup_delay);
        }

        let (buf, _meta) = stream.next()
            .map_err(|e| FaceAuthError::Camera(format!("Failed to capture image: {}", e)))?;

        decode_frame(&fmt.fourcc.repr, buf, fmt.width, fmt.height)
    }
}

impl FrameSource for Camera {
    fn capture(&mut self) -> Result<DynamicImage> {
        self.capture_frame()
    }
}

pub fn decode_frame(fourcc: &[u8; 4], data: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    match fourcc {
        b"GREY" => {
            let expected = (width * height) as usize;
            let pixels = data.get(..expected)
                .ok_or_else(|| FaceAuthError::Camera("Short grayscale frame".into()))?;
            let img = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, pixels.to_vec())
                .ok_or_else(|| FaceAuthError::Camera("Failed to create grayscale image buffer".into()))?;
            Ok(DynamicImage::ImageLuma8(img))
        }
        b"MJPG" => Ok(image::load_from_memory(data)?),
        b"YUYV" => yuyv_to_image(data, width, height),
        other => Err(FaceAuthError::Camera(format!(
            "Unsupported format {}", String::from_utf8_lossy(other)
        ))),
    }
}

fn yuyv_to_image(data: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        return Err(FaceAuthError::Camera("Short YUYV frame".into()));
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0] as f32, chunk[1] as f32 - 128.0, chunk[2] as f32, chunk[3] as f32 - 128.0);
        for y in [y0, y1] {
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    let img = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, rgb)
        .ok_or_else(|| FaceAuthError::Camera("Failed to create RGB image buffer".into()))?;
    Ok(DynamicImage::ImageRgb8(img))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grey_frame_becomes_luma_image() {
        let img = decode_frame(b"GREY", &[10, 20, 30, 40], 2, 2).unwrap();
        assert_eq!(img.to_luma8().get_pixel(1, 1)[0], 40);
    }

    #[test]
    fn short_grey_frame_is_rejected() {
        assert!(decode_frame(b"GREY", &[10, 20], 2, 2).is_err());
    }

    #[test]
    fn neutral_yuyv_is_gray() {
        let img = decode_frame(b"YUYV", &[100, 128, 100, 128], 2, 1).unwrap();
        let px = img.to_rgb8().get_pixel(0, 0).0;
        assert_eq!(px, [100, 100, 100]);
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(matches!(
            decode_frame(b"H264", &[], 1, 1),
            Err(FaceAuthError::Camera(_))
        ));
    }
}
