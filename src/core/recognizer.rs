use crate::common::{FaceAuthError, Result, Config};
use crate::core::detector::FaceBox;
use crate::core::embedding::Embedding;
use crate::core::oracle::build_session;
use ort::{Environment, Session, Value};
use std::sync::Arc;
use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

pub struct FaceRecognizer {
    session: Session,
    _environment: Arc<Environment>,
    config: Config,
}

impl FaceRecognizer {
    pub fn new(config: &Config) -> Result<Self> {
        if !matches!(config.recognizer.input_channels, 1 | 3) {
            return Err(FaceAuthError::Model(format!(
                "Recognizer input channels must be 1 or 3, got {}",
                config.recognizer.input_channels
            )));
        }

        let (session, environment) = build_session(
            "face_recognizer",
            &config.models.recognizer_path,
            config.performance.optimization_level,
        )?;

        Ok(Self {
            session,
            _environment: environment,
            config: config.clone(),
        })
    }

    pub fn get_embedding(&self, image: &DynamicImage, face: &FaceBox) -> Result<Embedding> {
        // Face box is already in original image space
        let face_img = crop_face(image, face);
        let size = self.config.recognizer.input_size;
        let resized = face_img.resize_exact(size, size, FilterType::Triangle);

        let input_array = self.preprocess_face(&resized);
        let cow_array = CowArray::from(input_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;

        let outputs = self.session.run(vec![input_tensor])?;
        let first = outputs
            .first()
            .ok_or_else(|| FaceAuthError::Model("Recognizer produced no output".into()))?;

        let embedding = first.try_extract::<f32>()?.view().to_owned().into_raw_vec();
        Ok(embedding)
    }

    fn preprocess_face(&self, img: &DynamicImage) -> Array4<f32> {
        let size = self.config.recognizer.input_size as usize;
        let norm_val = self.config.recognizer.normalization_value;
        let channels = self.config.recognizer.input_channels as usize;
        let mut array = Array4::<f32>::zeros((1, channels, size, size));

        // ArcFace-style normalization to [-1, 1]
        if channels == 1 {
            let gray = img.to_luma8();
            for (x, y, pixel) in gray.enumerate_pixels() {
                array[[0, 0, y as usize, x as usize]] = (pixel[0] as f32 - norm_val) / norm_val;
            }
        } else {
            let rgb = img.to_rgb8();
            for (x, y, pixel) in rgb.enumerate_pixels() {
                for c in 0..3 {
                    array[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - norm_val) / norm_val;
                }
            }
        }

        array
    }
}

fn crop_face(image: &DynamicImage, face: &FaceBox) -> DynamicImage {
    let x = face.x1.max(0.0) as u32;
    let y = face.y1.max(0.0) as u32;
    let width = (face.x2 - face.x1).max(1.0) as u32;
    let height = (face.y2 - face.y1).max(1.0) as u32;

    image.crop_imm(x, y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_clamps_negative_corners() {
        let image = DynamicImage::new_rgb8(100, 80);
        let face = FaceBox { x1: -5.0, y1: 10.0, x2: 40.0, y2: 50.0, confidence: 0.9 };
        let cropped = crop_face(&image, &face);
        assert_eq!((cropped.width(), cropped.height()), (45, 40));
    }
}
