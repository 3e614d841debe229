use crate::common::{Config, FaceAuthError, Result};
use crate::core::detector::FaceDetector;
use crate::core::embedding::Embedding;
use crate::core::recognizer::FaceRecognizer;
use image::DynamicImage;
use ort::{Environment, GraphOptimizationLevel, Session, SessionBuilder};
use std::path::Path;
use std::sync::Arc;

/// Detects faces in an image and embeds each one.
pub trait EmbeddingOracle {
    /// One embedding per detected face, in detection order.
    fn embed_faces(&self, image: &DynamicImage) -> Result<Vec<Embedding>>;
}

/// Requires exactly one face in the frame, for both registration and login.
pub fn extract_single_face<O: EmbeddingOracle + ?Sized>(
    oracle: &O,
    image: &DynamicImage,
) -> Result<Embedding> {
    let mut embeddings = oracle.embed_faces(image)?;
    match embeddings.len() {
        0 => Err(FaceAuthError::NoFaceDetected),
        1 => Ok(embeddings.remove(0)),
        count => Err(FaceAuthError::MultipleFacesDetected { count }),
    }
}

/// Detector and recognizer sessions, loaded once and reused across requests.
pub struct OnnxOracle {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxOracle {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            detector: FaceDetector::new(config)?,
            recognizer: FaceRecognizer::new(config)?,
        })
    }
}

impl EmbeddingOracle for OnnxOracle {
    fn embed_faces(&self, image: &DynamicImage) -> Result<Vec<Embedding>> {
        let faces = self.detector.detect(image)?;
        faces
            .iter()
            .map(|face| self.recognizer.get_embedding(image, face))
            .collect()
    }
}

pub(crate) fn build_session(
    name: &str,
    model_path: &Path,
    optimization_level: u32,
) -> Result<(Session, Arc<Environment>)> {
    let environment = Arc::new(
        Environment::builder()
            .with_name(name)
            .build()
            .map_err(|e| FaceAuthError::Model(format!("Failed to create environment: {}", e)))?
    );

    if !model_path.exists() {
        return Err(FaceAuthError::Model(
            format!("Model {} not found at: {:?}", name, model_path)
        ));
    }

    let opt_level = match optimization_level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    };
    let session = SessionBuilder::new(&environment)?
        .with_optimization_level(opt_level)?
        .with_model_from_file(model_path)?;

    Ok((session, environment))
}
