use crate::common::{FaceAuthError, Result, Config};
use crate::core::oracle::build_session;
use ort::{Environment, Session, Value};
use std::cmp::Ordering;
use std::sync::Arc;
use image::{DynamicImage, imageops::FilterType};
use ndarray::{Array4, CowArray};

const NMS_IOU_THRESHOLD: f32 = 0.45;
const MAX_FACES: usize = 5;
const MIN_BOX_SIDE: f32 = 10.0;

#[derive(Debug, Clone)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

/// YOLO-style single-class face detector.
pub struct FaceDetector {
    session: Session,
    _environment: Arc<Environment>,
    config: Config,
}

impl FaceDetector {
    pub fn new(config: &Config) -> Result<Self> {
        let (session, environment) = build_session(
            "face_detector",
            &config.models.detector_path,
            config.performance.optimization_level,
        )?;

        Ok(Self {
            session,
            _environment: environment,
            config: config.clone(),
        })
    }

    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let input_width = self.config.detector.input_width;
        let input_height = self.config.detector.input_height;
        let orig_width = image.width() as f32;
        let orig_height = image.height() as f32;

        let img_array = if image.width() == input_width && image.height() == input_height {
            self.image_to_array(image)
        } else {
            let resized = image.resize_exact(input_width, input_height, FilterType::Nearest);
            self.image_to_array(&resized)
        };

        let cow_array = CowArray::from(img_array.into_dyn());
        let input_tensor = Value::from_array(self.session.allocator(), &cow_array)?;
        let outputs = self.session.run(vec![input_tensor])?;

        let mut faces = self.parse_detections(&outputs)?;

        // Back to original image coordinates
        let scale_x = orig_width / input_width as f32;
        let scale_y = orig_height / input_height as f32;
        for face in &mut faces {
            face.x1 *= scale_x;
            face.x2 *= scale_x;
            face.y1 *= scale_y;
            face.y2 *= scale_y;
        }

        tracing::debug!("Detected {} face(s)", faces.len());
        Ok(faces)
    }

    fn image_to_array(&self, img: &DynamicImage) -> Array4<f32> {
        let rgb = img.to_rgb8();
        let width = img.width() as usize;
        let height = img.height() as usize;
        let mut array = Array4::<f32>::zeros((1, 3, height, width));

        let norm_factor = 1.0 / 255.0;
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            array[[0, 0, y, x]] = pixel[0] as f32 * norm_factor;
            array[[0, 1, y, x]] = pixel[1] as f32 * norm_factor;
            array[[0, 2, y, x]] = pixel[2] as f32 * norm_factor;
        }

        array
    }

    fn parse_detections(&self, outputs: &[Value]) -> Result<Vec<FaceBox>> {
        let Some(first) = outputs.first() else {
            return Ok(Vec::new());
        };

        let output = first.try_extract::<f32>()?.view().to_owned();
        let shape = output.shape().to_vec();
        let values = output
            .as_slice()
            .ok_or_else(|| FaceAuthError::Model("Detector output is not contiguous".into()))?;

        // [1, 8400, 5] or transposed [1, 5, 8400]
        let (num_predictions, prediction_length, is_transposed) = match shape.as_slice() {
            [_, a, b] if b > a && *a <= 10 => (*b, *a, true),
            [_, a, b] => (*a, *b, false),
            [a, b] => (*a, *b, false),
            _ => {
                tracing::warn!("Unexpected detector output shape: {:?}", shape);
                return Ok(Vec::new());
            }
        };
        if prediction_length < 4 {
            return Err(FaceAuthError::Model(format!(
                "Detector predictions have {} values, expected at least 4", prediction_length
            )));
        }

        let input_width = self.config.detector.input_width as f32;
        let input_height = self.config.detector.input_height as f32;
        let mut faces = Vec::new();

        for i in 0..num_predictions {
            let at = |field: usize| {
                if is_transposed {
                    values[field * num_predictions + i]
                } else {
                    values[i * prediction_length + field]
                }
            };
            let confidence = if prediction_length > 4 { at(4) } else { 0.0 };
            if confidence <= 0.001 {
                continue;
            }

            if let Some(face) = prediction_to_box(
                [at(0), at(1), at(2), at(3)],
                confidence,
                input_width,
                input_height,
            ) {
                faces.push(face);
            }
        }

        // NMS before the confidence cut so overlapping low boxes collapse first
        let mut faces = apply_nms(faces, NMS_IOU_THRESHOLD);
        faces.retain(|face| face.confidence >= self.config.detector.detection_confidence);
        faces.truncate(MAX_FACES);

        Ok(faces)
    }
}

fn by_confidence_desc(a: &FaceBox, b: &FaceBox) -> Ordering {
    b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal)
}

pub fn apply_nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(by_confidence_desc);

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| calculate_iou(kept, &candidate) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

pub fn calculate_iou(box1: &FaceBox, box2: &FaceBox) -> f32 {
    let x1 = box1.x1.max(box2.x1);
    let y1 = box1.y1.max(box2.y1);
    let x2 = box1.x2.min(box2.x2);
    let y2 = box1.y2.min(box2.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1.x2 - box1.x1) * (box1.y2 - box1.y1);
    let area2 = (box2.x2 - box2.x1) * (box2.y2 - box2.y1);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Converts one `[cx, cy, w, h]` prediction into a box in detector input
/// pixels. Normalized outputs are scaled per axis.
fn prediction_to_box(
    prediction: [f32; 4],
    confidence: f32,
    input_width: f32,
    input_height: f32,
) -> Option<FaceBox> {
    let [cx, cy, w, h] = prediction;
    let normalized = cx <= 1.0 && cy <= 1.0 && w <= 1.0 && h <= 1.0;
    let (cx, cy, w, h) = if normalized {
        (cx * input_width, cy * input_height, w * input_width, h * input_height)
    } else {
        (cx, cy, w, h)
    };

    let x1 = (cx - w / 2.0).max(0.0);
    let y1 = (cy - h / 2.0).max(0.0);
    let x2 = (cx + w / 2.0).min(input_width);
    let y2 = (cy + h / 2.0).min(input_height);

    (x2 - x1 > MIN_BOX_SIDE && y2 - y1 > MIN_BOX_SIDE)
        .then_some(FaceBox { x1, y1, x2, y2, confidence })
}
