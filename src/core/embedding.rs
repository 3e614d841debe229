use serde::{Deserialize, Serialize};
use crate::common::{FaceAuthError, Result};

pub type Embedding = Vec<f32>;

/// Comparison primitive shared by the duplicate check and login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    /// `1 - cosine_similarity`, in `[0, 2]`.
    Cosine,
}

impl DistanceMetric {
    pub fn distance(self, a: &[f32], b: &[f32]) -> Result<f32> {
        ensure_same_dimension(a, b)?;
        Ok(match self {
            DistanceMetric::Euclidean => euclidean_distance(a, b),
            DistanceMetric::Cosine => {
                let similarity = cosine_similarity(a, b);
                if similarity.is_finite() {
                    (1.0 - similarity).clamp(0.0, 2.0)
                } else {
                    2.0
                }
            }
        })
    }

    /// Inclusive at the tolerance, like the oracle's own "same person" check.
    pub fn same_person(self, a: &[f32], b: &[f32], tolerance: f32) -> Result<bool> {
        Ok(self.distance(a, b)? <= tolerance)
    }
}

fn ensure_same_dimension(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(FaceAuthError::DimensionMismatch {
            expected: a.len(),
            found: b.len(),
        });
    }
    Ok(())
}

/// Rejects vectors the oracle could never have produced.
pub fn validate_embedding(embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(FaceAuthError::InvalidEmbedding("embedding is empty".into()));
    }
    if let Some(index) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(FaceAuthError::InvalidEmbedding(format!(
            "component {} is not a finite number", index
        )));
    }
    Ok(())
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Accumulates in f64 so large finite components cannot overflow the norms.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f64 = a.iter().zip(b).map(|(&x, &y)| x as f64 * y as f64).sum();
    let norm_a: f64 = a.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)) as f32
}

/// Comma-separated decimal text, the format existing stored records use.
pub fn encode_embedding(embedding: &[f32]) -> String {
    embedding
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parses the stored text form. The error is a human-readable reason; callers
/// attach the record id.
pub fn decode_embedding(text: &str) -> std::result::Result<Embedding, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("empty encoding".into());
    }

    let mut embedding = Vec::new();
    for (index, part) in trimmed.split(',').enumerate() {
        let part = part.trim();
        let value: f32 = part
            .parse()
            .map_err(|_| format!("component {} is not a number: {:?}", index, part))?;
        if !value.is_finite() {
            return Err(format!("component {} is not finite", index));
        }
        embedding.push(value);
    }
    Ok(embedding)
}
