pub mod auth;
pub mod detector;
pub mod embedding;
pub mod matcher;
pub mod oracle;
pub mod recognizer;

pub use auth::FaceAuth;
pub use detector::{FaceDetector, FaceBox};
pub use embedding::{cosine_similarity, decode_embedding, encode_embedding, euclidean_distance, DistanceMetric, Embedding};
pub use matcher::{MatchEngine, MatchOutcome, MatchPolicy};
pub use oracle::{extract_single_face, EmbeddingOracle, OnnxOracle};
pub use recognizer::FaceRecognizer;
