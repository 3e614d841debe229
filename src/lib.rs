pub mod camera;
pub mod common;
pub mod core;
pub mod service;
pub mod storage;

pub use camera::{Camera, FrameSource};
pub use common::{Config, DevMode, ErrorKind, FaceAuthError, Result};
pub use core::{
    DistanceMetric, Embedding, EmbeddingOracle, FaceAuth, MatchEngine, MatchOutcome, MatchPolicy,
    OnnxOracle,
};
pub use service::{protocol, ServiceClient};
pub use storage::{
    FileIdentityStore, FileLoginRecorder, IdentityRecord, IdentityStore, LoginAttempt, LoginRecorder,
};
