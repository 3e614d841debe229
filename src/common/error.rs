use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceAuthError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("User with this username or email already exists")]
    UserExists,

    #[error("No face detected")]
    NoFaceDetected,

    #[error("Multiple faces detected ({count}), ensure exactly one face is visible")]
    MultipleFacesDetected { count: usize },

    #[error("Face already registered with another account ({username}, id {id})")]
    DuplicateFace { id: u64, username: String },

    /// A login whose face matched no enrolled identity, as seen by a client.
    #[error("Face not recognized")]
    NoMatch,

    /// Stored embedding that cannot be used for comparison. Only ever
    /// recovered inside a scan, where the record is skipped.
    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: u64, reason: String },

    #[error("Embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("Service error ({kind:?}): {message}")]
    Remote { kind: ErrorKind, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl FaceAuthError {
    /// Stable name of the error kind, used on the wire and in logs.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FaceAuthError::Camera(_) => ErrorKind::Camera,
            FaceAuthError::Model(_) | FaceAuthError::Ort(_) => ErrorKind::Model,
            FaceAuthError::Storage(_) | FaceAuthError::CorruptRecord { .. } => ErrorKind::Storage,
            FaceAuthError::Config(_) => ErrorKind::Config,
            FaceAuthError::Protocol(_) => ErrorKind::Protocol,
            FaceAuthError::InvalidInput(_) => ErrorKind::InvalidInput,
            FaceAuthError::UserExists => ErrorKind::UserExists,
            FaceAuthError::NoFaceDetected => ErrorKind::NoFaceDetected,
            FaceAuthError::MultipleFacesDetected { .. } => ErrorKind::MultipleFacesDetected,
            FaceAuthError::DuplicateFace { .. } => ErrorKind::DuplicateFace,
            FaceAuthError::NoMatch => ErrorKind::NoMatch,
            FaceAuthError::DimensionMismatch { .. } | FaceAuthError::InvalidEmbedding(_) => {
                ErrorKind::InvalidEmbedding
            }
            FaceAuthError::Remote { kind, .. } => *kind,
            FaceAuthError::Io(_) | FaceAuthError::Image(_) | FaceAuthError::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Errors caused by the request itself rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidInput
                | ErrorKind::UserExists
                | ErrorKind::NoFaceDetected
                | ErrorKind::MultipleFacesDetected
                | ErrorKind::DuplicateFace
                | ErrorKind::NoMatch
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    Camera,
    Model,
    Storage,
    Config,
    Protocol,
    InvalidInput,
    UserExists,
    NoFaceDetected,
    MultipleFacesDetected,
    DuplicateFace,
    NoMatch,
    InvalidEmbedding,
    Internal,
}

pub type Result<T> = std::result::Result<T, FaceAuthError>;
