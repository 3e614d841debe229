use crate::common::{ErrorKind, FaceAuthError, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::time::SystemTime;

/// Upper bound on a single framed message in either direction.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Request {
    Register(RegisterRequest),
    Login(LoginRequest),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoginRequest {
    pub challenge: Vec<u8>,
    pub timestamp: SystemTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Response {
    Register(RegisterResponse),
    Login(LoginResponse),
    Error(ErrorResponse),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegisterResponse {
    pub id: u64,
    pub username: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoginResponse {
    pub success: bool,
    pub user_id: Option<u64>,
    pub username: Option<String>,
    pub distance: Option<f32>,
    pub message: String,
    /// HMAC over the challenge and matched id; empty on rejection.
    pub signature: Vec<u8>,
    pub timestamp: SystemTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&FaceAuthError> for ErrorResponse {
    fn from(err: &FaceAuthError) -> Self {
        Self { kind: err.kind(), message: err.to_string() }
    }
}

/// Writes `message` as a little-endian u32 length followed by bincode.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let data = bincode::serialize(message)
        .map_err(|e| FaceAuthError::Protocol(format!("Failed to serialize message: {}", e)))?;
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(FaceAuthError::Protocol(format!(
            "Message too large: {} bytes", data.len()
        )));
    }

    writer.write_all(&(data.len() as u32).to_le_bytes())?;
    writer.write_all(&data)?;
    writer.flush()?;
    Ok(())
}

pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    read_body(reader, len_buf)
}

/// Like `read_message`, but a peer that closes before sending any byte yields
/// `Ok(None)` instead of an error.
pub fn try_read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        match reader.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    read_body(reader, len_buf).map(Some)
}

fn read_body<R: Read, T: DeserializeOwned>(reader: &mut R, len_buf: [u8; 4]) -> Result<T> {
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_SIZE {
        return Err(FaceAuthError::Protocol(format!("Message too large: {} bytes", len)));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    bincode::deserialize(&buf)
        .map_err(|e| FaceAuthError::Protocol(format!("Failed to deserialize message: {}", e)))
}
