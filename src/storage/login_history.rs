use crate::common::{FaceAuthError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginAttempt {
    /// Matched identity; `None` when no stored face was accepted.
    pub user_id: Option<u64>,
    pub success: bool,
    pub distance: Option<f32>,
    pub timestamp: DateTime<Utc>,
}

impl LoginAttempt {
    pub fn success(user_id: u64, distance: f32) -> Self {
        Self {
            user_id: Some(user_id),
            success: true,
            distance: Some(distance),
            timestamp: Utc::now(),
        }
    }

    pub fn rejected() -> Self {
        Self {
            user_id: None,
            success: false,
            distance: None,
            timestamp: Utc::now(),
        }
    }
}

pub trait LoginRecorder {
    fn record_attempt(&self, attempt: &LoginAttempt) -> Result<()>;

    /// Attempts oldest first, optionally restricted to one identity.
    fn history(&self, user_id: Option<u64>) -> Result<Vec<LoginAttempt>>;
}

/// Append-only JSON lines file.
pub struct FileLoginRecorder {
    path: PathBuf,
}

impl FileLoginRecorder {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }
}

impl LoginRecorder for FileLoginRecorder {
    fn record_attempt(&self, attempt: &LoginAttempt) -> Result<()> {
        let mut line = serde_json::to_string(attempt)
            .map_err(|e| FaceAuthError::Storage(format!("Failed to serialize login attempt: {}", e)))?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn history(&self, user_id: Option<u64>) -> Result<Vec<LoginAttempt>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut attempts = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let attempt: LoginAttempt = serde_json::from_str(&line).map_err(|e| {
                FaceAuthError::Storage(format!(
                    "{} line {}: {}", self.path.display(), number + 1, e
                ))
            })?;
            if user_id.is_none() || attempt.user_id == user_id {
                attempts.push(attempt);
            }
        }
        Ok(attempts)
    }
}

#[derive(Default)]
pub struct MemoryLoginRecorder {
    attempts: Mutex<Vec<LoginAttempt>>,
}

impl MemoryLoginRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoginRecorder for MemoryLoginRecorder {
    fn record_attempt(&self, attempt: &LoginAttempt) -> Result<()> {
        self.attempts
            .lock()
            .map_err(|_| FaceAuthError::Storage("login history lock poisoned".into()))?
            .push(attempt.clone());
        Ok(())
    }

    fn history(&self, user_id: Option<u64>) -> Result<Vec<LoginAttempt>> {
        let attempts = self
            .attempts
            .lock()
            .map_err(|_| FaceAuthError::Storage("login history lock poisoned".into()))?;
        Ok(attempts
            .iter()
            .filter(|attempt| user_id.is_none() || attempt.user_id == user_id)
            .cloned()
            .collect())
    }
}
