use std::path::PathBuf;
use std::fs;
use directories::ProjectDirs;
use crate::common::config::Config;
use crate::common::error::{FaceAuthError, Result};

pub const DEV_BASE_DIR: &str = "./dev_data";
pub const DEV_SOCKET_PATH: &str = "/tmp/facegate.sock";

/// Resolves where data, captures and the socket live for the current run.
#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool, config: &Config) -> Result<Self> {
        let base_dir = if enabled {
            PathBuf::from(DEV_BASE_DIR)
        } else if let Some(dir) = &config.storage.data_dir {
            dir.clone()
        } else {
            ProjectDirs::from("com", "facegate", "FaceGate")
                .ok_or_else(|| FaceAuthError::Storage("Failed to get project dirs".into()))?
                .data_dir()
                .to_path_buf()
        };
        Self::with_base_dir(enabled, base_dir)
    }

    pub fn with_base_dir(enabled: bool, base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(base_dir.join("users"))?;
        if enabled {
            fs::create_dir_all(base_dir.join("captures"))?;
            tracing::info!("Development mode enabled - data will be saved to: {}", base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    pub fn users_dir(&self) -> PathBuf {
        self.base_dir.join("users")
    }

    pub fn history_file(&self) -> PathBuf {
        self.base_dir.join("login_history.jsonl")
    }

    pub fn signing_key_file(&self) -> PathBuf {
        self.base_dir.join("service.key")
    }

    pub fn socket_path(&self, config: &Config) -> PathBuf {
        if self.enabled {
            PathBuf::from(DEV_SOCKET_PATH)
        } else {
            config.service.socket_path.clone()
        }
    }

    pub fn get_capture_path(&self, prefix: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        if self.enabled {
            self.base_dir.join("captures").join(format!("{}_{}.jpg", prefix, timestamp))
        } else {
            PathBuf::from(format!("{}_{}.jpg", prefix, timestamp))
        }
    }
}
