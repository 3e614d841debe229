use crate::common::{FaceAuthError, Result};
use hmac::{Hmac, Mac};
use rand::{thread_rng, Rng};
use sha2::Sha256;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

const KEY_LEN: usize = 32;

/// Per-installation secret used to sign successful logins.
pub struct SigningKey {
    key: [u8; KEY_LEN],
}

impl SigningKey {
    /// Reads the key at `path`, generating and persisting a new one (mode 0600)
    /// when the file does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let data = fs::read(path)?;
            let key: [u8; KEY_LEN] = data.as_slice().try_into().map_err(|_| {
                FaceAuthError::Storage(format!(
                    "Signing key {} has {} bytes, expected {}",
                    path.display(), data.len(), KEY_LEN
                ))
            })?;
            return Ok(Self { key });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut key = [0u8; KEY_LEN];
        thread_rng().fill(&mut key[..]);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(&key)?;

        tracing::info!("Generated new signing key at {}", path.display());
        Ok(Self { key })
    }

    pub fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    fn mac(&self, challenge: &[u8], user_id: u64) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| FaceAuthError::Other(anyhow::anyhow!("Invalid signing key: {}", e)))?;
        mac.update(challenge);
        mac.update(&user_id.to_le_bytes());
        Ok(mac)
    }

    pub fn sign(&self, challenge: &[u8], user_id: u64) -> Result<Vec<u8>> {
        Ok(self.mac(challenge, user_id)?.finalize().into_bytes().to_vec())
    }

    pub fn verify(&self, challenge: &[u8], user_id: u64, signature: &[u8]) -> bool {
        match self.mac(challenge, user_id) {
            Ok(mac) => mac.verify_slice(signature).is_ok(),
            Err(_) => false,
        }
    }
}
