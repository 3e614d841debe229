use crate::common::{FaceAuthError, Result};
use crate::core::embedding::{decode_embedding, Embedding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

const STORAGE_VERSION: u32 = 1;

/// A registered user and their single enrolled face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: u64,
    pub username: String,
    pub email: String,
    /// Comma-separated embedding text; `None` for accounts without a face.
    pub face_encoding: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IdentityRecord {
    /// `Ok(None)` when no face is enrolled, `CorruptRecord` when the stored
    /// text cannot be parsed.
    pub fn embedding(&self) -> Result<Option<Embedding>> {
        match &self.face_encoding {
            None => Ok(None),
            Some(text) => decode_embedding(text)
                .map(Some)
                .map_err(|reason| FaceAuthError::CorruptRecord { id: self.id, reason }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub username: String,
    pub email: String,
    pub face_encoding: Option<String>,
}

pub trait IdentityStore {
    /// All records in ascending id order.
    fn list_identities(&self) -> Result<Vec<IdentityRecord>>;

    fn insert(&self, identity: NewIdentity) -> Result<IdentityRecord>;

    fn find_by_username_or_email(&self, username: &str, email: &str) -> Result<Option<IdentityRecord>> {
        Ok(self
            .list_identities()?
            .into_iter()
            .find(|record| record.username == username || record.email == email))
    }
}

#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    version: u32,
    record: IdentityRecord,
}

/// One bincode file per identity under `data_dir`.
pub struct FileIdentityStore {
    data_dir: PathBuf,
}

impl FileIdentityStore {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    fn record_path(&self, id: u64) -> PathBuf {
        self.data_dir.join(format!("{}.bincode", id))
    }

    fn read_record(&self, path: &std::path::Path) -> Result<IdentityRecord> {
        let data = fs::read(path)?;
        let stored: StoredIdentity = bincode::deserialize(&data).map_err(|e| {
            FaceAuthError::Storage(format!("Failed to deserialize {}: {}", path.display(), e))
        })?;

        if stored.version > STORAGE_VERSION {
            return Err(FaceAuthError::Storage(format!(
                "{} has storage version {}, newer than supported {}",
                path.display(), stored.version, STORAGE_VERSION
            )));
        }

        Ok(stored.record)
    }
}

impl FileIdentityStore {
    fn record_files(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("bincode") {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Next id after every record file on disk, readable or not, so a damaged
    /// file is never overwritten.
    fn next_id(&self) -> Result<u64> {
        let max = self
            .record_files()?
            .iter()
            .filter_map(|path| path.file_stem()?.to_str()?.parse::<u64>().ok())
            .max();
        Ok(max.map(|id| id + 1).unwrap_or(1))
    }
}

impl IdentityStore for FileIdentityStore {
    /// Files that fail to decode are skipped with a warning so one damaged
    /// record cannot lock everyone else out.
    fn list_identities(&self) -> Result<Vec<IdentityRecord>> {
        let mut records = Vec::new();
        for path in self.record_files()? {
            match self.read_record(&path) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping identity file {}: {}", path.display(), e),
            }
        }

        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    fn insert(&self, identity: NewIdentity) -> Result<IdentityRecord> {
        let next_id = self.next_id()?;

        let record = IdentityRecord {
            id: next_id,
            username: identity.username,
            email: identity.email,
            face_encoding: identity.face_encoding,
            created_at: Utc::now(),
        };

        let stored = StoredIdentity { version: STORAGE_VERSION, record };
        let encoded = bincode::serialize(&stored)
            .map_err(|e| FaceAuthError::Storage(format!("Failed to serialize: {}", e)))?;

        // Write then rename, so a crash never leaves a truncated record behind
        let path = self.record_path(next_id);
        let tmp_path = path.with_extension("bincode.tmp");
        fs::write(&tmp_path, encoded)?;
        fs::rename(&tmp_path, &path)?;

        tracing::debug!("Stored identity {} ({})", stored.record.id, stored.record.username);
        Ok(stored.record)
    }
}

/// Process-local store, for tests and tooling.
#[derive(Default)]
pub struct MemoryIdentityStore {
    records: Mutex<Vec<IdentityRecord>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record verbatim, including its id and encoding text.
    pub fn push(&self, record: IdentityRecord) -> Result<()> {
        let mut records = self.lock()?;
        records.push(record);
        records.sort_by_key(|record| record.id);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<IdentityRecord>>> {
        self.records
            .lock()
            .map_err(|_| FaceAuthError::Storage("identity store lock poisoned".into()))
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn list_identities(&self) -> Result<Vec<IdentityRecord>> {
        Ok(self.lock()?.clone())
    }

    fn insert(&self, identity: NewIdentity) -> Result<IdentityRecord> {
        let mut records = self.lock()?;
        let id = records.last().map(|record| record.id + 1).unwrap_or(1);
        let record = IdentityRecord {
            id,
            username: identity.username,
            email: identity.email,
            face_encoding: identity.face_encoding,
            created_at: Utc::now(),
        };
        records.push(record.clone());
        Ok(record)
    }
}
