//! Persistence contract for captured checkpoint state.
//!
//! The core hands opaque byte buffers plus a [`HandleRecord`] to a [`CheckpointStore`];
//! the record format is the store's business.

use crate::error::{PhosError, Result};
use crate::handle::{HandleKey, HandleRecord};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

pub trait CheckpointStore: Send + Sync {
    fn persist(&self, client_id: Uuid, record: &HandleRecord, data: &[u8]) -> Result<()>;

    fn load(&self, client_id: Uuid, key: HandleKey, version: u64) -> Result<(HandleRecord, Vec<u8>)>;
}

/// Writes `<root>/<client>/<kind>-<id>-v<version>.{bin,json}`
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stem(&self, client_id: Uuid, key: HandleKey, version: u64) -> PathBuf {
        self.root
            .join(client_id.to_string())
            .join(format!("{}-{}-v{}", key.kind, key.id, version))
    }
}

impl CheckpointStore for DirectoryStore {
    fn persist(&self, client_id: Uuid, record: &HandleRecord, data: &[u8]) -> Result<()> {
        let stem = self.stem(client_id, record.key, record.version);
        if let Some(dir) = stem.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(stem.with_extension("bin"), data)?;
        fs::write(
            stem.with_extension("json"),
            serde_json::to_vec_pretty(record)?,
        )?;
        debug!(
            client_id = %client_id,
            handle = %record.key,
            version = record.version,
            bytes = data.len(),
            "checkpoint persisted"
        );
        Ok(())
    }

    fn load(&self, client_id: Uuid, key: HandleKey, version: u64) -> Result<(HandleRecord, Vec<u8>)> {
        let stem = self.stem(client_id, key, version);
        let record_path = stem.with_extension("json");
        if !record_path.exists() {
            return Err(PhosError::not_found(format!(
                "checkpoint {key} v{version} under {}",
                self.root.display()
            )));
        }
        let record: HandleRecord = serde_json::from_slice(&fs::read(record_path)?)?;
        let data = fs::read(stem.with_extension("bin"))?;
        Ok((record, data))
    }
}
