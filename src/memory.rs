//! On-disk state between runs.
//!
//! Two JSON documents live in the data directory:
//! - `processed_conversations.json`: `{"processed": [record, ...]}`
//! - `conversation_memories.json`: `{"memories": [payload, ...]}`
//!
//! Each is read once at the start of a run and rewritten whole at the end.
//! Entries are held as raw JSON, so records this version does not understand
//! are written back exactly as found. A file that does not decode stops the
//! run and is never overwritten.
//! There is no locking; overlapping runs will lose writes.

use crate::dedup::ProcessedRecord;
use crate::error::{DigestError, Result};
use crate::payload::ConversationPayload;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const PROCESSED_FILE: &str = "processed_conversations.json";
pub const MEMORIES_FILE: &str = "conversation_memories.json";

/// Delivery markers, classified on load by [`crate::dedup::ProcessedEntry`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedLog {
    #[serde(default)]
    pub processed: Vec<Value>,
}

impl ProcessedLog {
    pub fn push(&mut self, record: &ProcessedRecord) -> Result<()> {
        self.processed.push(serde_json::to_value(record)?);
        Ok(())
    }
}

/// Delivered payloads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryLog {
    #[serde(default)]
    pub memories: Vec<Value>,
}

impl MemoryLog {
    pub fn push(&mut self, payload: &ConversationPayload) -> Result<()> {
        self.memories.push(serde_json::to_value(payload)?);
        Ok(())
    }
}

/// Read a JSON document. A missing file yields the default; one that does
/// not decode is a [`DigestError::Store`].
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&content).map_err(|e| {
        error!("Error decoding JSON from {}: {}", path.display(), e);
        DigestError::Store {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    })
}

/// Overwrite `path` with pretty-printed JSON
pub fn save<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(doc)?;
    fs::write(path, json)?;
    Ok(())
}

/// Create `path` holding the default document if it doesn't exist yet
pub fn ensure_exists<T: Serialize + Default>(path: &Path) -> Result<()> {
    if !path.exists() {
        info!("{} does not exist, creating it", path.display());
        save(path, &T::default())?;
    }
    Ok(())
}

/// The two state files for one data directory
#[derive(Debug, Clone)]
pub struct DataStore {
    pub processed_path: PathBuf,
    pub memories_path: PathBuf,
}

impl DataStore {
    /// Creates the data directory if needed. Files are left alone until
    /// [`DataStore::ensure_files`].
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            processed_path: data_dir.join(PROCESSED_FILE),
            memories_path: data_dir.join(MEMORIES_FILE),
        })
    }

    pub fn ensure_files(&self) -> Result<()> {
        ensure_exists::<ProcessedLog>(&self.processed_path)?;
        ensure_exists::<MemoryLog>(&self.memories_path)
    }

    pub fn load_processed(&self) -> Result<ProcessedLog> {
        load_or_default(&self.processed_path)
    }

    /// Re-read the processed log, append `records` and write it back
    pub fn append_processed(&self, records: &[ProcessedRecord]) -> Result<()> {
        let mut log = self.load_processed()?;
        for record in records {
            log.push(record)?;
        }
        save(&self.processed_path, &log)
    }

    pub fn load_memories(&self) -> Result<MemoryLog> {
        load_or_default(&self.memories_path)
    }

    pub fn save_memories(&self, log: &MemoryLog) -> Result<()> {
        save(&self.memories_path, log)
    }
}
