//! Durable per-file outcomes.
//!
//! The store is a map from file identity to `CheckpointEntry`, kept as
//! pretty-printed JSON ordered by identity. Every mutation rewrites the whole
//! file through a temp file + rename before returning, so a crash leaves
//! either the previous state or the new one on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::atomic::write_atomic;
use crate::crop::CropRequest;
use crate::error::{CropError, Result};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropStatus {
    Pending,
    Skipped,
    Cropped,
    Failed,
}

impl CropStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CropStatus::Pending)
    }

    pub fn label(self) -> &'static str {
        match self {
            CropStatus::Pending => "pending",
            CropStatus::Skipped => "skipped",
            CropStatus::Cropped => "cropped",
            CropStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CropStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub status: CropStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_range: Option<CropRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Why the file failed; only set for `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CheckpointEntry {
    pub fn skipped() -> Self {
        Self {
            status: CropStatus::Skipped,
            crop_range: None,
            output_path: None,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    pub fn cropped(range: CropRequest, output_path: PathBuf) -> Self {
        Self {
            status: CropStatus::Cropped,
            crop_range: Some(range),
            output_path: Some(output_path),
            reason: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(range: Option<CropRequest>, reason: impl Into<String>) -> Self {
        Self {
            status: CropStatus::Failed,
            crop_range: range,
            output_path: None,
            reason: Some(reason.into()),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Serialize)]
struct CheckpointFileRef<'a> {
    version: u32,
    entries: &'a BTreeMap<String, CheckpointEntry>,
}

#[derive(Deserialize)]
struct CheckpointFile {
    version: u32,
    entries: BTreeMap<String, CheckpointEntry>,
}

fn corrupt(path: &Path, reason: impl ToString) -> CropError {
    CropError::CorruptCheckpoint {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    entries: BTreeMap<String, CheckpointEntry>,
}

impl CheckpointStore {
    /// A missing file is a first run and yields an empty store. A file that
    /// exists but cannot be parsed is `CorruptCheckpoint`, never empty.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    path,
                    entries: BTreeMap::new(),
                })
            }
            Err(e) => return Err(corrupt(&path, e)),
        };
        let file: CheckpointFile = serde_json::from_str(&text).map_err(|e| corrupt(&path, e))?;
        if file.version != FORMAT_VERSION {
            let reason = format!("unsupported checkpoint version {}", file.version);
            return Err(corrupt(&path, reason));
        }
        Ok(Self {
            path,
            entries: file.entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, id: &str) -> Option<&CheckpointEntry> {
        self.entries.get(id)
    }

    /// Identity of the entry whose recorded output is `output`, if any.
    pub fn output_owner(&self, output: &Path) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, e)| e.output_path.as_deref() == Some(output))
            .map(|(id, _)| id.as_str())
    }

    /// Insert or overwrite, then persist. When persisting fails the in-memory
    /// map is rolled back so it never claims more than what is on disk.
    pub fn record(&mut self, id: &str, entry: CheckpointEntry) -> Result<()> {
        let previous = self.entries.insert(id.to_string(), entry);
        if let Err(e) = self.persist() {
            match previous {
                Some(prev) => self.entries.insert(id.to_string(), prev),
                None => self.entries.remove(id),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Snapshot of every entry, ordered by identity.
    pub fn all(&self) -> Vec<(String, CheckpointEntry)> {
        self.entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget the given identities so the next run visits them again.
    pub fn reset<I, S>(&mut self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kept = self.entries.clone();
        let removed = ids
            .into_iter()
            .filter(|id| kept.remove(id.as_ref()).is_some())
            .count();
        self.replace(kept)?;
        Ok(removed)
    }

    pub fn reset_failed(&mut self) -> Result<usize> {
        let mut kept = self.entries.clone();
        kept.retain(|_, e| e.status != CropStatus::Failed);
        let removed = self.entries.len() - kept.len();
        self.replace(kept)?;
        Ok(removed)
    }

    pub fn clear(&mut self) -> Result<usize> {
        let removed = self.entries.len();
        self.replace(BTreeMap::new())?;
        Ok(removed)
    }

    fn replace(&mut self, entries: BTreeMap<String, CheckpointEntry>) -> Result<()> {
        let previous = std::mem::replace(&mut self.entries, entries);
        if let Err(e) = self.persist() {
            self.entries = previous;
            return Err(e);
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let file = CheckpointFileRef {
            version: FORMAT_VERSION,
            entries: &self.entries,
        };
        write_atomic(&self.path, |w| {
            serde_json::to_writer_pretty(&mut *w, &file)?;
            w.write_all(b"\n")
        })
        .map_err(|source| CropError::Persist {
            path: self.path.clone(),
            source,
        })
    }
}
