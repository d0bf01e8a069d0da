use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{CropError, Result};
use crate::format::GridFormat;

/// An eligible input file. `id` is the path relative to the catalog root with
/// `/` separators; it is the key the checkpoint is indexed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: String,
    pub path: PathBuf,
    pub format: GridFormat,
}

#[derive(Debug, Clone)]
pub struct FileCatalog {
    root: PathBuf,
    records: Vec<FileRecord>,
}

impl FileCatalog {
    /// Scan `root` for supported files, sorted by identity. Only the top
    /// level is scanned unless `recursive` is set.
    pub fn scan(root: &Path, recursive: bool) -> Result<Self> {
        if !root.is_dir() {
            return Err(CropError::NotFound {
                path: root.to_path_buf(),
            });
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut records = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).max_depth(max_depth) {
            let entry = entry.map_err(|e| CropError::Io(e.into()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(format) = GridFormat::from_path(path) else {
                continue;
            };
            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            let id = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            records.push(FileRecord {
                id,
                path: path.to_path_buf(),
                format,
            });
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));

        debug!(root = %root.display(), files = records.len(), "catalog scanned");
        Ok(Self {
            root: root.to_path_buf(),
            records,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
