use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CropError {
    #[error("input folder not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("checkpoint {} is unreadable ({reason}); move it aside or reset it before retrying", path.display())]
    CorruptCheckpoint { path: PathBuf, reason: String },

    #[error("invalid crop range [{start}, {end}) for {rows} rows: {reason}")]
    InvalidRange {
        start: i64,
        end: i64,
        rows: usize,
        reason: &'static str,
    },

    #[error("invalid sample grid: {0}")]
    InvalidGrid(String),

    #[error("cannot decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("cannot encode {}: {reason}", path.display())]
    Encode { path: PathBuf, reason: String },

    #[error("cannot persist checkpoint {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid decision plan: {0}")]
    InvalidPlan(String),

    #[error("decision prompt failed: {0}")]
    Prompt(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CropError {
    /// Errors confined to a single input file. The runner records these as
    /// `Failed` and moves on; anything else ends the run.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            CropError::InvalidRange { .. }
                | CropError::InvalidGrid(_)
                | CropError::Decode { .. }
                | CropError::Encode { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CropError>;
