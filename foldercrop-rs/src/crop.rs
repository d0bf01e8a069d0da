use ndarray::s;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::error::{CropError, Result};
use crate::grid::SampleGrid;

/// Half-open sample range `[start, end)`. Signed so that a bad request from
/// the front-end can be represented and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRequest {
    pub start: i64,
    pub end: i64,
}

impl CropRequest {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Row count of the cropped grid. Only meaningful once validated.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start).max(0) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks run in order and the first failure wins:
    /// non-negative start, end within the grid, non-empty range.
    pub fn validate(&self, rows: usize) -> Result<Range<usize>> {
        let reject = |reason| CropError::InvalidRange {
            start: self.start,
            end: self.end,
            rows,
            reason,
        };
        let start = usize::try_from(self.start).map_err(|_| reject("start is negative"))?;
        if self.end > 0 && usize::try_from(self.end).map_or(true, |end| end > rows) {
            return Err(reject("end exceeds row count"));
        }
        let end = usize::try_from(self.end).unwrap_or(0);
        if start >= end {
            return Err(reject("range is empty"));
        }
        Ok(start..end)
    }
}

impl fmt::Display for CropRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Returns a new grid holding rows `[start, end)` with every channel kept.
/// The input is left untouched.
pub fn apply(grid: &SampleGrid, request: &CropRequest) -> Result<SampleGrid> {
    let rows = request.validate(grid.rows())?;
    let cropped = SampleGrid::new(grid.data().slice(s![rows, ..]).to_owned())?;
    match grid.channel_names() {
        Some(names) => cropped.with_channel_names(names.to_vec()),
        None => Ok(cropped),
    }
}
