use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{CropError, Result};

/// Rows are time-ordered samples, columns are channels.
///
/// Always at least 1x1. Channel names are only present when the source
/// format carried them (a CSV header row).
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGrid {
    data: Array2<f64>,
    channel_names: Option<Vec<String>>,
}

impl SampleGrid {
    pub fn new(data: Array2<f64>) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(CropError::InvalidGrid("grid has no samples".into()));
        }
        if data.ncols() == 0 {
            return Err(CropError::InvalidGrid("grid has no channels".into()));
        }
        Ok(Self {
            data,
            channel_names: None,
        })
    }

    /// Build from row-major samples. Every row must have the same width.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut flat = Vec::with_capacity(n_rows * n_cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != n_cols {
                return Err(CropError::InvalidGrid(format!(
                    "row {} has {} channels, expected {}",
                    i,
                    row.len(),
                    n_cols
                )));
            }
            flat.extend(row);
        }
        let data = Array2::from_shape_vec((n_rows, n_cols), flat)
            .map_err(|e| CropError::InvalidGrid(e.to_string()))?;
        Self::new(data)
    }

    pub fn with_channel_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.cols() {
            return Err(CropError::InvalidGrid(format!(
                "{} channel names for {} channels",
                names.len(),
                self.cols()
            )));
        }
        self.channel_names = Some(names);
        Ok(self)
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn channel_names(&self) -> Option<&[String]> {
        self.channel_names.as_deref()
    }

    /// Per-channel (min, max), ignoring NaN.
    pub fn channel_extents(&self) -> Vec<(f64, f64)> {
        self.data
            .axis_iter(Axis(1))
            .map(|column| {
                column.iter().filter(|v| !v.is_nan()).fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), &v| (lo.min(v), hi.max(v)),
                )
            })
            .collect()
    }
}
