use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;

use crate::atomic::write_atomic;
use crate::error::{CropError, Result};
use crate::grid::SampleGrid;
use crate::npy;

/// Supported on-disk grid formats. Each variant knows how to decode a file
/// into a `SampleGrid` and encode one back in the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridFormat {
    Csv,
    Npy,
}

impl GridFormat {
    pub const ALL: [GridFormat; 2] = [GridFormat::Csv, GridFormat::Npy];

    pub fn extension(self) -> &'static str {
        match self {
            GridFormat::Csv => "csv",
            GridFormat::Npy => "npy",
        }
    }

    /// Case-insensitive match on the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(ext))
    }

    /// Files with more than `max_points` samples are refused.
    pub fn decode(self, path: &Path, max_points: usize) -> Result<SampleGrid> {
        match self {
            GridFormat::Csv => read_csv(path, max_points),
            GridFormat::Npy => {
                let file = File::open(path).map_err(|e| decode_error(path, e))?;
                let len = file.metadata().map_err(|e| decode_error(path, e))?.len();
                let data = npy::read_array(BufReader::new(file), max_points, len)
                    .map_err(|e| decode_error(path, e))?;
                SampleGrid::new(data).map_err(|e| decode_error(path, e))
            }
        }
    }

    /// Written through a temp file, so a failure never leaves a partial output.
    pub fn encode(self, path: &Path, grid: &SampleGrid) -> Result<()> {
        let written = match self {
            GridFormat::Csv => write_atomic(path, |w| write_csv(w, grid)),
            GridFormat::Npy => write_atomic(path, |w| npy::write_array(w, grid.data())),
        };
        written.map_err(|e| CropError::Encode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

fn decode_error(path: &Path, reason: impl ToString) -> CropError {
    CropError::Decode {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_csv(path: &Path, max_points: usize) -> Result<SampleGrid> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| decode_error(path, e))?;

    let mut names: Option<Vec<String>> = None;
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| decode_error(path, e))?;
        let parsed: std::result::Result<Vec<f64>, _> =
            record.iter().map(str::parse::<f64>).collect();
        match parsed {
            Ok(row) => rows.push(row),
            // A non-numeric first line is a header naming the channels.
            Err(_) if i == 0 => names = Some(record.iter().map(str::to_string).collect()),
            Err(e) => {
                return Err(decode_error(
                    path,
                    format!("line {}: {}", i + 1, e),
                ))
            }
        }
        if rows.len() > max_points {
            return Err(decode_error(
                path,
                format!("more than {max_points} samples"),
            ));
        }
    }

    let grid = SampleGrid::from_rows(rows).map_err(|e| decode_error(path, e))?;
    match names {
        Some(names) => grid.with_channel_names(names).map_err(|e| decode_error(path, e)),
        None => Ok(grid),
    }
}

fn write_csv<W: Write>(writer: W, grid: &SampleGrid) -> io::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    if let Some(names) = grid.channel_names() {
        csv_writer.write_record(names)?;
    }
    for row in grid.data().rows() {
        csv_writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    csv_writer.flush()
}
