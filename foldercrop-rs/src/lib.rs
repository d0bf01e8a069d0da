//! Resumable batch cropping of CSV / NPY signal files.
//!
//! A run walks the input folder, asks a [`DecisionSource`] what to do with each
//! file not yet settled in the checkpoint, and records every outcome before
//! moving on, so an interrupted batch picks up exactly where it stopped.

mod atomic;
pub mod catalog;
pub mod checkpoint;
pub mod config;
pub mod crop;
pub mod decision;
pub mod error;
pub mod format;
pub mod grid;
mod npy;
pub mod report;
pub mod runner;

pub use catalog::{FileCatalog, FileRecord};
pub use checkpoint::{CheckpointEntry, CheckpointStore, CropStatus};
pub use config::{CropperConfig, FailedPolicy};
pub use crop::CropRequest;
pub use decision::{Decision, DecisionSource, PlanDecisions, ScriptedDecisions, TerminalPrompt};
pub use error::{CropError, Result};
pub use format::GridFormat;
pub use grid::SampleGrid;
pub use report::{Report, ReportEntry, ReportGenerator};
pub use runner::{BatchRunner, RunSummary};
