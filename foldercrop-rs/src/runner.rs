use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::catalog::{FileCatalog, FileRecord};
use crate::checkpoint::{CheckpointEntry, CheckpointStore, CropStatus};
use crate::config::{CropperConfig, FailedPolicy};
use crate::crop::{self, CropRequest};
use crate::decision::{Decision, DecisionSource};
use crate::error::{CropError, Result};
use crate::grid::SampleGrid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Eligible files found in the input folder.
    pub catalogued: usize,
    /// Files passed over because the checkpoint already settled them.
    pub resumed: usize,
    /// Files presented to the decision source this run.
    pub visited: usize,
    pub skipped: usize,
    pub cropped: usize,
    pub failed: usize,
    pub quit: bool,
}

impl RunSummary {
    fn count(&mut self, status: CropStatus) {
        match status {
            CropStatus::Skipped => self.skipped += 1,
            CropStatus::Cropped => self.cropped += 1,
            CropStatus::Failed => self.failed += 1,
            CropStatus::Pending => {}
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files: {} already handled, {} visited ({} cropped, {} skipped, {} failed){}",
            self.catalogued,
            self.resumed,
            self.visited,
            self.cropped,
            self.skipped,
            self.failed,
            if self.quit { ", stopped early" } else { "" }
        )
    }
}

/// Drives one pass over the input folder. Files are handled strictly one at
/// a time: decode, ask, crop or skip, and persist the outcome before the next
/// file is considered.
pub struct BatchRunner {
    config: CropperConfig,
    store: CheckpointStore,
}

impl BatchRunner {
    /// Fails with `CorruptCheckpoint` rather than starting from scratch when
    /// the checkpoint exists but cannot be read.
    pub fn new(config: CropperConfig) -> Result<Self> {
        let store = CheckpointStore::load(&config.checkpoint_path)?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &CropperConfig {
        &self.config
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn into_store(self) -> CheckpointStore {
        self.store
    }

    /// Whether a previous run already reached a final outcome for `id`.
    /// Matching is by identity, so reordering or adding files does not matter.
    pub fn is_settled(&self, id: &str) -> bool {
        match self.store.get(id).map(|e| e.status) {
            None | Some(CropStatus::Pending) => false,
            Some(CropStatus::Failed) => self.config.failed_policy == FailedPolicy::Keep,
            Some(CropStatus::Skipped) | Some(CropStatus::Cropped) => true,
        }
    }

    pub fn run(
        &mut self,
        decisions: &mut dyn DecisionSource,
        progress: impl Fn(f64, &str),
    ) -> Result<RunSummary> {
        let catalog = FileCatalog::scan(&self.config.input_folder, self.config.recursive)?;
        fs::create_dir_all(&self.config.output_folder)?;

        let total = catalog.len();
        let mut summary = RunSummary {
            catalogued: total,
            ..RunSummary::default()
        };
        info!(
            input = %self.config.input_folder.display(),
            output = %self.config.output_folder.display(),
            checkpoint = %self.store.path().display(),
            files = total,
            "starting batch"
        );

        for (i, file) in catalog.records().iter().enumerate() {
            if self.is_settled(&file.id) {
                summary.resumed += 1;
                debug!(file = %file.id, "already handled");
                continue;
            }
            summary.visited += 1;

            let Some(status) = self.visit(file, decisions)? else {
                summary.quit = true;
                info!(file = %file.id, "operator quit");
                break;
            };
            summary.count(status);
            progress(
                (i + 1) as f64 / total as f64,
                &format!("{}/{} {}: {}", i + 1, total, file.id, status),
            );
        }

        info!(%summary, "batch finished");
        progress(1.0, &summary.to_string());
        Ok(summary)
    }

    /// `None` when the operator quit. Per-file problems become a `Failed`
    /// entry; only checkpoint and decision-source errors escape.
    fn visit(
        &mut self,
        file: &FileRecord,
        decisions: &mut dyn DecisionSource,
    ) -> Result<Option<CropStatus>> {
        let entry = match file.format.decode(&file.path, self.config.max_points) {
            Err(e) => failed_entry(file, None, e)?,
            Ok(grid) => match decisions.decide(file, &grid)? {
                Decision::Quit => return Ok(None),
                Decision::Skip => {
                    info!(file = %file.id, "skipped");
                    CheckpointEntry::skipped()
                }
                Decision::Crop(range) => match self.crop_to_file(file, &grid, &range) {
                    Ok(output) => {
                        info!(file = %file.id, %range, output = %output.display(), "cropped");
                        CheckpointEntry::cropped(range, output)
                    }
                    Err(e) => failed_entry(file, Some(range), e)?,
                },
            },
        };

        let status = entry.status;
        self.store.record(&file.id, entry)?;
        Ok(Some(status))
    }

    fn crop_to_file(
        &self,
        file: &FileRecord,
        grid: &SampleGrid,
        range: &CropRequest,
    ) -> Result<PathBuf> {
        let cropped = crop::apply(grid, range)?;
        let output = self.config.output_path(file, range);
        // never clobber an output the checkpoint attributes to another file
        if let Some(owner) = self.store.output_owner(&output).filter(|o| *o != file.id) {
            return Err(CropError::Encode {
                path: output.clone(),
                reason: format!("already holds the output of {owner}"),
            });
        }
        file.format.encode(&output, &cropped)?;
        Ok(output)
    }
}

fn failed_entry(
    file: &FileRecord,
    range: Option<CropRequest>,
    err: CropError,
) -> Result<CheckpointEntry> {
    if !err.is_per_file() {
        return Err(err);
    }
    warn!(file = %file.id, error = %err, "file failed");
    Ok(CheckpointEntry::failed(range, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::ScriptedDecisions;
    use std::fs;
    use tempfile::TempDir;

    fn setup(files: &[(&str, &str)]) -> (TempDir, CropperConfig) {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        fs::create_dir_all(&input).unwrap();
        for (name, body) in files {
            fs::write(input.join(name), body).unwrap();
        }
        let mut config = CropperConfig::new(&input);
        config.output_folder = dir.path().join("out");
        config.checkpoint_path = dir.path().join("checkpoint.json");
        (dir, config)
    }

    #[test]
    fn decode_failure_is_recorded_without_asking() {
        let (_dir, config) = setup(&[("a.csv", "1,2\n3\n"), ("b.csv", "1\n2\n")]);
        let mut runner = BatchRunner::new(config).unwrap();
        let mut script = ScriptedDecisions::new([Decision::Skip]);

        let summary = runner.run(&mut script, |_, _| {}).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(script.remaining(), 0);

        let a = runner.store().get("a.csv").unwrap();
        assert_eq!(a.status, CropStatus::Failed);
        assert!(a.reason.as_deref().unwrap().contains("cannot decode"));
        assert_eq!(runner.store().get("b.csv").unwrap().status, CropStatus::Skipped);
    }

    #[test]
    fn failed_policy_controls_revisits() {
        let (_dir, mut config) = setup(&[("a.csv", "1\n2\n3\n")]);
        let mut runner = BatchRunner::new(config.clone()).unwrap();
        let mut script = ScriptedDecisions::new([Decision::Crop(CropRequest::new(0, 9))]);
        runner.run(&mut script, |_, _| {}).unwrap();
        assert_eq!(runner.store().get("a.csv").unwrap().status, CropStatus::Failed);

        let mut runner = BatchRunner::new(config.clone()).unwrap();
        assert!(runner.is_settled("a.csv"));
        let summary = runner.run(&mut ScriptedDecisions::default(), |_, _| {}).unwrap();
        assert_eq!(summary.visited, 0);

        config.failed_policy = FailedPolicy::Retry;
        let mut runner = BatchRunner::new(config).unwrap();
        let mut script = ScriptedDecisions::new([Decision::Crop(CropRequest::new(1, 3))]);
        let summary = runner.run(&mut script, |_, _| {}).unwrap();
        assert_eq!(summary.cropped, 1);
        let a = runner.store().get("a.csv").unwrap();
        assert_eq!(a.status, CropStatus::Cropped);
        assert!(a.reason.is_none());
    }

    #[test]
    fn progress_reports_each_visited_file() {
        let (_dir, config) = setup(&[("a.csv", "1\n"), ("b.csv", "2\n")]);
        let mut runner = BatchRunner::new(config).unwrap();
        let seen = std::cell::RefCell::new(Vec::new());
        let mut script = ScriptedDecisions::new([Decision::Skip, Decision::Skip]);

        runner
            .run(&mut script, |p, msg| seen.borrow_mut().push((p, msg.to_string())))
            .unwrap();
        let seen = seen.into_inner();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (0.5, "1/2 a.csv: skipped".to_string()));
        assert_eq!(seen[1].1, "2/2 b.csv: skipped");
        assert_eq!(seen[2].0, 1.0);
    }

    #[test]
    fn pending_entries_are_revisited() {
        let (_dir, config) = setup(&[("a.csv", "1\n2\n")]);
        let mut store = CheckpointStore::load(&config.checkpoint_path).unwrap();
        let pending = CheckpointEntry {
            status: CropStatus::Pending,
            ..CheckpointEntry::skipped()
        };
        store.record("a.csv", pending).unwrap();

        let mut runner = BatchRunner::new(config).unwrap();
        assert!(!runner.is_settled("a.csv"));
        let mut script = ScriptedDecisions::new([Decision::Skip]);
        let summary = runner.run(&mut script, |_, _| {}).unwrap();
        assert_eq!((summary.resumed, summary.visited, summary.skipped), (0, 1, 1));
        assert_eq!(runner.store().get("a.csv").unwrap().status, CropStatus::Skipped);
    }

    #[test]
    fn output_recorded_for_another_file_is_not_overwritten() {
        let (_dir, config) = setup(&[("a.csv", "1\n2\n3\n")]);
        let taken = config.output_folder.join("a_x0_2.csv");
        fs::create_dir_all(&config.output_folder).unwrap();
        fs::write(&taken, "kept\n").unwrap();
        let mut store = CheckpointStore::load(&config.checkpoint_path).unwrap();
        store
            .record("other.csv", CheckpointEntry::cropped(CropRequest::new(0, 2), taken.clone()))
            .unwrap();

        let mut runner = BatchRunner::new(config).unwrap();
        let mut script = ScriptedDecisions::new([Decision::Crop(CropRequest::new(0, 2))]);
        let summary = runner.run(&mut script, |_, _| {}).unwrap();
        assert_eq!(summary.failed, 1);

        let a = runner.store().get("a.csv").unwrap();
        assert_eq!(a.status, CropStatus::Failed);
        assert!(a.reason.as_deref().unwrap().contains("already holds the output of other.csv"));
        assert_eq!(fs::read_to_string(&taken).unwrap(), "kept\n");
    }

    #[test]
    fn missing_input_folder_aborts() {
        let (dir, mut config) = setup(&[]);
        config.input_folder = dir.path().join("nowhere");
        let mut runner = BatchRunner::new(config).unwrap();
        let err = runner.run(&mut ScriptedDecisions::default(), |_, _| {}).unwrap_err();
        assert!(matches!(err, CropError::NotFound { .. }));
    }

    #[test]
    fn checkpoint_write_failure_is_fatal() {
        let (_dir, config) = setup(&[("a.csv", "1\n"), ("b.csv", "2\n")]);
        fs::create_dir(&config.checkpoint_path).unwrap();
        // load sees a directory, which is unreadable as a checkpoint
        assert!(matches!(
            BatchRunner::new(config.clone()),
            Err(CropError::CorruptCheckpoint { .. })
        ));

        fs::remove_dir(&config.checkpoint_path).unwrap();
        let mut runner = BatchRunner::new(config.clone()).unwrap();
        fs::create_dir(&config.checkpoint_path).unwrap();
        let mut script = ScriptedDecisions::new([Decision::Skip, Decision::Skip]);
        let err = runner.run(&mut script, |_, _| {}).unwrap_err();
        assert!(matches!(err, CropError::Persist { .. }));
        // the run stopped at the first file
        assert_eq!(script.remaining(), 1);
    }
}
