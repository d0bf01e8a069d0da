//! Where per-file decisions come from.
//!
//! The runner only sees `DecisionSource`; how the operator chose (terminal
//! prompt, a replayed plan file, a test script) stays behind the trait.

use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing::warn;

use crate::catalog::FileRecord;
use crate::crop::CropRequest;
use crate::error::{CropError, Result};
use crate::grid::SampleGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip,
    Crop(CropRequest),
    Quit,
}

pub trait DecisionSource {
    /// Blocks until a decision for `file` is available. An error here is not
    /// a per-file failure: it ends the run.
    fn decide(&mut self, file: &FileRecord, grid: &SampleGrid) -> Result<Decision>;
}

/// Fixed sequence of decisions, one per visited file; `Quit` once exhausted.
#[derive(Debug, Default)]
pub struct ScriptedDecisions {
    queue: VecDeque<Decision>,
}

impl ScriptedDecisions {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            queue: decisions.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl DecisionSource for ScriptedDecisions {
    fn decide(&mut self, _file: &FileRecord, _grid: &SampleGrid) -> Result<Decision> {
        Ok(self.queue.pop_front().unwrap_or(Decision::Quit))
    }
}

#[derive(Debug, Deserialize)]
struct PlanRow {
    file: String,
    action: String,
    #[serde(default)]
    start: Option<i64>,
    #[serde(default)]
    end: Option<i64>,
}

/// Decisions keyed by file identity, read from a CSV with columns
/// `file,action,start,end` (`action` is `skip`, `crop` or `quit`).
/// A file missing from the plan stops the run so it can be resumed later.
#[derive(Debug, Default)]
pub struct PlanDecisions {
    plan: HashMap<String, Decision>,
}

impl PlanDecisions {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| CropError::InvalidPlan(format!("{}: {e}", path.display())))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut plan = HashMap::new();
        for (i, row) in csv_reader.deserialize::<PlanRow>().enumerate() {
            let line = i + 2;
            let row = row.map_err(|e| CropError::InvalidPlan(format!("row {line}: {e}")))?;
            let decision = match (row.action.to_lowercase().as_str(), row.start, row.end) {
                ("skip", _, _) => Decision::Skip,
                ("quit", _, _) => Decision::Quit,
                ("crop", Some(start), Some(end)) => Decision::Crop(CropRequest::new(start, end)),
                ("crop", _, _) => {
                    return Err(CropError::InvalidPlan(format!(
                        "row {line}: crop needs both start and end"
                    )))
                }
                (other, _, _) => {
                    return Err(CropError::InvalidPlan(format!(
                        "row {line}: unknown action {other:?}"
                    )))
                }
            };
            if plan.insert(row.file.clone(), decision).is_some() {
                return Err(CropError::InvalidPlan(format!(
                    "row {line}: {} is listed twice",
                    row.file
                )));
            }
        }
        Ok(Self { plan })
    }

    pub fn len(&self) -> usize {
        self.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }
}

impl DecisionSource for PlanDecisions {
    fn decide(&mut self, file: &FileRecord, _grid: &SampleGrid) -> Result<Decision> {
        match self.plan.get(&file.id) {
            Some(decision) => Ok(*decision),
            None => {
                warn!(file = %file.id, "file not in plan, stopping here");
                Ok(Decision::Quit)
            }
        }
    }
}

/// Line-oriented operator prompt. EOF counts as `quit`.
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn describe(&mut self, file: &FileRecord, grid: &SampleGrid) -> io::Result<()> {
        writeln!(
            self.output,
            "\n{}  |  {} samples x {} channels",
            file.id,
            grid.rows(),
            grid.cols()
        )?;
        for (ch, (lo, hi)) in grid.channel_extents().into_iter().enumerate() {
            let name = grid
                .channel_names()
                .and_then(|names| names.get(ch))
                .cloned()
                .unwrap_or_else(|| format!("CH{ch}"));
            writeln!(self.output, "  {name}: min {lo}, max {hi}")?;
        }
        Ok(())
    }

    fn ask(&mut self, file: &FileRecord, grid: &SampleGrid) -> io::Result<Decision> {
        self.describe(file, grid)?;
        loop {
            write!(
                self.output,
                "crop START END | START:END | s(kip) | q(uit) > "
            )?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.output)?;
                return Ok(Decision::Quit);
            }
            match parse_command(&line) {
                Some(decision) => return Ok(decision),
                None => writeln!(self.output, "unrecognised input: {:?}", line.trim())?,
            }
        }
    }
}

impl<R: BufRead, W: Write> DecisionSource for TerminalPrompt<R, W> {
    fn decide(&mut self, file: &FileRecord, grid: &SampleGrid) -> Result<Decision> {
        self.ask(file, grid).map_err(CropError::Prompt)
    }
}

/// Ranges are passed through unchecked; validating them is the crop engine's job.
fn parse_command(line: &str) -> Option<Decision> {
    let line = line.trim().to_lowercase();
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.as_slice() {
        ["s"] | ["skip"] => Some(Decision::Skip),
        ["q"] | ["quit"] => Some(Decision::Quit),
        ["c" | "crop", start, end] => parse_range(start, end),
        ["c" | "crop", range] | [range] => {
            let (start, end) = range.split_once(':')?;
            parse_range(start, end)
        }
        _ => None,
    }
}

fn parse_range(start: &str, end: &str) -> Option<Decision> {
    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    Some(Decision::Crop(CropRequest::new(start, end)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::GridFormat;
    use ndarray::array;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn record(id: &str) -> FileRecord {
        FileRecord {
            id: id.to_string(),
            path: PathBuf::from(id),
            format: GridFormat::Csv,
        }
    }

    fn grid() -> SampleGrid {
        SampleGrid::new(array![[1.0, 5.0], [2.0, -3.0]]).unwrap()
    }

    #[test]
    fn command_parsing() {
        let crop = |s, e| Some(Decision::Crop(CropRequest::new(s, e)));
        assert_eq!(parse_command("s\n"), Some(Decision::Skip));
        assert_eq!(parse_command(" SKIP "), Some(Decision::Skip));
        assert_eq!(parse_command("q"), Some(Decision::Quit));
        assert_eq!(parse_command("c 100 500"), crop(100, 500));
        assert_eq!(parse_command("crop 7:9"), crop(7, 9));
        assert_eq!(parse_command("100:500"), crop(100, 500));
        assert_eq!(parse_command("-5:3"), crop(-5, 3));
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("c 1"), None);
        assert_eq!(parse_command("c one two"), None);
        assert_eq!(parse_command("delete"), None);
    }

    #[test]
    fn prompt_reprompts_then_decides() {
        let input = Cursor::new("what\n\n  10:20\n");
        let mut out = Vec::new();
        let decision = TerminalPrompt::new(input, &mut out)
            .decide(&record("a.csv"), &grid())
            .unwrap();
        assert_eq!(decision, Decision::Crop(CropRequest::new(10, 20)));

        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("a.csv  |  2 samples x 2 channels"));
        assert!(shown.contains("CH1: min -3, max 5"));
        assert_eq!(shown.matches("unrecognised input").count(), 2);
    }

    #[test]
    fn prompt_eof_quits() {
        let mut out = Vec::new();
        let decision = TerminalPrompt::new(Cursor::new(""), &mut out)
            .decide(&record("a.csv"), &grid())
            .unwrap();
        assert_eq!(decision, Decision::Quit);
    }

    #[test]
    fn scripted_runs_dry_into_quit() {
        let mut script = ScriptedDecisions::new([Decision::Skip]);
        assert_eq!(script.decide(&record("a"), &grid()).unwrap(), Decision::Skip);
        assert_eq!(script.decide(&record("b"), &grid()).unwrap(), Decision::Quit);
        assert_eq!(script.remaining(), 0);
    }

    #[test]
    fn plan_parsing() {
        let csv = "file,action,start,end\na.csv,skip,,\nb.csv, CROP ,100,500\nsub/c.npy,quit\n";
        let mut plan = PlanDecisions::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.decide(&record("a.csv"), &grid()).unwrap(), Decision::Skip);
        assert_eq!(
            plan.decide(&record("b.csv"), &grid()).unwrap(),
            Decision::Crop(CropRequest::new(100, 500))
        );
        assert_eq!(plan.decide(&record("sub/c.npy"), &grid()).unwrap(), Decision::Quit);
        assert_eq!(plan.decide(&record("unlisted.csv"), &grid()).unwrap(), Decision::Quit);
    }

    #[test]
    fn plan_errors() {
        for (csv, needle) in [
            ("file,action,start,end\nb.csv,crop,100,\n", "row 2: crop needs both"),
            ("file,action,start,end\nb.csv,trim,1,2\n", "unknown action \"trim\""),
            ("file,action\na.csv,skip\na.csv,quit\n", "listed twice"),
            ("file,action,start,end\nb.csv,crop,x,2\n", "row 2"),
        ] {
            let err = PlanDecisions::from_reader(csv.as_bytes()).unwrap_err();
            assert!(err.to_string().contains(needle), "{err} / {needle}");
        }
    }
}
