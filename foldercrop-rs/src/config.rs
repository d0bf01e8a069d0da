use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::catalog::FileRecord;
use crate::crop::CropRequest;

pub const DEFAULT_MAX_POINTS: usize = 2_000_000;

/// What a later run does with files whose last outcome was `Failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailedPolicy {
    /// `Failed` is terminal; only an explicit reset brings the file back.
    #[default]
    Keep,
    /// Offer failed files to the operator again.
    Retry,
}

#[derive(Debug, Clone)]
pub struct CropperConfig {
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub checkpoint_path: PathBuf,
    /// Files with more samples than this are refused by the decoders.
    pub max_points: usize,
    /// Operator label prefixed to output file names.
    pub label: Option<String>,
    pub failed_policy: FailedPolicy,
    pub recursive: bool,
}

impl CropperConfig {
    pub fn new(input_folder: impl Into<PathBuf>) -> Self {
        Self {
            input_folder: input_folder.into(),
            output_folder: PathBuf::from("./cropped"),
            checkpoint_path: PathBuf::from("./checkpoint.json"),
            max_points: DEFAULT_MAX_POINTS,
            label: None,
            failed_policy: FailedPolicy::Keep,
            recursive: false,
        }
    }

    /// `{label_}{stem}_x{start}_{end}.{ext}` under the output folder, keeping
    /// the input's sub-directory and its extension as written, so `a.csv` and
    /// `a.CSV` or equal stems in different folders never share an output.
    pub fn output_path(&self, file: &FileRecord, range: &CropRequest) -> PathBuf {
        let rel = Path::new(&file.id);
        let stem = rel
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = rel
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.format.extension().to_string());
        let prefix = match self.label.as_deref().map(sanitize_label) {
            Some(label) if !label.is_empty() => format!("{label}_"),
            _ => String::new(),
        };
        let name = format!("{prefix}{stem}_x{}_{}.{ext}", range.start, range.end);
        match rel.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => self.output_folder.join(dir).join(name),
            _ => self.output_folder.join(name),
        }
    }
}

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W+").expect("static pattern is valid"));

/// Collapse every run of non-word characters into `_`, without leading or
/// trailing underscores.
pub fn sanitize_label(label: &str) -> String {
    NON_WORD
        .replace_all(label.trim(), "_")
        .trim_matches('_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::GridFormat;

    fn record(id: &str, format: GridFormat) -> FileRecord {
        FileRecord {
            id: id.to_string(),
            path: PathBuf::from("/data").join(id),
            format,
        }
    }

    #[test]
    fn label_sanitizing() {
        assert_eq!(sanitize_label("  run 3 / left-arm "), "run_3_left_arm");
        assert_eq!(sanitize_label("   "), "");
        assert_eq!(sanitize_label("séance"), "séance");
    }

    #[test]
    fn extension_case_keeps_outputs_apart() {
        let mut config = CropperConfig::new("/data");
        config.output_folder = PathBuf::from("/out");
        let range = CropRequest::new(0, 2);
        let lower = config.output_path(&record("a.csv", GridFormat::Csv), &range);
        let upper = config.output_path(&record("a.CSV", GridFormat::Csv), &range);
        assert_eq!(lower, PathBuf::from("/out/a_x0_2.csv"));
        assert_eq!(upper, PathBuf::from("/out/a_x0_2.CSV"));
    }

    #[test]
    fn output_names() {
        let mut config = CropperConfig::new("/data");
        config.output_folder = PathBuf::from("/out");

        let plain = config.output_path(&record("b.csv", GridFormat::Csv), &CropRequest::new(100, 500));
        assert_eq!(plain, PathBuf::from("/out/b_x100_500.csv"));

        config.label = Some("trial 2".into());
        let nested = config.output_path(&record("sub/s1.npy", GridFormat::Npy), &CropRequest::new(0, 10));
        assert_eq!(nested, PathBuf::from("/out/sub/trial_2_s1_x0_10.npy"));

        let upper = config.output_path(&record("A.CSV", GridFormat::Csv), &CropRequest::new(0, 2));
        assert_eq!(upper, PathBuf::from("/out/trial_2_A_x0_2.CSV"));

        config.label = Some(" !! ".into());
        let blank = config.output_path(&record("c.csv", GridFormat::Csv), &CropRequest::new(1, 2));
        assert_eq!(blank, PathBuf::from("/out/c_x1_2.csv"));
    }
}
