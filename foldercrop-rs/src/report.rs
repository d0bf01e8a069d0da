//! End-of-run audit report.
//!
//! `ReportGenerator::generate` is a pure function of a checkpoint snapshot;
//! `write_report` is the only part that touches the disk.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write as _;
use std::io::Write as _;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::{Component, Path, PathBuf};
use tracing::info;

use crate::atomic::write_atomic;
use crate::checkpoint::{CheckpointEntry, CropStatus};
use crate::crop::CropRequest;
use crate::error::Result;

pub const TEXT_REPORT_NAME: &str = "cropping_report.txt";
pub const HTML_REPORT_NAME: &str = "cropping_report.html";

/// Read-only presentation view of one checkpoint entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry<'a> {
    pub id: &'a str,
    pub status: CropStatus,
    pub range: Option<CropRequest>,
    pub output_path: Option<&'a Path>,
    pub reason: Option<&'a str>,
    pub timestamp: DateTime<Utc>,
}

impl<'a> ReportEntry<'a> {
    pub fn new(id: &'a str, entry: &'a CheckpointEntry) -> Self {
        Self {
            id,
            status: entry.status,
            range: entry.crop_range,
            output_path: entry.output_path.as_deref(),
            reason: entry.reason.as_deref(),
            timestamp: entry.timestamp,
        }
    }

    fn time(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn range_text(&self) -> String {
        self.range.map(|r| r.to_string()).unwrap_or_else(|| "-".into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub plain_text: String,
    pub html: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub skipped: usize,
    pub cropped: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn tally(entries: &[ReportEntry<'_>]) -> Self {
        let mut counts = Self::default();
        for entry in entries {
            match entry.status {
                CropStatus::Pending => counts.pending += 1,
                CropStatus::Skipped => counts.skipped += 1,
                CropStatus::Cropped => counts.cropped += 1,
                CropStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone)]
pub struct ReportGenerator {
    title: String,
    link_base: Option<PathBuf>,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new("Cropping report")
    }
}

impl ReportGenerator {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link_base: None,
        }
    }

    /// Output paths under `base` are linked relative to it, which is what a
    /// browser wants when the HTML file lives in `base`.
    pub fn with_link_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.link_base = Some(base.into());
        self
    }

    pub fn generate(&self, snapshot: &[(String, CheckpointEntry)]) -> Report {
        let mut entries: Vec<ReportEntry<'_>> = snapshot
            .iter()
            .map(|(id, entry)| ReportEntry::new(id, entry))
            .collect();
        entries.sort_by(|a, b| a.id.cmp(b.id));
        let counts = StatusCounts::tally(&entries);

        Report {
            plain_text: self.render_text(&entries, &counts),
            html: self.render_html(&entries, &counts),
        }
    }

    fn render_text(&self, entries: &[ReportEntry<'_>], counts: &StatusCounts) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.title);
        let _ = writeln!(out, "{}\n", "=".repeat(self.title.chars().count()));
        let _ = writeln!(
            out,
            "cropped: {}  skipped: {}  failed: {}  pending: {}",
            counts.cropped, counts.skipped, counts.failed, counts.pending
        );

        for (status, heading) in SECTIONS {
            let section: Vec<_> = entries.iter().filter(|e| e.status == status).collect();
            if section.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n{heading}\n{}", "-".repeat(heading.len()));
            for e in section {
                match status {
                    CropStatus::Cropped => {
                        let output = e.output_path.map(|p| p.display().to_string()).unwrap_or_default();
                        let _ = writeln!(out, "{}  {}  -> {}  ({})", e.id, e.range_text(), output, e.time());
                    }
                    CropStatus::Failed => {
                        let reason = e.reason.unwrap_or("unknown error");
                        let _ = writeln!(out, "{}  {}  ({})", e.id, reason, e.time());
                    }
                    _ => {
                        let _ = writeln!(out, "{}  ({})", e.id, e.time());
                    }
                }
            }
        }
        out
    }

    fn render_html(&self, entries: &[ReportEntry<'_>], counts: &StatusCounts) -> String {
        let title = escape_html(&self.title);
        let mut out = String::new();
        let _ = write!(
            out,
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
             <style>\ntable {{ border-collapse: collapse; width: 100%; }}\n\
             th, td {{ border: 1px solid black; padding: 8px; text-align: left; }}\n</style>\n\
             </head>\n<body>\n<h1>{title}</h1>\n"
        );
        let _ = writeln!(
            out,
            "<p>cropped: {}, skipped: {}, failed: {}, pending: {}</p>",
            counts.cropped, counts.skipped, counts.failed, counts.pending
        );
        out.push_str(
            "<table>\n<tr><th>File</th><th>Status</th><th>Range</th><th>Output / reason</th><th>Timestamp</th></tr>\n",
        );
        for e in entries {
            let detail = match (e.status, e.output_path, e.reason) {
                (CropStatus::Cropped, Some(path), _) => format!(
                    "<a href=\"{}\">{}</a>",
                    escape_html(&self.href(path)),
                    escape_html(&path.display().to_string())
                ),
                (_, _, Some(reason)) => escape_html(reason),
                _ => String::new(),
            };
            let _ = writeln!(
                out,
                "<tr class=\"{}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                e.status,
                escape_html(e.id),
                e.status,
                escape_html(&e.range_text()),
                detail,
                e.time()
            );
        }
        out.push_str("</table>\n</body>\n</html>\n");
        out
    }

    /// Link target for `path`: relative to the link base when one is set,
    /// otherwise a `file://` URL for absolute paths. Segments are
    /// percent-encoded.
    fn href(&self, path: &Path) -> String {
        match self.link_base.as_deref().and_then(|base| relative_to(path, base)) {
            Some(rel) => encode_path(&rel),
            None if path.is_absolute() => format!("file://{}", encode_path(path)),
            None => encode_path(path),
        }
    }
}

/// `path` expressed from `base`, climbing out with `..` where needed.
/// `None` when one is absolute and the other is not, or `base` itself climbs
/// out of the shared prefix.
fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    if path.is_absolute() != base.is_absolute() {
        return None;
    }
    fn parts(p: &Path) -> Vec<Component<'_>> {
        p.components().filter(|c| *c != Component::CurDir).collect()
    }
    let (path, base) = (parts(path), parts(base));
    let shared = path.iter().zip(&base).take_while(|(a, b)| a == b).count();
    let up = &base[shared..];
    if up.iter().any(|c| *c == Component::ParentDir) {
        return None;
    }
    let mut rel: PathBuf = up.iter().map(|_| Component::ParentDir).collect();
    rel.extend(&path[shared..]);
    Some(rel)
}

const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn encode_path(path: &Path) -> String {
    path.components()
        .map(|c| match c {
            Component::RootDir => String::new(),
            other => utf8_percent_encode(&other.as_os_str().to_string_lossy(), SEGMENT).to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

const SECTIONS: [(CropStatus, &str); 4] = [
    (CropStatus::Cropped, "Cropped"),
    (CropStatus::Skipped, "Skipped"),
    (CropStatus::Failed, "Failed"),
    (CropStatus::Pending, "Pending"),
];

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Writes both renderings into `dir`, replacing earlier reports atomically.
pub fn write_report(report: &Report, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let text_path = dir.join(TEXT_REPORT_NAME);
    let html_path = dir.join(HTML_REPORT_NAME);
    write_atomic(&text_path, |w| w.write_all(report.plain_text.as_bytes()))?;
    write_atomic(&html_path, |w| w.write_all(report.html.as_bytes()))?;
    info!(text = %text_path.display(), html = %html_path.display(), "report written");
    Ok((text_path, html_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(entry: CheckpointEntry) -> CheckpointEntry {
        CheckpointEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            ..entry
        }
    }

    fn snapshot() -> Vec<(String, CheckpointEntry)> {
        vec![
            ("b.csv".into(), at(CheckpointEntry::cropped(CropRequest::new(100, 500), PathBuf::from("/out/b_x100_500.csv")))),
            ("a.csv".into(), at(CheckpointEntry::skipped())),
            ("d<x>.npy".into(), at(CheckpointEntry::failed(Some(CropRequest::new(0, 900)), "end exceeds row count"))),
        ]
    }

    #[test]
    fn text_lists_outcomes_by_status() {
        let report = ReportGenerator::default().generate(&snapshot());
        let text = &report.plain_text;
        assert!(text.starts_with("Cropping report\n===============\n"));
        assert!(text.contains("cropped: 1  skipped: 1  failed: 1  pending: 0"));
        assert!(text.contains("b.csv  [100, 500)  -> /out/b_x100_500.csv  (2024-05-01T12:00:00Z)"));
        assert!(text.contains("a.csv  (2024-05-01T12:00:00Z)"));
        assert!(text.contains("d<x>.npy  end exceeds row count"));
        assert!(!text.contains("Pending\n"));
        assert!(text.find("Cropped\n").unwrap() < text.find("Failed\n").unwrap());
    }

    #[test]
    fn html_escapes_and_links() {
        let report = ReportGenerator::new("Run <1>")
            .with_link_base("/out")
            .generate(&snapshot());
        let html = &report.html;
        assert!(html.contains("<title>Run &lt;1&gt;</title>"));
        assert!(html.contains("<a href=\"b_x100_500.csv\">/out/b_x100_500.csv</a>"));
        assert!(html.contains("<td>d&lt;x&gt;.npy</td>"));
        assert!(html.contains("<td>end exceeds row count</td>"));
        assert!(!html.contains("d<x>"));
    }

    #[test]
    fn links_climb_out_of_a_separate_report_folder() {
        let report = ReportGenerator::default()
            .with_link_base("/reports")
            .generate(&snapshot());
        assert!(report.html.contains("href=\"../out/b_x100_500.csv\""));

        let report = ReportGenerator::default()
            .with_link_base("reports")
            .generate(&snapshot());
        assert!(report.html.contains("href=\"file:///out/b_x100_500.csv\""));
    }

    #[test]
    fn relative_recorded_paths_link_from_the_report_folder() {
        let out = PathBuf::from("./cropped/sub/b_x1_2.csv");
        assert_eq!(relative_to(&out, Path::new("cropped")), Some(PathBuf::from("sub/b_x1_2.csv")));
        assert_eq!(relative_to(&out, Path::new("./reports")), Some(PathBuf::from("../cropped/sub/b_x1_2.csv")));
        assert_eq!(relative_to(&out, Path::new("../elsewhere")), None);
    }

    #[test]
    fn link_targets_are_percent_encoded() {
        let snapshot = vec![(
            "s#1 a.csv".to_string(),
            at(CheckpointEntry::cropped(CropRequest::new(0, 2), PathBuf::from("/out/s#1 a_x0_2.csv"))),
        )];
        let report = ReportGenerator::default().with_link_base("/out").generate(&snapshot);
        assert!(report.html.contains("<a href=\"s%231%20a_x0_2.csv\">/out/s#1 a_x0_2.csv</a>"));
    }

    #[test]
    fn generation_is_deterministic() {
        let generator = ReportGenerator::default();
        let mut reversed = snapshot();
        reversed.reverse();
        assert_eq!(generator.generate(&snapshot()), generator.generate(&snapshot()));
        assert_eq!(generator.generate(&snapshot()), generator.generate(&reversed));
    }

    #[test]
    fn empty_snapshot() {
        let report = ReportGenerator::default().generate(&[]);
        assert!(report.plain_text.contains("cropped: 0  skipped: 0  failed: 0  pending: 0"));
        assert!(report.html.ends_with("</table>\n</body>\n</html>\n"));
    }

    #[test]
    fn writes_both_files() {
        let dir = TempDir::new().unwrap();
        let report = ReportGenerator::default().generate(&snapshot());
        let (text, html) = write_report(&report, &dir.path().join("reports")).unwrap();
        assert_eq!(text.file_name().unwrap(), TEXT_REPORT_NAME);
        assert_eq!(std::fs::read_to_string(text).unwrap(), report.plain_text);
        assert_eq!(std::fs::read_to_string(html).unwrap(), report.html);
    }
}
