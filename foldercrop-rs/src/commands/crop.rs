use clap::Args;
use std::path::PathBuf;
use tracing::info;

use foldercrop::config::DEFAULT_MAX_POINTS;
use foldercrop::report::write_report;
use foldercrop::{
    BatchRunner, CropperConfig, DecisionSource, FailedPolicy, PlanDecisions, ReportGenerator,
    TerminalPrompt,
};

#[derive(Args, Clone)]
pub struct RunArgs {
    /// Folder containing the .csv / .npy files to crop
    #[arg(long)]
    pub input: PathBuf,

    /// Folder receiving the cropped files
    #[arg(long, default_value = "./cropped")]
    pub output: PathBuf,

    /// Checkpoint file recording per-file outcomes
    #[arg(long, default_value = "./checkpoint.json")]
    pub checkpoint: PathBuf,

    /// Refuse files with more samples than this
    #[arg(long, default_value_t = DEFAULT_MAX_POINTS)]
    pub max_points: usize,

    /// Label prefixed to output file names
    #[arg(long)]
    pub label: Option<String>,

    /// Offer files that failed in an earlier run again
    #[arg(long)]
    pub retry_failed: bool,

    /// Also crop files in sub-folders
    #[arg(long)]
    pub recursive: bool,

    /// Take decisions from a CSV plan (file,action,start,end) instead of prompting
    #[arg(long)]
    pub plan: Option<PathBuf>,

    /// Folder for cropping_report.txt / .html (default: the output folder)
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Do not write the report at the end of the run
    #[arg(long)]
    pub no_report: bool,
}

impl RunArgs {
    pub fn config(&self) -> CropperConfig {
        CropperConfig {
            output_folder: self.output.clone(),
            checkpoint_path: self.checkpoint.clone(),
            max_points: self.max_points,
            label: self.label.clone(),
            failed_policy: if self.retry_failed {
                FailedPolicy::Retry
            } else {
                FailedPolicy::Keep
            },
            recursive: self.recursive,
            ..CropperConfig::new(&self.input)
        }
    }
}

pub fn run(
    args: RunArgs,
    progress: impl Fn(f64, &str),
) -> Result<(), Box<dyn std::error::Error>> {
    let mut decisions: Box<dyn DecisionSource> = match &args.plan {
        Some(path) => {
            let plan = PlanDecisions::from_path(path)?;
            info!(plan = %path.display(), decisions = plan.len(), "replaying plan");
            Box::new(plan)
        }
        None => Box::new(TerminalPrompt::stdio()),
    };

    let mut runner = BatchRunner::new(args.config())?;
    let summary = runner.run(decisions.as_mut(), progress)?;
    eprintln!("{summary}");

    if !args.no_report {
        let dir = args.report_dir.as_ref().unwrap_or(&args.output);
        let report = ReportGenerator::default()
            .with_link_base(dir)
            .generate(&runner.store().all());
        write_report(&report, dir)?;
    }
    Ok(())
}
