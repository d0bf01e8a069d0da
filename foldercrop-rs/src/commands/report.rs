use clap::Args;
use std::path::PathBuf;
use tracing::warn;

use foldercrop::report::write_report;
use foldercrop::{CheckpointStore, ReportGenerator};

#[derive(Args, Clone)]
pub struct ReportArgs {
    /// Checkpoint file to report on
    #[arg(long, default_value = "./checkpoint.json")]
    pub checkpoint: PathBuf,

    /// Folder receiving cropping_report.txt / .html
    #[arg(long, default_value = "./cropped")]
    pub output: PathBuf,

    /// Base that output links in the HTML report are made relative to (default: --output)
    #[arg(long)]
    pub link_base: Option<PathBuf>,

    /// Report title
    #[arg(long, default_value = "Cropping report")]
    pub title: String,

    /// Also print the plain-text report to stdout
    #[arg(long)]
    pub print: bool,
}

pub fn run(args: ReportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = CheckpointStore::load(&args.checkpoint)?;
    if store.is_empty() {
        warn!(checkpoint = %args.checkpoint.display(), "checkpoint has no entries");
    }

    let link_base = args.link_base.as_ref().unwrap_or(&args.output);
    let report = ReportGenerator::new(args.title.as_str())
        .with_link_base(link_base)
        .generate(&store.all());
    write_report(&report, &args.output)?;

    if args.print {
        print!("{}", report.plain_text);
    }
    Ok(())
}
