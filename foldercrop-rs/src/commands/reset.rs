use clap::Args;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;

use foldercrop::CheckpointStore;

#[derive(Args, Clone)]
pub struct ResetArgs {
    /// Checkpoint file to edit
    #[arg(long, default_value = "./checkpoint.json")]
    pub checkpoint: PathBuf,

    /// File identity to forget (as listed in the report); repeatable
    #[arg(long = "file")]
    pub files: Vec<String>,

    /// Forget every failed file
    #[arg(long, conflicts_with = "files")]
    pub failed: bool,

    /// Skip confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

pub fn run(args: ResetArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = CheckpointStore::load(&args.checkpoint)?;

    let what = if !args.files.is_empty() {
        format!("{} listed file(s)", args.files.len())
    } else if args.failed {
        "all failed files".to_string()
    } else {
        format!("all {} entries", store.len())
    };
    eprintln!("Checkpoint: {}", args.checkpoint.display());
    eprintln!("Forgetting {what}");

    if !args.yes {
        eprint!("Proceed with reset? [y/N]: ");
        io::stderr().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        if !line.trim().eq_ignore_ascii_case("y") && !line.trim().eq_ignore_ascii_case("yes") {
            return Err("Aborted".into());
        }
    }

    let removed = if !args.files.is_empty() {
        store.reset(&args.files)?
    } else if args.failed {
        store.reset_failed()?
    } else {
        store.clear()?
    };
    info!(removed, remaining = store.len(), "checkpoint reset");
    Ok(())
}
