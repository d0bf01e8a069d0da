mod commands;

use clap::{Parser, Subcommand};
use chrono::Local;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::{crop, report, reset};

#[derive(Parser)]
#[command(name = "foldercrop", about = "foldercrop CLI: run, report, reset")]
struct Cli {
    /// Write progress as JSON lines on stderr instead of log lines
    #[arg(long, global = true)]
    json_progress: bool,

    /// Folder receiving a per-session foldercrop_YYYYmmdd_HHMMSS.log
    #[arg(long, global = true, default_value = "./logs")]
    log_dir: PathBuf,

    /// Log to stderr only
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crop the files of a folder, resuming from the checkpoint
    Run(crop::RunArgs),
    /// Render the cropping report from a checkpoint
    Report(report::ReportArgs),
    /// Forget checkpoint entries so their files are offered again
    Reset(reset::ResetArgs),
}

fn json_progress(prog: f64, msg: &str) {
    let _ = writeln!(
        io::stderr(),
        "{}",
        serde_json::json!({"progress": prog, "message": msg})
    );
    let _ = io::stderr().flush();
}

fn log_progress(prog: f64, msg: &str) {
    info!(progress = format_args!("{:.0}%", prog * 100.0), "{}", msg);
}

/// Non-blocking writer for this session's log file under `dir`.
fn session_log(dir: &Path) -> Result<(NonBlocking, WorkerGuard), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(format!("foldercrop_{}", Local::now().format("%Y%m%d_%H%M%S")))
        .filename_suffix("log")
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "foldercrop=info".into());

    let mut _log_guard: Option<WorkerGuard> = None;
    let file_layer = if cli.no_log_file {
        None
    } else {
        match session_log(&cli.log_dir) {
            Ok((writer, guard)) => {
                _log_guard = Some(guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
            }
            Err(err) => {
                eprintln!("Warning: cannot open a log file in {}: {err}", cli.log_dir.display());
                None
            }
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    let progress: fn(f64, &str) = if cli.json_progress {
        json_progress
    } else {
        log_progress
    };

    let result = match cli.command {
        Commands::Run(args) => crop::run(args, progress),
        Commands::Report(args) => report::run(args),
        Commands::Reset(args) => reset::run(args),
    };
    if let Err(e) = &result {
        error!(error = %e, "foldercrop failed");
    }
    result
}
