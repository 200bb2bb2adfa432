//! Patchpilot entrypoint.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod orchestrator;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "patchpilot", version, about = "Structural patcher for Python sources")]
struct Args {
    /// Project root override. Defaults to the current file's directory, then
    /// the working directory.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// The "currently open" file: default target for bare bundle symbols.
    #[arg(long, global = true)]
    file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a patch bundle.
    Apply {
        /// Execute the full pipeline without touching disk.
        #[arg(long)]
        dry_run: bool,
        /// Read the bundle from a file instead of stdin ("-" for stdin).
        #[arg(long)]
        bundle: Option<PathBuf>,
        /// Read the bundle from the system clipboard.
        #[arg(long, conflicts_with = "bundle")]
        clipboard: bool,
    },
    /// Restore every file a recorded run touched.
    Revert {
        /// Run stamp to revert; omit to pick interactively.
        stamp: Option<String>,
        /// Revert the newest run without asking.
        #[arg(long)]
        latest: bool,
    },
    /// List recorded runs, newest first.
    Runs,
    /// Print every resolvable target in a file.
    Targets { file: PathBuf },
}

fn configure_logging() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_env("PATCHPILOT_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if let Ok(path) = std::env::var("PATCHPILOT_LOG_FILE") {
        let path = PathBuf::from(path);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("patchpilot.log"));
        let appender = tracing_appender::rolling::never(dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        None
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging();
    info!(target: "runtime", "startup");

    match args.command {
        Command::Apply {
            dry_run,
            bundle,
            clipboard,
        } => orchestrator::run_apply(
            args.root.as_deref(),
            args.file.as_deref(),
            bundle.as_deref(),
            clipboard,
            dry_run,
        ),
        Command::Revert { stamp, latest } => {
            orchestrator::run_revert(args.root.as_deref(), args.file.as_deref(), stamp, latest)
        }
        Command::Runs => orchestrator::run_list(args.root.as_deref(), args.file.as_deref()),
        Command::Targets { file } => orchestrator::run_targets(&file),
    }
}
