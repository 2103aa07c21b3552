//! CLI binary entrypoint.

mod commands;
mod error;
mod wiring;

use clap::{Parser, Subcommand};
use commands::{run_check, run_cleanup, run_clear, run_status, run_sync_command, run_reprocess};
use corpus_sync_config::load_config;
use corpus_sync_shared::RequestContext;
use error::{exit_code_for, CliError};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "corsync",
    version,
    about = "Incremental XML-dump to vector-store synchronization",
    long_about = None
)]
struct Cli {
    /// Configuration file path (TOML or JSON).
    #[arg(long, global = true, default_value = "corpus-sync.toml")]
    config: PathBuf,

    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one incremental sync.
    Run,
    /// Show tracking and vector-store statistics.
    Status {
        /// Also list tracked documents, optionally filtered by source.
        #[arg(long)]
        list: bool,
        /// Source tag filter for --list.
        #[arg(long)]
        source: Option<String>,
    },
    /// Show one document's tracked state.
    Check {
        /// Source tag of the document.
        #[arg(long)]
        source: String,
        /// Relative path of the document.
        #[arg(long)]
        path: String,
    },
    /// Reset one document to pending so the next run reprocesses it.
    Reprocess {
        /// Source tag of the document.
        #[arg(long)]
        source: String,
        /// Relative path of the document.
        #[arg(long)]
        path: String,
    },
    /// Clear all tracking state (forces full reprocessing).
    Clear {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Remove tracking entries and vectors for documents gone from the corpus.
    Cleanup,
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start runtime: {error}");
            return ExitCode::FAILURE;
        },
    };

    match runtime.block_on(dispatch(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::from(exit_code_for(&error))
        },
    }
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli.config).map_err(CliError::from)?;
    let ctx = RequestContext::new_run();
    spawn_ctrl_c_handler(&ctx);

    match cli.command {
        Commands::Run => run_sync_command(&ctx, &config, cli.json).await,
        Commands::Status { list, source } => {
            run_status(&ctx, &config, cli.json, list, source.as_deref()).await
        },
        Commands::Check { source, path } => {
            run_check(&ctx, &config, cli.json, &source, &path).await
        },
        Commands::Reprocess { source, path } => {
            run_reprocess(&ctx, &config, cli.json, &source, &path).await
        },
        Commands::Clear { yes } => run_clear(&ctx, &config, cli.json, yes).await,
        Commands::Cleanup => run_cleanup(&ctx, &config, cli.json).await,
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn spawn_ctrl_c_handler(ctx: &RequestContext) {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling the run");
            ctx.cancel();
        }
    });
}
