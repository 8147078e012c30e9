//! Ache Sucatas miner.
//!
//! Batch pipeline: discover auction notices, extract and normalize them,
//! route VALID records to the primary table and everything else to
//! quarantine, with full run tracking.

mod discover;
mod env_config;
mod fetch;
mod notify;
mod pipeline;
mod tracker;

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sucatas_logging::{init_logging, LogConfig};
use sucatas_protocol::SourceName;
use tracing::{error, info};

/// Exit code for an interrupted run, mirroring shell convention for SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "sucatas", about = "Ache Sucatas auction-notice mining pipeline")]
struct Cli {
    /// Lookback window in days for the publication search
    #[arg(long, default_value_t = 1)]
    dias: u32,

    /// Pages fetched per search term
    #[arg(long, default_value_t = 3)]
    paginas: u32,

    /// Page size for the publication search
    #[arg(long, default_value_t = 20)]
    tamanho: u32,

    /// Stop after this many candidates (across all sources)
    #[arg(long)]
    run_limit: Option<usize>,

    /// FULL mode: reprocess candidates whose id already exists
    #[arg(long)]
    force: bool,

    /// Restrict the run to one source (pncp | leiloeiro)
    #[arg(long)]
    source: Option<String>,

    /// Verbose console logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "sucatas",
        verbose: cli.verbose,
    }) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("failed to initialize logging: {err:?}");
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            error!(%err, "tokio runtime build failed");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(err) => {
            // Expected failures already printed their one-liner; this is
            // the unexpected path.
            error!(?err, "fatal error");
            eprintln!("fatal: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let source = match cli.source.as_deref() {
        Some(raw) => Some(
            SourceName::from_str(raw).map_err(|err| anyhow::anyhow!(err))?,
        ),
        None => None,
    };

    let config = env_config::build_config(env_config::CliOverrides {
        dias: cli.dias,
        paginas: cli.paginas,
        tamanho: cli.tamanho,
        run_limit: cli.run_limit,
        force: cli.force,
        source,
    })?;

    // One cancellation signal: stop draining candidates, let workers
    // finish their current one, close the tracker as FAILED/interrupted.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, draining workers");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    match pipeline::run_pipeline(config.clone(), shutdown.clone()).await {
        Ok(outcome) => {
            println!("{}", outcome.summary.line());
            if let Some(reason) = outcome.fatal_reason {
                eprintln!("run {} failed: {}", outcome.summary.run_id, reason);
                if reason == "interrupted" {
                    return Ok(ExitCode::from(EXIT_INTERRUPTED));
                }
                notify::send_fatal_alert(&config, &outcome.summary.run_id, &reason).await;
                return Ok(ExitCode::from(1));
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            // Fatal before or during setup: nothing was routed
            eprintln!("fatal: {err:#}");
            notify::send_fatal_alert(&config, "(no run id)", &format!("{err:#}")).await;
            Ok(ExitCode::from(1))
        }
    }
}
