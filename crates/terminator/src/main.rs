//! `pipeline-terminator`: stop a Tekton `PipelineRun` cooperatively.
//!
//! Exit code 0 when the run was cancelled or another terminator already owns
//! it, 1 for every failure (including unparsable flags).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use terminator::config::{
    DEFAULT_CANCEL_STATUS, DEFAULT_MONITOR_INTERVAL_SECS, DEFAULT_MONITOR_TIMEOUT_SECS,
};
use terminator::{
    KubeRunController, MonitorSettings, Outcome, TerminationMode, Terminator, TerminatorConfig,
    TokioClock, DEFAULT_SIGNAL_ROOT,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pipeline-terminator")]
#[command(about = "Signal job activities, wait for them, then cancel a Tekton PipelineRun")]
#[command(version)]
struct Cli {
    /// Namespace of the PipelineRun
    #[arg(long, env = "TERMINATOR_NAMESPACE")]
    namespace: String,

    /// Name of the PipelineRun
    #[arg(long, env = "TERMINATOR_NAME")]
    name: String,

    /// Send a stop request to running job activities
    #[arg(
        long,
        env = "TERMINATOR_SEND_STOP",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    send_stop: bool,

    /// Wait for running job activities to finish before cancelling
    #[arg(
        long,
        env = "TERMINATOR_WAIT",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    wait: bool,

    /// Seconds between two scans of the activities directory
    #[arg(long, env = "TERMINATOR_MONITOR_INTERVAL", default_value_t = DEFAULT_MONITOR_INTERVAL_SECS)]
    monitor_interval: u64,

    /// Seconds to wait for a first job activity before cancelling anyway
    #[arg(long, env = "TERMINATOR_MONITOR_TIMEOUT", default_value_t = DEFAULT_MONITOR_TIMEOUT_SECS)]
    monitor_timeout: u64,

    /// Mount point of the shared signal volume
    #[arg(long, env = "TERMINATOR_SIGNAL_ROOT", default_value = DEFAULT_SIGNAL_ROOT)]
    signal_root: PathBuf,

    /// Value written to spec.status to cancel the run
    #[arg(long, env = "TERMINATOR_CANCEL_STATUS", default_value = DEFAULT_CANCEL_STATUS)]
    cancel_status: String,

    /// Log output format
    #[arg(long, env = "TERMINATOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Cli {
    fn to_config(&self) -> TerminatorConfig {
        TerminatorConfig {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            mode: TerminationMode::from_flags(self.send_stop, self.wait),
            monitor: MonitorSettings::from_secs(self.monitor_interval, self.monitor_timeout),
            signal_root: self.signal_root.clone(),
            cancel_status: self.cancel_status.clone(),
        }
    }
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

/// Directives used when `RUST_LOG` is unset. Other crates (kube, hyper) only
/// get through at warn.
fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("terminator=debug,pipeline_terminator=debug,warn")
    } else {
        EnvFilter::new("terminator=info,pipeline_terminator=info,warn")
    }
}

async fn run(cli: &Cli) -> Result<Outcome> {
    let config = cli.to_config();
    // Fail on bad flags before building a kube client; `Terminator::run` checks again.
    config.validate()?;

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let controller = KubeRunController::new(client, config.cancel_status.clone());

    let terminator = Terminator::new(config, controller, TokioClock);
    Ok(terminator.run().await?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and are not failures.
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            e.print().ok();
            return code;
        }
    };

    init_tracing(cli.verbose, cli.log_format);

    match run(&cli).await {
        Ok(Outcome::CancelledImmediately) => {
            info!(namespace = %cli.namespace, name = %cli.name, "PipelineRun cancelled immediately");
            ExitCode::SUCCESS
        }
        Ok(Outcome::AlreadyRunning { path }) => {
            info!(path = %path.display(), "Another terminator is handling this PipelineRun, exiting");
            ExitCode::SUCCESS
        }
        Ok(Outcome::Cancelled { mode, exit }) => {
            info!(
                namespace = %cli.namespace,
                name = %cli.name,
                mode = %mode,
                exit = ?exit,
                "PipelineRun terminated"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "Termination failed");
            ExitCode::FAILURE
        }
    }
}
