mod config;
mod dispatch;
mod kill;
mod lookup;
mod spawn;
mod tool;

use clap::Parser;
use config::{ProgressConfig, DEFAULT_CONFIG_FILE};
use dispatch::{dispatch, Action, ActionArgs, DispatchError};
use std::path::PathBuf;
use std::process::ExitCode;
use tool::{DryRunRunner, ProcessRunner};
use tracing_subscriber::EnvFilter;

/// Check, spawn, and kill subagents managed by the openclaw CLI, scheduling
/// a one-shot check-in cron after each spawn.
#[derive(Parser, Debug)]
#[command(name = "check-progress", version, about)]
pub struct Cli {
    /// Subagent label to check/spawn/kill (substring match for status and kill)
    #[arg(long)]
    label: Option<String>,

    /// What to do with the subagent
    #[arg(long, value_enum, default_value_t = Action::Status)]
    action: Action,

    /// Task description for spawn
    #[arg(long)]
    task: Option<String>,

    /// Model passed to spawn (default: from config)
    #[arg(long)]
    model: Option<String>,

    /// Timeout in seconds passed to spawn (default: from config)
    #[arg(long)]
    timeout: Option<u64>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fail on tool errors instead of treating them as "not found"
    #[arg(long)]
    strict: bool,

    /// Print the tool commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<ProgressConfig, config::ConfigError> {
    match &cli.config {
        Some(path) => ProgressConfig::load(path, true),
        None => ProgressConfig::load(&PathBuf::from(DEFAULT_CONFIG_FILE), false),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!(?cli, "parsed CLI arguments");

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let args = ActionArgs {
        action: cli.action,
        label: cli.label,
        task: cli.task,
        model: cli.model.unwrap_or(config.spawn.model),
        timeout_secs: cli.timeout.unwrap_or(config.spawn.timeout_secs),
    };

    let mut stdout = std::io::stdout();
    let result = if cli.dry_run {
        let runner = DryRunRunner::new(&config.tool.command);
        dispatch(&args, &runner, &config.check, cli.strict, &mut stdout).await
    } else {
        let runner = ProcessRunner::new(&config.tool.command);
        dispatch(&args, &runner, &config.check, cli.strict, &mut stdout).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ DispatchError::Usage(_)) => {
            println!("{e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
