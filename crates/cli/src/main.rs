use crate::{
    commands::{Commands, ExportCommand, ImportCommand},
    error::CliError,
    shutdown::{ExitCode, TickGate},
};
use clap::Parser;
use engine_config::settings::{Settings, env::EnvVars};
use engine_core::{split::ArchiveSplitter, state::models::SessionKind};
use engine_runtime::{
    context::RuntimeContext,
    controller::{ExportController, ImportController, TickHandler},
    protocol::{TickRequest, TickResponse},
};
use model::options::{ExportOptions, ImportOptions};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;
mod shutdown;

const DEFAULT_ENV_FILE: &str = ".env";

#[derive(Parser)]
#[command(name = "relocate", version, about = "Resumable site export and import")]
struct Cli {
    #[arg(long, global = true, help = "Settings file (defaults to ./relocate.toml when present)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Extra KEY=VALUE file applied over the environment")]
    env_file: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Log at debug level unless RUST_LOG is set")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli).await {
        Ok(()) => ExitCode::Success,
        Err(CliError::ShutdownRequested) => {
            info!("Stopped on request; the session can be resumed with another tick");
            ExitCode::Interrupted
        }
        Err(e) => {
            error!("{e}");
            ExitCode::Failed
        }
    };
    std::process::exit(code.as_i32());
}

/// Logs go to stderr so `serve-tick` keeps stdout for its JSON response.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(config: Option<&Path>, env_file: Option<&Path>) -> Result<Settings, CliError> {
    let mut env = EnvVars::from_process();
    match env_file {
        Some(path) => env.load_file(path)?,
        None if Path::new(DEFAULT_ENV_FILE).is_file() => env.load_file(Path::new(DEFAULT_ENV_FILE))?,
        None => {}
    }
    Ok(Settings::load(config, &env)?)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let settings = load_settings(cli.config.as_deref(), cli.env_file.as_deref())?;

    match cli.command {
        Commands::Split { file, size_mb } => {
            let splitter = ArchiveSplitter::new(settings.archive.split_io_chunk());
            let parts = splitter.split(&file, size_mb.saturating_mul(1024 * 1024))?;
            for part in parts {
                println!("{}", part.display());
            }
        }
        Commands::Combine { parts, output } => {
            let splitter = ArchiveSplitter::new(settings.archive.split_io_chunk());
            let bytes = splitter.combine(&parts, &output)?;
            println!("{} ({bytes} bytes)", output.display());
        }
        Commands::Verify { parts } => {
            let splitter = ArchiveSplitter::new(settings.archive.split_io_chunk());
            if !splitter.verify(&parts) {
                return Err(CliError::VerificationFailed);
            }
            println!("All {} parts verified", parts.len());
        }
        Commands::Status { kind, json } => {
            let ctx = RuntimeContext::connect(settings).await?;
            let response = match SessionKind::from(kind) {
                SessionKind::Export => ExportController::new(ctx).status().await?,
                SessionKind::Import => ImportController::new(ctx).status().await?,
            };
            if json {
                output::print_json(&response.status)?;
            } else {
                output::print_status(&response.status);
            }
        }
        Commands::Export { command } => {
            let mut controller = ExportController::new(RuntimeContext::connect(settings).await?);
            match command {
                ExportCommand::Start { options } => {
                    let options: ExportOptions = match options {
                        Some(json) => serde_json::from_str(&json)?,
                        None => ExportOptions::default(),
                    };
                    let response = controller.start(options).await?;
                    print_started(&response);
                }
                ExportCommand::Tick { token } => {
                    let response = controller.tick(token.as_deref()).await?;
                    output::print_tick(&response);
                }
                ExportCommand::Run { delay_ms } => {
                    run_to_end(&mut controller, Duration::from_millis(delay_ms)).await?;
                }
            }
        }
        Commands::Import { command } => {
            let mut controller = ImportController::new(RuntimeContext::connect(settings).await?);
            match command {
                ImportCommand::Start {
                    archive,
                    skip_backup,
                    site_url,
                } => {
                    let options = ImportOptions {
                        archive,
                        skip_backup,
                        site_url,
                    };
                    let response = controller.start(options).await?;
                    print_started(&response);
                }
                ImportCommand::Tick { token } => {
                    let response = controller.tick(token.as_deref()).await?;
                    output::print_tick(&response);
                }
                ImportCommand::Run { delay_ms } => {
                    run_to_end(&mut controller, Duration::from_millis(delay_ms)).await?;
                }
            }
        }
        Commands::ServeTick => {
            let mut input = String::new();
            tokio::io::stdin().read_to_string(&mut input).await?;
            let request: TickRequest = serde_json::from_str(&input)?;

            let ctx = RuntimeContext::connect(settings).await?;
            let response = match request.kind {
                SessionKind::Export => ExportController::new(ctx).handle(request).await,
                SessionKind::Import => ImportController::new(ctx).handle(request).await,
            };
            output::print_json(&response)?;
        }
    }

    Ok(())
}

fn print_started(response: &TickResponse) {
    let token = response.status.session_token.as_deref().unwrap_or("-");
    let run_id = response.status.run_id.as_deref().unwrap_or("-");
    println!("Session {token} started (run {run_id})");
}

/// Ticks until the session is terminal. A shutdown signal is honoured
/// between ticks only.
async fn run_to_end(handler: &mut dyn TickHandler, delay: Duration) -> Result<(), CliError> {
    let gate = TickGate::listen();
    let kind = handler.kind();

    loop {
        if gate.stop_requested() {
            return Err(CliError::ShutdownRequested);
        }
        let response = handler.handle(TickRequest::advance(kind, None)).await;
        output::print_tick(&response);

        if response.status.is_terminal() {
            if response.success {
                return Ok(());
            }
            return Err(CliError::SessionFailed {
                kind: kind.as_str().to_string(),
                message: response.message,
            });
        }
        if !response.success {
            return Err(CliError::TickRejected(response.message));
        }

        if !gate.pause(delay).await {
            return Err(CliError::ShutdownRequested);
        }
    }
}
