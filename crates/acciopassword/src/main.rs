//! `acciopassword`: password issuing service entry point.
//!
//! `acciopassword start` runs the server; `acciopassword stop` interrupts the
//! instance named by the configured PID file.
//!
//! Startup sequence:
//! 1. Parse the command line and load [`Config`] from the JSON file plus
//!    `ACCIOPASSWORD_*` environment overrides.
//! 2. Initialise the telemetry pipeline (tracing + optional OTLP).
//! 3. Open the [`CounterStore`] and spawn the increment [`Recorder`].
//! 4. Build the TLS server, claim the PID file, and serve until a signal.
//! 5. Flush pending increments, close the store, and flush telemetry.

mod config;
mod generator;
mod pidfile;
mod server;
mod store;
mod telemetry;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::{error, info, warn};

use config::Config;
use generator::StandardGenerator;
use pidfile::PidFile;
use server::{handlers::SERVICE_NAME, state::AppState, Server};
use store::{CounterStore, Recorder};

/// Time allowed for queued increments to reach the database at exit.
const RECORDER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Issue random passwords, diceware passphrases, and PINs over HTTPS.
#[derive(Debug, Parser)]
#[command(name = "acciopassword", about, disable_version_flag = true, arg_required_else_help = true)]
struct Cli {
    /// Print the version and exit.
    #[arg(short = 'v', long)]
    version: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the server and run until interrupted.
    Start(ConfigArg),
    /// Interrupt the server recorded in the configured PID file.
    Stop(ConfigArg),
}

#[derive(Debug, Args)]
struct ConfigArg {
    /// Path to the JSON configuration file.
    #[arg(short, long, env = "ACCIOPASSWORD_CONFIG", default_value = "config.json")]
    config: PathBuf,
}

fn version_line() -> String {
    format!("{}: {}", SERVICE_NAME, env!("CARGO_PKG_VERSION"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        _ if cli.version => {
            println!("{}", version_line());
            Ok(())
        }
        Some(Command::Start(args)) => start(&args.config).await,
        Some(Command::Stop(args)) => stop(&args.config),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

/// Load the configuration, writing failures to stderr since telemetry is not
/// yet up.
fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).map_err(|e| {
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })
}

async fn start(config: &Path) -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = load_config(config)?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.telemetry.otlp_endpoint.as_deref(), &cfg.telemetry.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %cfg.server.address,
        "acciopassword starting"
    );

    let result = run(cfg).await;
    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "acciopassword exited with an error");
    }
    telemetry::shutdown();
    result
}

#[cfg(unix)]
fn stop(config: &Path) -> Result<()> {
    let cfg = load_config(config)?;
    let pid = pidfile::stop(&cfg.server.pid).context("failed to stop the server")?;
    println!("Sent interrupt to acciopassword (pid {pid}).");
    Ok(())
}

#[cfg(not(unix))]
fn stop(_config: &Path) -> Result<()> {
    anyhow::bail!("stop is only supported on Unix; terminate the server process directly")
}

async fn run(cfg: Config) -> Result<()> {
    // -----------------------------------------------------------------------
    // 3. Counter store
    // -----------------------------------------------------------------------
    let store = CounterStore::open(&cfg.database.dsn)
        .await
        .context("failed to open the counter store")?;
    let (recorder, recorder_task) = Recorder::spawn(store.clone());

    // -----------------------------------------------------------------------
    // 4. HTTPS server
    // -----------------------------------------------------------------------
    let state = AppState::new(store.clone(), recorder, Arc::new(StandardGenerator::new()));
    let server = Server::from_config(&cfg, state).context("failed to build the server")?;
    let pid = PidFile::create(&cfg.server.pid)?;

    let served = server.start().await;

    // -----------------------------------------------------------------------
    // 5. Teardown
    // -----------------------------------------------------------------------
    match recorder_task.finish(RECORDER_FLUSH_TIMEOUT).await {
        Some(written) => info!(written, "increment queue flushed"),
        None => warn!("increment queue was not fully flushed"),
    }
    if let Err(e) = store.close().await {
        error!(error = %e, "failed to close the counter store");
    }
    drop(pid);

    served.context("server failed")?;
    info!("acciopassword stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn start_and_stop_take_a_config_path() {
        let cli = Cli::try_parse_from(["acciopassword", "start", "-c", "/etc/ap.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Start(ConfigArg { ref config })) if config == Path::new("/etc/ap.json")
        ));

        let cli = Cli::try_parse_from(["acciopassword", "stop", "--config", "other.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Stop(ConfigArg { ref config })) if config == Path::new("other.json")
        ));
    }

    #[test]
    fn version_flag_needs_no_subcommand() {
        let cli = Cli::try_parse_from(["acciopassword", "--version"]).unwrap();
        assert!(cli.version);
        assert!(cli.command.is_none());
        assert_eq!(
            version_line(),
            format!("Accio Password: {}", env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["acciopassword", "restart"]).is_err());
    }
}
