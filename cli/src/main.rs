//! modelsmith CLI - binary entry point.
//!
//! ```text
//! main() -> ModelsmithConfig::load() -> SessionStore over TcpTransport
//!             |
//!             +-- check <file>     submit, wait for diagnostics, report
//!             +-- generate <file>  check, then generate and wait for the outcome
//! ```
//!
//! Logs go to `~/.modelsmith/logs/modelsmith.log` (or `--log-file`); stdout
//! carries only the report so it can be piped.

mod logging;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

use modelsmith_config::ModelsmithConfig;
use modelsmith_session::{SessionStore, TcpTransport};

#[derive(Parser)]
#[command(name = "modelsmith")]
#[command(about = "Validate a model and generate instances with a remote engine")]
struct Cli {
    /// Engine host (overrides config and MODELSMITH_ENGINE_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Engine port (overrides config and MODELSMITH_ENGINE_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Write logs here instead of ~/.modelsmith/logs/modelsmith.log
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a model and print its diagnostics
    Check {
        file: PathBuf,

        /// Seconds to wait for the engine's diagnostics
        #[arg(long, default_value_t = 30)]
        wait_secs: u64,
    },
    /// Check a model, then generate from it
    Generate {
        file: PathBuf,

        #[arg(long, default_value_t = 30)]
        wait_secs: u64,
    },
}

fn load_config() -> ModelsmithConfig {
    match ModelsmithConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            let e = anyhow::Error::new(e);
            eprintln!("Warning: {e:#}; using defaults");
            ModelsmithConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_file);

    let mut settings = load_config().resolve();
    if let Some(host) = cli.host {
        settings.host = host;
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }

    let transport = TcpTransport::new(settings.host, settings.port);
    tracing::info!(engine = %transport.address(), "Starting session");
    let mut store = SessionStore::new(Arc::new(transport), settings.session);

    let result = match cli.command {
        Commands::Check { file, wait_secs } => {
            run::check(&mut store, &file, Duration::from_secs(wait_secs)).await
        }
        Commands::Generate { file, wait_secs } => {
            run::generate(&mut store, &file, Duration::from_secs(wait_secs)).await
        }
    };

    store.close();
    result
}
