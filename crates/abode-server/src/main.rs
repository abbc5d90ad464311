//! Abode Server Binary
//!
//! Loads the runtime configuration and serves the agent API.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use abode_server::startup::{StartupConfig, DEFAULT_ADDR, DEFAULT_REQUEST_TIMEOUT_SECS};
use abode_server::{serve, AppState};

#[derive(Debug, Parser)]
#[command(name = "abode-server", version, about = "Multi-agent orchestration server")]
struct Args {
    /// Runtime configuration file (TOML)
    #[arg(long, env = "ABODE_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "ABODE_ADDR", default_value = DEFAULT_ADDR)]
    addr: String,

    /// Per-request timeout in seconds
    #[arg(
        long,
        env = "ABODE_REQUEST_TIMEOUT_SECS",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout_secs: u64,

    /// Extra PEM bundle trusted by outbound HTTP clients
    #[arg(long, env = "ABODE_CA_BUNDLE")]
    ca_bundle: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,abode_server=debug")),
        )
        .init();

    let args = Args::parse();
    let startup = StartupConfig::from_env()
        .with_addr(args.addr)
        .with_config_path(args.config)
        .with_request_timeout(Duration::from_secs(args.timeout_secs))
        .with_ca_bundle(args.ca_bundle);

    let runtime = match startup.load_runtime() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to load runtime: {}", e);
            eprintln!("abode-server: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.check {
        println!(
            "configuration ok: {} tools, {} agents, {} workflows",
            runtime.tools().count(),
            runtime.agents().count(),
            runtime.workflows().count()
        );
        return ExitCode::SUCCESS;
    }

    let state = Arc::new(AppState::from_startup(runtime, &startup));
    match serve(&startup.addr, state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Server failed: {}", e);
            eprintln!("abode-server: {}", e);
            ExitCode::FAILURE
        }
    }
}
