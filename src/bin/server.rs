//! Hindsight server - HTTP API for the personal knowledge base
//!
//! Usage:
//!   hindsight-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Path to configuration file (json/toml/yaml)
//!   --host <HOST>     Bind host (overrides config)
//!   --port <PORT>     Bind port (overrides config)
//!
//! Environment variables (DATABASE_URL, OPENAI_API_KEY, GOOGLE_API_KEY,
//! UPLOAD_DIR, DEBUG) override file values.

use std::path::PathBuf;

use hindsight::api::{create_router, AppState};
use hindsight::config::AppConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct CliArgs {
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
}

fn parse_args() -> CliArgs {
    let mut cli = CliArgs::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                if let Some(path) = args.next() {
                    cli.config_path = Some(PathBuf::from(path));
                }
            }
            "--host" => {
                cli.host = args.next();
            }
            "--port" => {
                cli.port = args.next().and_then(|p| p.parse().ok());
            }
            "--help" | "-h" => {
                println!(
                    "hindsight-server\n\n\
                     Options:\n\
                     \x20 --config <PATH>   Path to configuration file\n\
                     \x20 --host <HOST>     Bind host\n\
                     \x20 --port <PORT>     Bind port"
                );
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(2);
            }
        }
    }

    cli
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = parse_args();

    let mut config = match &cli.config_path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env(),
    };
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;

    // `debug` turns on SQL statement echo via the sqlx tracing target.
    let default_filter = if config.debug {
        "info,hindsight=debug,sqlx=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!(version = hindsight::VERSION, "Starting hindsight server");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config).await?;
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("API docs at http://{}/swagger-ui", addr);

    axum::serve(listener, router).await?;
    Ok(())
}
