//! Binary entrypoint for the cliplock server.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cliplock_server::background;
use cliplock_server::config::Config;
use cliplock_server::router::build_router;
use cliplock_server::state::AppState;

/// Clipboard lock coordination server for remote automation tools.
#[derive(Parser)]
#[command(name = "cliplock-server", version, about)]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Server port (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// Log level: debug, info, warn, error (overrides config).
    #[arg(long)]
    log_level: Option<String>,

    /// Log directory (overrides config).
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config: {err}");
            std::process::exit(1);
        }
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level;
    }
    if let Some(log_dir) = cli.log_dir {
        config.log_dir = log_dir;
    }
    if let Err(err) = config.validate() {
        eprintln!("invalid config: {err}");
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        port = config.port,
        log_level = %config.log_level,
        log_dir = %config.log_dir.display(),
        "config loaded"
    );

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(%err, "failed to initialize server state");
            std::process::exit(1);
        }
    };

    let tasks = background::spawn(&state);

    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%err, %addr, "failed to bind listener");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "starting HTTP server");

    let app = build_router(state.clone())
        .into_make_service_with_connect_info::<SocketAddr>();
    let shutdown = state.shutdown.clone();
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        })
        .await;

    if let Err(err) = serve_result {
        tracing::error!(%err, "server error");
    }

    // Stop the timer loops and the sink, then get the buffers to disk.
    shutdown.cancel();
    for task in tasks {
        let _ = task.await;
    }
    state.log_files.flush_all();
    tracing::info!("server exited");
}
