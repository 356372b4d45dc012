#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # cloudvar
//!
//! A WebSocket server implementing a small pub/sub "cloud variable"
//! protocol: clients join a named room and collaboratively read and write a
//! bounded set of named variables whose latest values are broadcast to other
//! participants in the same room.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use clap::Parser;
use tokio::net::{TcpListener, UnixListener};
use tracing::info;

use cloudvar::config::Config;
use cloudvar::room::RoomRegistry;
use cloudvar::state::AppState;

/// A WebSocket server implementing the cloud-variable protocol.
#[derive(Parser)]
#[command(name = "cloudvar", version)]
struct Cli {
    /// TCP port to listen on. Ignored if `--unix-socket` is set.
    #[arg(short, long, default_value_t = 9082)]
    port: u16,

    /// UNIX domain socket path. Overrides `--port` when set.
    #[arg(short, long)]
    unix_socket: Option<String>,

    /// Directory of static files served under `/`.
    #[arg(short, long, default_value = "./playground")]
    web_root: String,

    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref());

    config.server.listen = format!("0.0.0.0:{}", cli.port);
    config.server.web_root = cli.web_root;
    if cli.unix_socket.is_some() {
        config.server.unix_socket = cli.unix_socket;
    }

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("cloudvar v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Serving static files from {}", config.server.web_root);

    let room_registry = Arc::new(RoomRegistry::with_caps(
        config.server.max_rooms,
        config.server.max_room_variables,
        config.server.max_room_subscribers,
    ));
    let state = AppState {
        room_registry,
        start_time: Instant::now(),
        config: Arc::new(config),
    };

    let app = cloudvar::app::router(state.clone());

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    let exit_code = if let Some(path) = state.config.server.unix_socket.clone() {
        run_unix(&path, app, shutdown).await
    } else {
        run_tcp(&state.config.server.listen, app, shutdown).await
    };

    info!("Goodbye");
    std::process::exit(exit_code);
}

async fn run_tcp(listen: &str, app: Router, shutdown: impl std::future::Future<Output = ()>) -> i32 {
    let listener = match TcpListener::bind(listen).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {listen}: {e}");
            return 1;
        }
    };
    info!("Listening on {listen}");
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        tracing::error!("Server error: {e}");
        return 1;
    }
    0
}

async fn run_unix(path: &str, app: Router, shutdown: impl std::future::Future<Output = ()>) -> i32 {
    let _ = std::fs::remove_file(path);
    let listener = match UnixListener::bind(path) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind unix socket {path}: {e}");
            return 1;
        }
    };
    info!("Listening on unix:{path}");
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        tracing::error!("Server error: {e}");
        return 1;
    }
    0
}
