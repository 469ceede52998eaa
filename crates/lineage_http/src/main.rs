//! Lineage server entry point.
//!
//! # Responsibility
//! - Resolve configuration from file, flags and environment.
//! - Initialize logging and migrate the member store before serving.
//! - Serve the read API until Ctrl-C.

use anyhow::Context;
use clap::Parser;
use lineage_core::db::open_db;
use lineage_core::{core_version, init_logging};
use lineage_http::{create_router, ConfigOverrides, ServerConfig};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "lineage_server")]
#[command(about = "Serves the spiritual lineage tree and leaderboard API")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "LINEAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (ip:port)
    #[arg(long, env = "LINEAGE_BIND_ADDR")]
    bind_addr: Option<String>,

    /// SQLite member store
    #[arg(long, env = "LINEAGE_DB_PATH")]
    db_path: Option<PathBuf>,

    #[arg(long, env = "LINEAGE_LOG_LEVEL")]
    log_level: Option<String>,

    #[arg(long, env = "LINEAGE_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::load(cli.config.as_deref())?;
    config.apply_overrides(ConfigOverrides {
        bind_addr: cli.bind_addr,
        db_path: cli.db_path,
        log_level: cli.log_level,
        log_dir: cli.log_dir,
    });
    config.validate()?;

    let log_dir = config.absolute_log_dir()?;
    if let Err(err) = init_logging("lineage_server", &config.log_level, &log_dir) {
        eprintln!("logging disabled: {err}");
    }

    // Migrations run once here so request workers only open.
    open_db(&config.db_path)
        .with_context(|| format!("failed to open member store {}", config.db_path.display()))?;

    let addr = config.socket_addr()?;
    let app = create_router(Arc::new(config.api_settings()));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        "event=server_start module=main status=ok version={} bind_addr={addr} db_path={}",
        core_version(),
        config.db_path.display()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("event=server_stop module=main status=ok");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("event=shutdown_signal module=main status=error error={err}");
    }
}
