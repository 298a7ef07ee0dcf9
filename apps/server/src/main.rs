#![deny(warnings)]

//! LifeQuest account server.

use anyhow::Result;
use backend::config::ServerConfig;
use backend::AppState;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lifequest-server", version, about = "LifeQuest account and cloud save server")]
struct Args {
    /// TOML config file; missing means defaults.
    #[arg(long, default_value = "server.toml")]
    config: PathBuf,
    /// Overrides `bind_addr` from the config.
    #[arg(long)]
    bind: Option<String>,
}

/// Make sure the directory of a file-backed database exists.
fn ensure_db_dir(url: &str) -> Result<()> {
    if url.contains(":memory:") {
        return Ok(());
    }
    let path = url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let mut cfg = ServerConfig::load_from(&args.config);
    if let Some(bind) = args.bind {
        cfg.bind_addr = bind;
    }
    ensure_db_dir(&cfg.database_url)?;
    info!(bind = %cfg.bind_addr, db = %cfg.database_url, "starting server");

    let state = AppState::connect(cfg).await?;
    let purged = persistence::db::purge_expired_sessions(&state.pool).await?;
    if purged > 0 {
        info!(purged, "removed expired sessions");
    }
    backend::run(state).await
}
