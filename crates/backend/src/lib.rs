//! LifeQuest account backend: auth, cloud saves, leaderboard, achievements
//! and a WebSocket chat relay, served with axum over SQLite.
#![deny(warnings)]

pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod routes;

use axum::Router;
use chat::ChatHub;
use config::ServerConfig;
use persistence::db;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use error::ApiError;

/// Shared across handlers.
pub struct AppState {
    pub pool: SqlitePool,
    pub chat: ChatHub,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: ServerConfig) -> Self {
        Self {
            pool,
            chat: ChatHub::default(),
            config,
        }
    }

    /// Open and migrate the configured database.
    pub async fn connect(config: ServerConfig) -> anyhow::Result<Self> {
        let pool = db::init_db(&config.database_url).await?;
        Ok(Self::new(pool, config))
    }
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::auth_routes())
        .merge(routes::player_routes())
        .merge(routes::leaderboard_routes())
        .merge(routes::achievement_routes())
        .merge(chat::chat_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until Ctrl-C.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.bind_addr.clone();
    let app = router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutting down");
        })
        .await?;
    Ok(())
}
