mod config;
mod db;
mod frame;
mod routes;
mod services;
mod state;

use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is normal outside local development.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = config::ServerConfig::from_env()?;
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;

    let frame_tx = services::persistence::spawn_frame_persistence_worker(pool.clone());
    let state = state::AppState::new(pool, config.sync, Some(frame_tx));

    // Background tasks: debounced object flush and lock/cursor expiry.
    let _persistence = services::persistence::spawn_persistence_task(state.clone(), config.object_flush_interval_ms);
    let _sweeper = services::sweeper::spawn_sweeper(state.clone(), config.sweep_interval_ms);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;

    info!(port = config.port, "collaboard listening");
    if let Err(e) = axum::serve(listener, app).await {
        warn!(error = %e, "server stopped");
        return Err(e.into());
    }
    Ok(())
}
