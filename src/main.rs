mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;
mod state;
mod store;
mod validation;

use config::Config;
use ntex::web;
use ntex_cors::Cors;
use state::AppState;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[ntex::main]
async fn main() -> std::io::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    let state = match AppState::from_config(&config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!(error = %e, "failed to initialise state");
            return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
        }
    };

    info!(
        host = %config.host,
        port = config.port,
        capacity = state.settings.capacity,
        season = state.settings.clock.current_season(chrono::Utc::now()),
        "Reflex board server starting"
    );

    web::HttpServer::new(move || {
        web::App::new()
            .state(state.clone())
            .wrap(
                Cors::new()
                    .allowed_origin("*")
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec!["Content-Type", "X-Admin-Key"])
                    .max_age(3600)
                    .finish(),
            )
            // Health check
            .route("/api/health", web::get().to(health))
            // Scores
            .route("/api/scores", web::post().to(handlers::leaderboard::submit_score))
            .route("/api/leaderboard", web::get().to(handlers::leaderboard::get_leaderboard))
            .route("/api/latest", web::get().to(handlers::leaderboard::get_latest))
            // Seasons
            .route("/api/season", web::get().to(handlers::season::get_season))
            .route("/api/archive/{season}", web::get().to(handlers::season::get_archive))
            .route("/api/season/rotate", web::post().to(handlers::season::rotate_season))
            .route("/api/season/reset", web::post().to(handlers::season::reset_season))
    })
    .bind(format!("{}:{}", config.host, config.port))?
    .run()
    .await
}

async fn health() -> web::HttpResponse {
    web::HttpResponse::Ok().json(&serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
