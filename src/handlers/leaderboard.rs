use crate::error::AppError;
use crate::models::leaderboard::*;
use crate::services::leaderboard as service;
use crate::state::AppState;
use chrono::Utc;
use ntex::web::{self, HttpResponse};
use std::sync::Arc;

pub async fn submit_score(
    state: web::types::State<Arc<AppState>>,
    body: web::types::Json<ScoreSubmission>,
) -> Result<HttpResponse, AppError> {
    let now = Utc::now();
    // Reject bad input before any credential exchange or store access.
    let entry = service::prepare_entry(body.into_inner(), &state.settings.clock, now)?;
    let store = state.open_store().await?;
    let result = service::record_entry(store.as_ref(), &state.settings, entry, now).await?;
    Ok(HttpResponse::Ok().json(&result))
}

pub async fn get_leaderboard(
    state: web::types::State<Arc<AppState>>,
) -> Result<HttpResponse, AppError> {
    let store = state.open_store().await?;
    let board = service::get_leaderboard(store.as_ref(), &state.settings.clock, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(&board))
}

pub async fn get_latest(
    state: web::types::State<Arc<AppState>>,
) -> Result<HttpResponse, AppError> {
    let store = state.open_store().await?;
    let latest = service::get_latest(store.as_ref(), &state.settings.clock, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(&latest))
}
