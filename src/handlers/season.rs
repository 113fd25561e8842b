use crate::error::AppError;
use crate::models::season::*;
use crate::services::season as service;
use crate::state::AppState;
use crate::validation;
use chrono::Utc;
use ntex::util::Bytes;
use ntex::web::{self, HttpRequest, HttpResponse};
use std::sync::Arc;

const ADMIN_KEY_HEADER: &str = "x-admin-key";

fn authorize(state: &AppState, req: &HttpRequest) -> Result<(), AppError> {
    let presented = req
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    state.check_admin(presented)
}

/// An empty body is the same as `{}`.
fn parse_season_request(body: &[u8]) -> Result<SeasonRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SeasonRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid season request: {}", e)))
}

pub async fn get_season(state: web::types::State<Arc<AppState>>) -> HttpResponse {
    HttpResponse::Ok().json(&state.settings.clock.info(Utc::now()))
}

pub async fn get_archive(
    state: web::types::State<Arc<AppState>>,
    path: web::types::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let season = validation::validate_season(path.into_inner())?;
    let store = state.open_store().await?;
    let archive = service::get_archive(store.as_ref(), season).await?;
    Ok(HttpResponse::Ok().json(&archive))
}

/// Close a season. An explicit `season` closes exactly that one; otherwise
/// the board's current season is closed, or with `ifDue` only once the clock
/// has moved past it.
pub async fn rotate_season(
    state: web::types::State<Arc<AppState>>,
    req: HttpRequest,
    body: Bytes,
) -> Result<HttpResponse, AppError> {
    authorize(&state, &req)?;
    let request = parse_season_request(&body)?;
    let now = Utc::now();
    let clock = &state.settings.clock;

    let season = request.season.map(validation::validate_season).transpose()?;
    let store = state.open_store().await?;
    let result = match season {
        Some(season) => Some(service::rotate(store.as_ref(), clock, season, now).await?),
        None if request.if_due => service::rotate_if_due(store.as_ref(), clock, now).await?,
        None => Some(service::rotate_current(store.as_ref(), clock, now).await?),
    };

    Ok(HttpResponse::Ok().json(&serde_json::json!({
        "rotated": result.is_some(),
        "result": result,
    })))
}

/// Finish a rotation whose archive landed but whose reset did not.
pub async fn reset_season(
    state: web::types::State<Arc<AppState>>,
    req: HttpRequest,
    body: Bytes,
) -> Result<HttpResponse, AppError> {
    authorize(&state, &req)?;
    let season = parse_season_request(&body)?
        .season
        .ok_or_else(|| AppError::Validation("season is required".into()))
        .and_then(validation::validate_season)?;
    let store = state.open_store().await?;
    let result =
        service::complete_reset(store.as_ref(), &state.settings.clock, season, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(&result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_body_reads_as_defaults() {
        for body in [&b""[..], b"  \n", b"{}"] {
            let request = parse_season_request(body).unwrap();
            assert_eq!(request.season, None);
            assert!(!request.if_due);
        }
    }

    #[test]
    fn test_season_request_fields() {
        let request = parse_season_request(br#"{"season": 4, "ifDue": true}"#).unwrap();
        assert_eq!(request.season, Some(4));
        assert!(request.if_due);
    }

    #[test]
    fn test_malformed_body_is_a_validation_error() {
        let err = parse_season_request(b"{season").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(!err.is_retryable());
    }
}
