use ntex::http::StatusCode;
use ntex::web::{HttpResponse, WebResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or out-of-range input, rejected before any I/O.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Credential exchange failed; nothing was written.
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The document changed since it was read.
    #[error("Version conflict on '{path}'")]
    VersionConflict { path: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Season {season} is already archived")]
    AlreadyArchived { season: u32 },

    /// Network or server-side failure; no document was mutated.
    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Malformed document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the caller may retry the whole read-modify-write cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::VersionConflict { .. } | AppError::Transient(_))
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::AccessDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::VersionConflict { .. } | AppError::AlreadyArchived { .. } => {
                StatusCode::CONFLICT
            }
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Db(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl WebResponseError for AppError {
    fn error_response(&self, _: &ntex::web::HttpRequest) -> HttpResponse {
        let status = self.status();
        let message = match self {
            AppError::Db(_) => "Database error".to_string(),
            AppError::Serialization(_) | AppError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(status).json(&serde_json::json!({
            "error": message,
            "retryable": self.is_retryable(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(AppError::VersionConflict { path: "leaderboard".into() }.is_retryable());
        assert!(AppError::Transient("502".into()).is_retryable());
        assert!(!AppError::Validation("bad".into()).is_retryable());
        assert!(!AppError::Auth("expired".into()).is_retryable());
        assert!(!AppError::AlreadyArchived { season: 3 }.is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::AlreadyArchived { season: 1 }.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::Transient("x".into()).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(AppError::NotFound("latest".into()).status(), StatusCode::NOT_FOUND);
    }
}
