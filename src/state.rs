use crate::auth::{self, CredentialProvider, Identity, SigningKey, StaticTokenProvider};
use crate::config::{Backend, Config, GitHubConfig};
use crate::error::AppError;
use crate::services::leaderboard::Settings;
use crate::services::season::SeasonClock;
use crate::store::github::{self, GitHubStore};
use crate::store::sqlite::SqliteStore;
use crate::store::SharedStore;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};

pub enum StoreBackend {
    Sqlite(Arc<SqliteStore>),
    GitHub {
        client: reqwest::Client,
        config: GitHubConfig,
        credentials: Arc<dyn CredentialProvider>,
        identity: Identity,
        key: SigningKey,
    },
}

fn season_period(days: i64) -> Result<Duration, AppError> {
    Duration::try_days(days)
        .filter(|period| *period > Duration::zero())
        .ok_or_else(|| {
            AppError::Validation(format!("Season period of {} days is out of range", days))
        })
}

fn token_lifetime(secs: i64) -> Result<Duration, AppError> {
    Duration::try_seconds(secs)
        .filter(|lifetime| *lifetime > Duration::zero())
        .ok_or_else(|| {
            AppError::Validation(format!("Token lifetime of {} seconds is out of range", secs))
        })
}

pub struct AppState {
    pub settings: Settings,
    pub admin_key: Option<String>,
    backend: StoreBackend,
}

impl AppState {
    pub fn new(settings: Settings, admin_key: Option<String>, backend: StoreBackend) -> Self {
        AppState {
            settings,
            admin_key,
            backend,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        if config.capacity == 0 {
            return Err(AppError::Validation("Leaderboard capacity must be at least 1".into()));
        }
        let clock = SeasonClock::new(config.season_epoch, season_period(config.season_period_days)?)?;
        let settings = Settings {
            capacity: config.capacity,
            clock,
        };

        let backend = match config.backend {
            Backend::Sqlite => {
                info!(path = %config.database_path, "using SQLite document store");
                StoreBackend::Sqlite(Arc::new(SqliteStore::open(&config.database_path)?))
            }
            Backend::GitHub => {
                let gh = &config.github;
                if gh.owner.is_empty() || gh.repo.is_empty() {
                    return Err(AppError::Validation(
                        "GITHUB_OWNER and GITHUB_REPO are required for the github backend".into(),
                    ));
                }
                info!(owner = %gh.owner, repo = %gh.repo, branch = %gh.branch, "using GitHub document store");
                let key = match &gh.signing_key_path {
                    Some(path) => SigningKey::new(std::fs::read(path).map_err(|e| {
                        AppError::Auth(format!("cannot read signing key {}: {}", path, e))
                    })?),
                    None => SigningKey::default(),
                };
                let lifetime = token_lifetime(gh.token_lifetime_secs)?;
                StoreBackend::GitHub {
                    client: github::build_client(config.request_timeout_secs)?,
                    config: gh.clone(),
                    credentials: Arc::new(StaticTokenProvider::new(
                        gh.token.clone().unwrap_or_default(),
                        lifetime,
                    )),
                    identity: Identity {
                        issuer: format!("{}/{}", gh.owner, gh.repo),
                        installation_id: gh.installation_id.clone(),
                    },
                    key,
                }
            }
        };

        Ok(AppState::new(settings, config.admin_key.clone(), backend))
    }

    /// Store handle for one logical operation.
    ///
    /// Remote backends get a freshly exchanged credential every time; nothing
    /// is cached between operations.
    pub async fn open_store(&self) -> Result<SharedStore, AppError> {
        match &self.backend {
            StoreBackend::Sqlite(store) => Ok(store.clone()),
            StoreBackend::GitHub {
                client,
                config,
                credentials,
                identity,
                key,
            } => {
                let token = auth::fresh_token(credentials.as_ref(), identity, key).await?;
                debug!(expires_at = %token.expires_at, "store credential obtained");
                Ok(Arc::new(GitHubStore::new(
                    client.clone(),
                    config.clone(),
                    token,
                )))
            }
        }
    }

    pub fn check_admin(&self, presented: Option<&str>) -> Result<(), AppError> {
        match (&self.admin_key, presented) {
            (None, _) => Ok(()),
            (Some(expected), Some(given)) if expected == given => Ok(()),
            _ => Err(AppError::AccessDenied("admin key required".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_period_bounds() {
        assert_eq!(season_period(7).unwrap(), Duration::days(7));
        assert!(matches!(season_period(0), Err(AppError::Validation(_))));
        assert!(matches!(season_period(-3), Err(AppError::Validation(_))));
        assert!(matches!(season_period(i64::MAX), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_token_lifetime_bounds() {
        assert_eq!(token_lifetime(3600).unwrap(), Duration::hours(1));
        assert!(matches!(token_lifetime(0), Err(AppError::Validation(_))));
        assert!(matches!(token_lifetime(i64::MIN), Err(AppError::Validation(_))));
        assert!(matches!(token_lifetime(i64::MAX), Err(AppError::Validation(_))));
    }
}
