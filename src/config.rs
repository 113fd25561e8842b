use chrono::{DateTime, NaiveDate, Utc};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use tracing::{info, warn};

/// Which document store the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    GitHub,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "github" => Ok(Backend::GitHub),
            other => Err(format!("unknown backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Directory inside the repository holding the documents.
    pub path_prefix: String,
    pub token: Option<String>,
    pub token_lifetime_secs: i64,
    pub installation_id: Option<String>,
    pub signing_key_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub database_path: String,
    pub github: GitHubConfig,
    pub capacity: usize,
    pub season_epoch: DateTime<Utc>,
    pub season_period_days: i64,
    pub request_timeout_secs: u64,
    pub admin_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// - `HOST` (default: 0.0.0.0), `PORT` (default: 3001)
    /// - `STORE_BACKEND` (`sqlite` | `github`, default: sqlite)
    /// - `DATABASE_PATH` (default: reflex-board.db)
    /// - `GITHUB_API_BASE`, `GITHUB_OWNER`, `GITHUB_REPO`, `GITHUB_BRANCH`,
    ///   `GITHUB_DATA_DIR`, `GITHUB_TOKEN`, `GITHUB_TOKEN_LIFETIME_SECS`,
    ///   `GITHUB_INSTALLATION_ID`, `GITHUB_SIGNING_KEY_PATH`
    /// - `LEADERBOARD_CAPACITY` (default: 10)
    /// - `SEASON_EPOCH` (YYYY-MM-DD, default: 2025-01-06)
    /// - `SEASON_PERIOD_DAYS` (default: 7)
    /// - `REQUEST_TIMEOUT_SECS` (default: 10)
    /// - `ADMIN_KEY` (optional)
    pub fn from_env() -> Self {
        Self {
            host: try_load("HOST", "0.0.0.0"),
            port: try_load("PORT", "3001"),
            backend: try_load("STORE_BACKEND", "sqlite"),
            database_path: try_load("DATABASE_PATH", "reflex-board.db"),
            github: GitHubConfig {
                api_base: try_load("GITHUB_API_BASE", "https://api.github.com"),
                owner: try_load("GITHUB_OWNER", ""),
                repo: try_load("GITHUB_REPO", ""),
                branch: try_load("GITHUB_BRANCH", "main"),
                path_prefix: try_load("GITHUB_DATA_DIR", "data"),
                token: optional("GITHUB_TOKEN"),
                token_lifetime_secs: try_load("GITHUB_TOKEN_LIFETIME_SECS", "3600"),
                installation_id: optional("GITHUB_INSTALLATION_ID"),
                signing_key_path: optional("GITHUB_SIGNING_KEY_PATH"),
            },
            capacity: try_load("LEADERBOARD_CAPACITY", "10"),
            season_epoch: parse_epoch(&try_load::<String>("SEASON_EPOCH", DEFAULT_EPOCH)),
            season_period_days: try_load("SEASON_PERIOD_DAYS", "7"),
            request_timeout_secs: try_load("REQUEST_TIMEOUT_SECS", "10"),
            admin_key: optional("ADMIN_KEY"),
        }
    }
}

const DEFAULT_EPOCH: &str = "2025-01-06";

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    match raw.parse() {
        Ok(v) => v,
        Err(e) => {
            warn!("Invalid {key} value '{raw}': {e}, using default: {default}");
            match default.parse() {
                Ok(v) => v,
                Err(e) => panic!("Default for {key} does not parse: {e}"),
            }
        }
    }
}

fn parse_epoch(raw: &str) -> DateTime<Utc> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").unwrap_or_else(|e| {
        warn!("Invalid SEASON_EPOCH '{raw}': {e}, using default: {DEFAULT_EPOCH}");
        NaiveDate::from_ymd_opt(2025, 1, 6).unwrap_or_default()
    });
    date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("SQLite".parse::<Backend>().unwrap(), Backend::Sqlite);
        assert_eq!(" github ".parse::<Backend>().unwrap(), Backend::GitHub);
        assert!("postgres".parse::<Backend>().is_err());
    }

    #[test]
    fn test_parse_epoch_falls_back_on_garbage() {
        let fallback = parse_epoch("not-a-date");
        assert_eq!(fallback.format("%Y-%m-%d").to_string(), DEFAULT_EPOCH);

        let parsed = parse_epoch("2024-03-01");
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }
}
