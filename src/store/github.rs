//! Document store on top of the GitHub repository contents API.
//!
//! Each logical path is a JSON file under the configured data directory of a
//! single branch. The file's blob `sha` doubles as the version token, and
//! GitHub refuses a `PUT` whose `sha` no longer matches the branch head's
//! blob, which gives us compare-and-swap per file.
//!
//! ```text
//! GET /repos/{owner}/{repo}/contents/{dir}/{path}.json?ref={branch}
//! PUT /repos/{owner}/{repo}/contents/{dir}/{path}.json
//!     { "message", "content": base64, "branch", "sha"? }
//! ```

use super::{DocumentStore, VersionToken, Versioned};
use crate::auth::AccessToken;
use crate::config::GitHubConfig;
use crate::error::AppError;
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

const USER_AGENT: &str = concat!("reflex-board-server/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: PutContentMeta,
}

#[derive(Debug, Deserialize)]
struct PutContentMeta {
    sha: String,
}

/// One logical operation's view of the repository.
///
/// Built with a freshly obtained token and dropped when the operation ends.
pub struct GitHubStore {
    client: Client,
    config: GitHubConfig,
    token: AccessToken,
}

pub fn build_client(timeout_secs: u64) -> Result<Client, AppError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| AppError::Internal(format!("HTTP client setup failed: {}", e)))
}

impl GitHubStore {
    pub fn new(client: Client, config: GitHubConfig, token: AccessToken) -> Self {
        GitHubStore {
            client,
            config,
            token,
        }
    }

    fn file_path(&self, path: &str) -> String {
        let prefix = self.config.path_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{}.json", path)
        } else {
            format!("{}/{}.json", prefix, path)
        }
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            self.file_path(path)
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.contents_url(path))
            .bearer_auth(self.token.secret())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }
}

fn transport_error(path: &str, e: reqwest::Error) -> AppError {
    warn!(path, error = %e, "store request failed");
    AppError::Transient(format!("{}: {}", path, e))
}

/// Map a non-success response onto the store error taxonomy.
fn classify_failure(status: StatusCode, path: &str, creating: bool) -> AppError {
    match status.as_u16() {
        404 => AppError::NotFound(path.to_string()),
        401 | 403 => AppError::AccessDenied(format!("{} ({})", path, status)),
        409 => AppError::VersionConflict {
            path: path.to_string(),
        },
        // A create without `sha` on an existing file is rejected as unprocessable.
        422 if creating => AppError::VersionConflict {
            path: path.to_string(),
        },
        429 | 500..=599 => AppError::Transient(format!("{} ({})", path, status)),
        _ => AppError::Internal(format!("unexpected status {} for {}", status, path)),
    }
}

fn decode_content(path: &str, encoding: &str, content: &str) -> Result<Value, AppError> {
    if encoding != "base64" {
        return Err(AppError::Internal(format!(
            "{}: unsupported content encoding '{}'",
            path, encoding
        )));
    }
    // GitHub wraps the payload at 60 columns.
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| AppError::Internal(format!("{}: invalid base64 content: {}", path, e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn encode_content(document: &Value) -> Result<String, AppError> {
    let mut bytes = serde_json::to_vec_pretty(document)?;
    bytes.push(b'\n');
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

#[async_trait]
impl DocumentStore for GitHubStore {
    async fn read(&self, path: &str) -> Result<Versioned<Value>, AppError> {
        let response = self
            .request(Method::GET, path)
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_failure(status, path, false));
        }

        let body: ContentsResponse = response
            .json()
            .await
            .map_err(|e| transport_error(path, e))?;
        Ok(Versioned {
            document: decode_content(path, &body.encoding, &body.content)?,
            version: VersionToken::new(body.sha),
        })
    }

    async fn write(
        &self,
        path: &str,
        document: &Value,
        expected: Option<&VersionToken>,
        description: &str,
    ) -> Result<VersionToken, AppError> {
        let body = PutContentsRequest {
            message: description,
            content: encode_content(document)?,
            branch: &self.config.branch,
            sha: expected.map(VersionToken::as_str),
        };

        let response = self
            .request(Method::PUT, path)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        let status = response.status();
        if !status.is_success() {
            let err = classify_failure(status, path, expected.is_none());
            if err.is_retryable() {
                warn!(path, %status, "conditional write rejected");
            }
            return Err(err);
        }

        let written: PutContentsResponse = response
            .json()
            .await
            .map_err(|e| transport_error(path, e))?;
        info!(path, sha = %written.content.sha, description, "document committed");
        Ok(VersionToken::new(written.content.sha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;

    fn store(prefix: &str) -> GitHubStore {
        GitHubStore::new(
            Client::new(),
            GitHubConfig {
                api_base: "https://api.github.com/".into(),
                owner: "acme".into(),
                repo: "reflex-data".into(),
                branch: "main".into(),
                path_prefix: prefix.into(),
                token: None,
                token_lifetime_secs: 3600,
                installation_id: None,
                signing_key_path: None,
            },
            AccessToken::new("t0k3n", Utc::now() + ChronoDuration::hours(1)),
        )
    }

    #[test]
    fn test_contents_url_layout() {
        assert_eq!(
            store("/data/").contents_url("archive/season-3"),
            "https://api.github.com/repos/acme/reflex-data/contents/data/archive/season-3.json"
        );
        assert_eq!(
            store("").contents_url("leaderboard"),
            "https://api.github.com/repos/acme/reflex-data/contents/leaderboard.json"
        );
    }

    #[test]
    fn test_decode_wrapped_base64() {
        let encoded = encode_content(&json!({"entries": [], "season": 4})).unwrap();
        let wrapped = format!("{}\n{}\n", &encoded[..10], &encoded[10..]);
        let decoded = decode_content("leaderboard", "base64", &wrapped).unwrap();
        assert_eq!(decoded, json!({"entries": [], "season": 4}));
    }

    #[test]
    fn test_decode_rejects_unknown_encoding() {
        assert!(decode_content("leaderboard", "none", "").is_err());
    }

    #[test]
    fn test_status_classification() {
        let path = "leaderboard";
        assert!(matches!(
            classify_failure(StatusCode::NOT_FOUND, path, false),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, path, false),
            AppError::AccessDenied(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::CONFLICT, path, false),
            AppError::VersionConflict { .. }
        ));
        assert!(matches!(
            classify_failure(StatusCode::UNPROCESSABLE_ENTITY, path, true),
            AppError::VersionConflict { .. }
        ));
        assert!(matches!(
            classify_failure(StatusCode::UNPROCESSABLE_ENTITY, path, false),
            AppError::Internal(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, path, false),
            AppError::Transient(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, path, false),
            AppError::Transient(_)
        ));
    }

    #[test]
    fn test_put_body_omits_sha_on_create() {
        let body = PutContentsRequest {
            message: "Archive season 2",
            content: "e30=".into(),
            branch: "main",
            sha: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("sha").is_none());
        assert_eq!(json["branch"], "main");
    }
}
