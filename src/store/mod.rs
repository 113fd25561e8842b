//! Versioned document store.
//!
//! A store holds small JSON documents under fixed logical paths. Every read
//! returns the document together with an opaque [`VersionToken`]; a write
//! must present the token it read and is rejected with
//! [`AppError::VersionConflict`] once another writer has moved the document
//! on. Nothing here merges: callers own the read-modify-write loop. The one
//! exception is [`replace_document`], whose write does not depend on what it
//! read and so may safely re-read and try again.

pub mod github;
pub mod sqlite;

use crate::error::AppError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub const LEADERBOARD: &str = "leaderboard";
pub const LATEST: &str = "latest";

pub fn archive_path(season: u32) -> String {
    format!("archive/season-{}", season)
}

/// Opaque identifier of a document's exact content state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        VersionToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub document: T,
    pub version: VersionToken,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document and its current version.
    ///
    /// Fails with `NotFound`, `AccessDenied` or `Transient`.
    async fn read(&self, path: &str) -> Result<Versioned<Value>, AppError>;

    /// Conditionally overwrite a document.
    ///
    /// With `expected = Some(token)` the write only lands if the document is
    /// still at `token`. With `expected = None` the document is created and
    /// the write fails with `VersionConflict` if the path already exists.
    /// `description` is recorded by the store's audit log only.
    async fn write(
        &self,
        path: &str,
        document: &Value,
        expected: Option<&VersionToken>,
        description: &str,
    ) -> Result<VersionToken, AppError>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

pub async fn read_document<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    path: &str,
) -> Result<Versioned<T>, AppError> {
    let raw = store.read(path).await?;
    debug!(path, version = %raw.version, "document read");
    Ok(Versioned {
        document: serde_json::from_value(raw.document)?,
        version: raw.version,
    })
}

/// Like [`read_document`], mapping a missing document to `None`.
pub async fn read_optional<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    path: &str,
) -> Result<Option<Versioned<T>>, AppError> {
    match read_document(store, path).await {
        Ok(doc) => Ok(Some(doc)),
        Err(AppError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub async fn write_document<T: Serialize>(
    store: &dyn DocumentStore,
    path: &str,
    document: &T,
    expected: Option<&VersionToken>,
    description: &str,
) -> Result<VersionToken, AppError> {
    let value = serde_json::to_value(document)?;
    store.write(path, &value, expected, description).await
}

/// Attempts `replace_document` makes before giving up on a contended path.
pub const REPLACE_ATTEMPTS: usize = 3;

/// Overwrite whatever is at `path`, creating it if absent.
///
/// Reads the current token and writes against it. A writer that slips in
/// between only changes which token we must present, so the read and write
/// are repeated up to [`REPLACE_ATTEMPTS`] times before the conflict is
/// surfaced.
pub async fn replace_document<T: Serialize>(
    store: &dyn DocumentStore,
    path: &str,
    document: &T,
    description: &str,
) -> Result<VersionToken, AppError> {
    let value = serde_json::to_value(document)?;
    let mut attempt = 1;
    loop {
        let current = match store.read(path).await {
            Ok(existing) => Some(existing.version),
            Err(AppError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        match store.write(path, &value, current.as_ref(), description).await {
            Err(AppError::VersionConflict { .. }) if attempt < REPLACE_ATTEMPTS => {
                warn!(path, attempt, "overwrite raced another writer, re-reading");
                attempt += 1;
            }
            other => return other,
        }
    }
}
