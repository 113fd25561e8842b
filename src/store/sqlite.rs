use super::{DocumentStore, VersionToken, Versioned};
use crate::db::Db;
use crate::error::AppError;
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Local document store backed by SQLite, used for development and tests.
pub struct SqliteStore {
    db: Db,
}

enum WriteOutcome {
    Written(VersionToken),
    Conflict,
    Missing,
}

/// Tokens chain over the previous token so rewriting identical content
/// still yields a fresh version.
fn next_version(previous: Option<&VersionToken>, content: &str) -> VersionToken {
    let mut hasher = Sha256::new();
    if let Some(prev) = previous {
        hasher.update(prev.as_str().as_bytes());
    }
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    VersionToken::new(hex::encode(hasher.finalize()))
}

impl SqliteStore {
    pub fn new(db: Db) -> Self {
        SqliteStore { db }
    }

    pub fn open(path: &str) -> Result<Self, AppError> {
        Ok(SqliteStore::new(Db::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        Ok(SqliteStore::new(Db::open_in_memory()?))
    }

    /// Write descriptions recorded for `path`, oldest first.
    pub fn history(&self, path: &str) -> Result<Vec<String>, AppError> {
        Ok(self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT description FROM document_log WHERE path = ?1 ORDER BY id")?;
            let rows = stmt.query_map(params![path], |row| row.get::<_, String>(0))?;
            rows.collect()
        })?)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn read(&self, path: &str) -> Result<Versioned<Value>, AppError> {
        let row = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT content, version FROM documents WHERE path = ?1",
                params![path],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
        })?;

        match row {
            Some((content, version)) => Ok(Versioned {
                document: serde_json::from_str(&content)?,
                version: VersionToken::new(version),
            }),
            None => Err(AppError::NotFound(path.to_string())),
        }
    }

    async fn write(
        &self,
        path: &str,
        document: &Value,
        expected: Option<&VersionToken>,
        description: &str,
    ) -> Result<VersionToken, AppError> {
        let content = serde_json::to_string(document)?;
        let version = next_version(expected, &content);

        let outcome = self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let changed = match expected {
                Some(token) => tx.execute(
                    "UPDATE documents
                     SET content = ?1, version = ?2,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
                     WHERE path = ?3 AND version = ?4",
                    params![content, version.as_str(), path, token.as_str()],
                )?,
                None => tx.execute(
                    "INSERT INTO documents (path, content, version) VALUES (?1, ?2, ?3)
                     ON CONFLICT(path) DO NOTHING",
                    params![path, content, version.as_str()],
                )?,
            };

            if changed == 0 {
                let exists = tx
                    .query_row(
                        "SELECT 1 FROM documents WHERE path = ?1",
                        params![path],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                return Ok(if exists {
                    WriteOutcome::Conflict
                } else {
                    WriteOutcome::Missing
                });
            }

            tx.execute(
                "INSERT INTO document_log (path, version, description) VALUES (?1, ?2, ?3)",
                params![path, version.as_str(), description],
            )?;
            tx.commit()?;
            Ok(WriteOutcome::Written(version))
        })?;

        match outcome {
            WriteOutcome::Written(version) => {
                info!(path, %version, description, "document written");
                Ok(version)
            }
            WriteOutcome::Conflict => {
                warn!(path, "stale version on write");
                Err(AppError::VersionConflict {
                    path: path.to_string(),
                })
            }
            WriteOutcome::Missing => Err(AppError::NotFound(path.to_string())),
        }
    }
}
