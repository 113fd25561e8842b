//! Season clock and archive-then-reset rotation.
//!
//! The current season is never stored: it is recomputed from a fixed epoch
//! and period on every call. Rotation touches three documents one at a time
//! (archive, leaderboard, latest) and each step checks its own precondition,
//! so a rotation interrupted after the archive write can be finished with
//! [`complete_reset`] without ever rewriting history.

use crate::error::AppError;
use crate::models::leaderboard::{
    ArchiveDocument, LatestPointerDocument, LeaderboardDocument, ScoreEntry,
};
use crate::models::season::{RotationResult, SeasonInfo};
use crate::store::{self, archive_path, DocumentStore, Versioned, LATEST, LEADERBOARD};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonClock {
    epoch: DateTime<Utc>,
    period: Duration,
}

impl SeasonClock {
    pub fn new(epoch: DateTime<Utc>, period: Duration) -> Result<Self, AppError> {
        if period <= Duration::zero() {
            return Err(AppError::Validation("Season period must be positive".into()));
        }
        Ok(SeasonClock { epoch, period })
    }

    /// `floor((now - epoch) / period) + 1`; anything before the epoch is season 1.
    pub fn current_season(&self, now: DateTime<Utc>) -> u32 {
        if now < self.epoch {
            return 1;
        }
        let elapsed = (now - self.epoch).num_seconds();
        let index = elapsed / self.period.num_seconds().max(1);
        u32::try_from(index + 1).unwrap_or(u32::MAX)
    }

    pub fn season_start(&self, season: u32) -> DateTime<Utc> {
        let offset = i64::from(season.max(1) - 1) * self.period.num_seconds();
        self.epoch + Duration::seconds(offset)
    }

    pub fn season_end(&self, season: u32) -> DateTime<Utc> {
        self.season_start(season.saturating_add(1))
    }

    pub fn info(&self, now: DateTime<Utc>) -> SeasonInfo {
        let season = self.current_season(now);
        SeasonInfo {
            season,
            starts_at: self.season_start(season),
            ends_at: self.season_end(season),
        }
    }
}

fn count_players(entries: &[ScoreEntry]) -> usize {
    entries
        .iter()
        .map(|e| e.player_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// A late rotation jumps straight to the clock's season instead of walking
/// through empty ones.
fn next_season(clock: &SeasonClock, closed: u32, now: DateTime<Utc>) -> u32 {
    closed.saturating_add(1).max(clock.current_season(now))
}

async fn archive_exists(store: &dyn DocumentStore, season: u32) -> Result<bool, AppError> {
    Ok(store::read_optional::<ArchiveDocument>(store, &archive_path(season))
        .await?
        .is_some())
}

/// Archive `season_to_close` and reset the board and latest pointer.
///
/// The season is passed in rather than read off the clock so a rotation that
/// straddles a period boundary still closes the season it meant to.
pub async fn rotate(
    store: &dyn DocumentStore,
    clock: &SeasonClock,
    season_to_close: u32,
    now: DateTime<Utc>,
) -> Result<RotationResult, AppError> {
    let board = store::read_document::<LeaderboardDocument>(store, LEADERBOARD).await?;
    rotate_loaded(store, clock, season_to_close, board, now).await
}

async fn rotate_loaded(
    store: &dyn DocumentStore,
    clock: &SeasonClock,
    season_to_close: u32,
    board: Versioned<LeaderboardDocument>,
    now: DateTime<Utc>,
) -> Result<RotationResult, AppError> {
    if archive_exists(store, season_to_close).await? {
        return Err(AppError::AlreadyArchived {
            season: season_to_close,
        });
    }
    if board.document.season != season_to_close {
        return Err(AppError::Validation(format!(
            "Leaderboard is in season {}, cannot close season {}",
            board.document.season, season_to_close
        )));
    }

    let entries = board.document.entries.clone();
    let archive = ArchiveDocument {
        season: season_to_close,
        season_end: now,
        total_players: count_players(&entries),
        entries,
    };

    let path = archive_path(season_to_close);
    match store::write_document(
        store,
        &path,
        &archive,
        None,
        &format!(
            "Archive season {} ({} entries)",
            season_to_close,
            archive.entries.len()
        ),
    )
    .await
    {
        Ok(_) => {}
        Err(AppError::VersionConflict { .. }) => {
            // Another rotation created it between our check and our write.
            return Err(AppError::AlreadyArchived {
                season: season_to_close,
            });
        }
        Err(e) => return Err(e),
    }
    info!(season = season_to_close, entries = archive.entries.len(), "season archived");

    let (new_season, leaderboard_reset) =
        reset_documents(store, clock, season_to_close, board, now).await?;

    Ok(RotationResult {
        closed_season: season_to_close,
        new_season,
        archived_entries: archive.entries.len(),
        total_players: archive.total_players,
        leaderboard_reset,
    })
}

/// Finish a rotation whose archive is already written: reset the board and
/// the latest pointer, each only if it still belongs to the closed season.
///
/// Safe to call repeatedly; it re-reads the board's current version and
/// never writes an archive.
pub async fn complete_reset(
    store: &dyn DocumentStore,
    clock: &SeasonClock,
    season_to_close: u32,
    now: DateTime<Utc>,
) -> Result<RotationResult, AppError> {
    let archive = store::read_optional::<ArchiveDocument>(store, &archive_path(season_to_close))
        .await?
        .ok_or_else(|| AppError::NotFound(archive_path(season_to_close)))?;
    let board = store::read_document::<LeaderboardDocument>(store, LEADERBOARD).await?;

    let (new_season, leaderboard_reset) =
        reset_documents(store, clock, season_to_close, board, now).await?;

    Ok(RotationResult {
        closed_season: season_to_close,
        new_season,
        archived_entries: archive.document.entries.len(),
        total_players: archive.document.total_players,
        leaderboard_reset,
    })
}

/// Close whatever season the board currently holds, due or not.
pub async fn rotate_current(
    store: &dyn DocumentStore,
    clock: &SeasonClock,
    now: DateTime<Utc>,
) -> Result<RotationResult, AppError> {
    let board = store::read_document::<LeaderboardDocument>(store, LEADERBOARD).await?;
    let closing = board.document.season;
    rotate_loaded(store, clock, closing, board, now).await
}

/// Rotate the board's season if the clock has moved past it.
pub async fn rotate_if_due(
    store: &dyn DocumentStore,
    clock: &SeasonClock,
    now: DateTime<Utc>,
) -> Result<Option<RotationResult>, AppError> {
    let Some(board) = store::read_optional::<LeaderboardDocument>(store, LEADERBOARD).await? else {
        return Ok(None);
    };
    let current = clock.current_season(now);
    if board.document.season >= current {
        return Ok(None);
    }
    let closing = board.document.season;
    rotate_loaded(store, clock, closing, board, now).await.map(Some)
}

async fn reset_documents(
    store: &dyn DocumentStore,
    clock: &SeasonClock,
    closed: u32,
    board: Versioned<LeaderboardDocument>,
    now: DateTime<Utc>,
) -> Result<(u32, bool), AppError> {
    let (new_season, reset_board) = if board.document.season > closed {
        info!(
            closed,
            board_season = board.document.season,
            "leaderboard already advanced"
        );
        (board.document.season, false)
    } else {
        let season = next_season(clock, closed, now);
        let fresh = LeaderboardDocument::empty(season, clock.season_start(season), now);
        if let Err(e) = store::write_document(
            store,
            LEADERBOARD,
            &fresh,
            Some(&board.version),
            &format!("Reset leaderboard for season {}", season),
        )
        .await
        {
            warn!(closed, error = %e, "leaderboard reset failed after archive");
            return Err(e);
        }
        (season, true)
    };

    let current = store::read_optional::<LatestPointerDocument>(store, LATEST).await?;
    match current {
        Some(latest) if latest.document.season > closed => {
            info!(
                closed,
                latest_season = latest.document.season,
                "latest pointer already belongs to a later season"
            );
        }
        _ => {
            let latest = LatestPointerDocument {
                entry: None,
                last_updated: now,
                season: new_season,
            };
            store::replace_document(
                store,
                LATEST,
                &latest,
                &format!("Reset latest score for season {}", new_season),
            )
            .await?;
        }
    }

    info!(closed, new_season, "season rotated");
    Ok((new_season, reset_board))
}

pub async fn get_archive(
    store: &dyn DocumentStore,
    season: u32,
) -> Result<ArchiveDocument, AppError> {
    Ok(store::read_document::<ArchiveDocument>(store, &archive_path(season))
        .await?
        .document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn clock() -> SeasonClock {
        SeasonClock::new(
            Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap(),
            Duration::days(7),
        )
        .unwrap()
    }

    #[test]
    fn test_current_season_boundaries() {
        let c = clock();
        let epoch = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
        assert_eq!(c.current_season(epoch), 1);
        assert_eq!(c.current_season(epoch + Duration::days(7) - Duration::seconds(1)), 1);
        assert_eq!(c.current_season(epoch + Duration::days(7)), 2);
        assert_eq!(c.current_season(epoch + Duration::days(70)), 11);
        assert_eq!(c.current_season(epoch - Duration::days(30)), 1);
    }

    #[test]
    fn test_season_window() {
        let c = clock();
        assert_eq!(c.season_start(1), Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap());
        assert_eq!(c.season_start(3), Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap());
        assert_eq!(c.season_end(3), c.season_start(4));

        let now = Utc.with_ymd_and_hms(2025, 1, 22, 9, 30, 0).unwrap();
        let info = c.info(now);
        assert_eq!(info.season, 3);
        assert!(info.starts_at <= now && now < info.ends_at);
    }

    #[test]
    fn test_zero_period_is_rejected() {
        assert!(SeasonClock::new(Utc::now(), Duration::zero()).is_err());
    }

    #[test]
    fn test_next_season_catches_up_with_clock() {
        let c = clock();
        let now = Utc.with_ymd_and_hms(2025, 2, 10, 0, 0, 0).unwrap();
        assert_eq!(c.current_season(now), 6);
        assert_eq!(next_season(&c, 2, now), 6);
        assert_eq!(next_season(&c, 6, now), 7);
    }
}
