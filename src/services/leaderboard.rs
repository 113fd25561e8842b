use crate::error::AppError;
use crate::models::leaderboard::*;
use crate::services::season::SeasonClock;
use crate::store::{self, DocumentStore, LATEST, LEADERBOARD};
use crate::validation;
use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::info;

const ID_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ID_LEN: usize = 8;

/// Knobs shared by every submission.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    pub capacity: usize,
    pub clock: SeasonClock,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub document: LeaderboardDocument,
    pub is_new_record: bool,
    pub rank: Option<usize>,
}

fn generate_entry_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Validate a submission and turn it into an entry stamped with the
/// clock-derived season. Touches no store; [`record_entry`] settles the
/// final season against the board.
pub fn prepare_entry(
    submission: ScoreSubmission,
    clock: &SeasonClock,
    now: DateTime<Utc>,
) -> Result<ScoreEntry, AppError> {
    validation::validate_score_value(submission.value)?;
    let player_id = validation::validate_player_id(&submission.player_id)?;
    let player_name = validation::validate_player_name(&submission.player_name);

    Ok(ScoreEntry {
        value: submission.value,
        timestamp: now,
        id: generate_entry_id(),
        player_name,
        player_id,
        season: clock.current_season(now),
    })
}

/// Insert `entry` into `current`, keeping the `capacity` lowest values.
///
/// Sorting is stable and the new entry goes in last, so among equal values
/// the earlier submission ranks higher.
pub fn merge(
    current: &LeaderboardDocument,
    entry: ScoreEntry,
    capacity: usize,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let is_new_record = current
        .best_value()
        .map_or(true, |best| entry.value <= best);

    let entry_id = entry.id.clone();
    let mut entries = current.entries.clone();
    entries.push(entry);
    entries.sort_by_key(|e| e.value);
    entries.truncate(capacity);

    let rank = entries
        .iter()
        .rposition(|e| e.id == entry_id)
        .map(|idx| idx + 1);

    MergeOutcome {
        document: LeaderboardDocument {
            entries,
            last_updated: now,
            season: current.season,
            season_start: current.season_start,
        },
        is_new_record,
        rank,
    }
}

/// Read the board, merge `entry`, write it back against the version read,
/// then point `latest` at the entry whether or not it placed.
///
/// The entry is restamped with the board's season, so a score landing after
/// the clock rolled over but before rotation is archived with the season it
/// was ranked in. A `VersionConflict` on the board write is returned as-is;
/// retrying means calling this again, which re-reads. The `latest` overwrite
/// absorbs its own conflicts so a board write that landed is never repeated.
pub async fn record_entry(
    store: &dyn DocumentStore,
    settings: &Settings,
    entry: ScoreEntry,
    now: DateTime<Utc>,
) -> Result<SubmissionResult, AppError> {
    let existing = store::read_optional::<LeaderboardDocument>(store, LEADERBOARD).await?;
    let (board, version) = match existing {
        Some(current) => (current.document, Some(current.version)),
        None => (
            LeaderboardDocument::empty(entry.season, settings.clock.season_start(entry.season), now),
            None,
        ),
    };
    // Until the board is rotated, scores count towards the season it holds.
    let entry = ScoreEntry {
        season: board.season,
        ..entry
    };

    let outcome = merge(&board, entry.clone(), settings.capacity, now);
    let placement = match outcome.rank {
        Some(rank) => format!("rank {}", rank),
        None => "unranked".to_string(),
    };

    if outcome.rank.is_some() {
        store::write_document(
            store,
            LEADERBOARD,
            &outcome.document,
            version.as_ref(),
            &format!("Score {}ms by {} ({})", entry.value, entry.player_name, placement),
        )
        .await?;
    }

    let latest = LatestPointerDocument {
        entry: Some(entry.clone()),
        last_updated: now,
        season: entry.season,
    };
    store::replace_document(
        store,
        LATEST,
        &latest,
        &format!("Latest score {}ms by {}", entry.value, entry.player_name),
    )
    .await?;

    info!(
        id = %entry.id,
        value = entry.value,
        season = entry.season,
        new_record = outcome.is_new_record,
        placement = %placement,
        "score recorded"
    );

    Ok(SubmissionResult {
        entry,
        is_new_record: outcome.is_new_record,
        rank: outcome.rank,
    })
}

pub async fn submit_score(
    store: &dyn DocumentStore,
    settings: &Settings,
    submission: ScoreSubmission,
    now: DateTime<Utc>,
) -> Result<SubmissionResult, AppError> {
    let entry = prepare_entry(submission, &settings.clock, now)?;
    record_entry(store, settings, entry, now).await
}

/// Current board; a store that has never seen a score reads as empty.
pub async fn get_leaderboard(
    store: &dyn DocumentStore,
    clock: &SeasonClock,
    now: DateTime<Utc>,
) -> Result<LeaderboardDocument, AppError> {
    let season = clock.current_season(now);
    Ok(store::read_optional::<LeaderboardDocument>(store, LEADERBOARD)
        .await?
        .map(|doc| doc.document)
        .unwrap_or_else(|| LeaderboardDocument::empty(season, clock.season_start(season), now)))
}

pub async fn get_latest(
    store: &dyn DocumentStore,
    clock: &SeasonClock,
    now: DateTime<Utc>,
) -> Result<LatestPointerDocument, AppError> {
    Ok(store::read_optional::<LatestPointerDocument>(store, LATEST)
        .await?
        .map(|doc| doc.document)
        .unwrap_or_else(|| LatestPointerDocument {
            entry: None,
            last_updated: now,
            season: clock.current_season(now),
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 3, 12, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn entry(id: &str, value: i64) -> ScoreEntry {
        ScoreEntry {
            value,
            timestamp: at(0),
            id: id.to_string(),
            player_name: format!("player-{}", id),
            player_id: format!("pid-{}", id),
            season: 5,
        }
    }

    fn empty_board() -> LeaderboardDocument {
        LeaderboardDocument::empty(5, at(-60), at(-60))
    }

    fn values(doc: &LeaderboardDocument) -> Vec<i64> {
        doc.entries.iter().map(|e| e.value).collect()
    }

    #[test]
    fn test_order_is_independent_of_insertion_order() {
        let first = merge(&empty_board(), entry("b", 300), 10, at(1));
        let second = merge(&first.document, entry("a", 150), 10, at(2));
        assert_eq!(values(&second.document), vec![150, 300]);
        assert_eq!(second.rank, Some(1));
        assert!(second.is_new_record);
    }

    #[test]
    fn test_truncation_drops_largest_values() {
        let mut board = empty_board();
        for (i, value) in [500, 120, 900, 310, 240, 770].iter().enumerate() {
            board = merge(&board, entry(&format!("e{}", i), *value), 4, at(i as i64)).document;
            assert!(board.entries.len() <= 4);
        }
        assert_eq!(values(&board), vec![120, 240, 310, 500]);
    }

    #[test]
    fn test_entry_outside_capacity_has_no_rank() {
        let mut board = empty_board();
        for (i, value) in [100, 110, 120].iter().enumerate() {
            board = merge(&board, entry(&format!("e{}", i), *value), 3, at(0)).document;
        }
        let outcome = merge(&board, entry("slow", 800), 3, at(1));
        assert_eq!(outcome.rank, None);
        assert!(!outcome.is_new_record);
        assert_eq!(values(&outcome.document), vec![100, 110, 120]);
    }

    #[test]
    fn test_ties_keep_first_submission_ahead() {
        let first = merge(&empty_board(), entry("early", 200), 10, at(1));
        let second = merge(&first.document, entry("late", 200), 10, at(2));
        let ids: Vec<&str> = second.document.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert_eq!(second.rank, Some(2));
        // Matching the best value counts as a record.
        assert!(second.is_new_record);
    }

    #[test]
    fn test_first_entry_is_always_a_record() {
        let outcome = merge(&empty_board(), entry("solo", 999), 10, at(1));
        assert!(outcome.is_new_record);
        assert_eq!(outcome.rank, Some(1));
        assert_eq!(outcome.document.last_updated, at(1));
        assert_eq!(outcome.document.season, 5);
    }

    #[test]
    fn test_merge_does_not_touch_input() {
        let board = merge(&empty_board(), entry("a", 300), 10, at(1)).document;
        let snapshot = board.clone();
        let _ = merge(&board, entry("b", 100), 10, at(2));
        assert_eq!(board, snapshot);
    }

    #[test]
    fn test_generated_ids_use_alphabet() {
        let id = generate_entry_id();
        assert_eq!(id.len(), ID_LEN);
        assert!(id.bytes().all(|b| ID_ALPHABET.contains(&b)));
    }
}
