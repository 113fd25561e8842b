use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One submitted reaction time. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreEntry {
    pub value: i64,
    pub timestamp: DateTime<Utc>,
    pub id: String,
    pub player_name: String,
    pub player_id: String,
    pub season: u32,
}

/// Top-N board, ascending by `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardDocument {
    pub entries: Vec<ScoreEntry>,
    pub last_updated: DateTime<Utc>,
    pub season: u32,
    pub season_start: DateTime<Utc>,
}

impl LeaderboardDocument {
    pub fn empty(season: u32, season_start: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        LeaderboardDocument {
            entries: Vec::new(),
            last_updated: now,
            season,
            season_start,
        }
    }

    pub fn best_value(&self) -> Option<i64> {
        self.entries.iter().map(|e| e.value).min()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestPointerDocument {
    pub entry: Option<ScoreEntry>,
    pub last_updated: DateTime<Utc>,
    pub season: u32,
}

/// Frozen copy of a closed season's board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveDocument {
    pub season: u32,
    pub season_end: DateTime<Utc>,
    pub entries: Vec<ScoreEntry>,
    pub total_players: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSubmission {
    pub value: i64,
    #[serde(default)]
    pub player_name: String,
    pub player_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub entry: ScoreEntry,
    pub is_new_record: bool,
    pub rank: Option<usize>,
}
