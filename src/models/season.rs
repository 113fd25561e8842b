use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonInfo {
    pub season: u32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// Body of the admin season endpoints. Every field may be left out, and so
/// may the body itself.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonRequest {
    pub season: Option<i64>,
    /// Only rotate once the clock has moved past the board's season.
    #[serde(default)]
    pub if_due: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationResult {
    pub closed_season: u32,
    pub new_season: u32,
    pub archived_entries: usize,
    pub total_players: usize,
    /// False when the board had already moved past the closed season.
    pub leaderboard_reset: bool,
}
