pub mod leaderboard;
pub mod season;
