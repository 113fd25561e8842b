use crate::error::AppError;

pub const MIN_SCORE_VALUE: i64 = 80;
pub const MAX_SCORE_VALUE: i64 = 1000;
const MAX_PLAYER_NAME_LEN: usize = 32;
const MAX_PLAYER_ID_LEN: usize = 64;

pub fn validate_score_value(value: i64) -> Result<(), AppError> {
    if (MIN_SCORE_VALUE..=MAX_SCORE_VALUE).contains(&value) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Score must be between {} and {} ms, got {}",
            MIN_SCORE_VALUE, MAX_SCORE_VALUE, value
        )))
    }
}

pub fn validate_player_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        "Anonymous".to_string()
    } else {
        trimmed.chars().take(MAX_PLAYER_NAME_LEN).collect()
    }
}

pub fn validate_player_id(id: &str) -> Result<String, AppError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(AppError::Validation("Player id is required".into()))
    } else if trimmed.chars().count() > MAX_PLAYER_ID_LEN {
        Err(AppError::Validation("Player id too long".into()))
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn validate_season(season: i64) -> Result<u32, AppError> {
    u32::try_from(season)
        .ok()
        .filter(|s| *s >= 1)
        .ok_or_else(|| AppError::Validation(format!("Invalid season: {}", season)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_bounds_are_inclusive() {
        assert!(validate_score_value(80).is_ok());
        assert!(validate_score_value(1000).is_ok());
        assert!(validate_score_value(79).is_err());
        assert!(validate_score_value(1001).is_err());
        assert!(validate_score_value(50).is_err());
    }

    #[test]
    fn test_player_name_defaults_and_truncates() {
        assert_eq!(validate_player_name("   "), "Anonymous");
        assert_eq!(validate_player_name("  Ada "), "Ada");
        assert_eq!(validate_player_name(&"x".repeat(40)).len(), 32);
    }

    #[test]
    fn test_player_id() {
        assert!(validate_player_id("").is_err());
        assert!(validate_player_id(&"p".repeat(65)).is_err());
        assert_eq!(validate_player_id(" p-1 ").unwrap(), "p-1");
    }

    #[test]
    fn test_season_must_be_positive() {
        assert!(validate_season(0).is_err());
        assert!(validate_season(-4).is_err());
        assert_eq!(validate_season(12).unwrap(), 12);
    }
}
