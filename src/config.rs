use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::timeutil::{parse_time, parse_tz};

/// Camp mode selects which triggers are active for a guild. Standard camps
/// run the full attendance cycle; the Cyprus camp publishes daily feedback
/// polls only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampMode {
    Standard,
    Cyprus,
}

impl Default for CampMode {
    fn default() -> Self {
        CampMode::Standard
    }
}

/// Per-guild configuration. All trigger times are wall-clock HH:MM strings
/// interpreted in `timezone`; they are passed explicitly into the scheduler
/// and engine rather than read from ambient state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildConfig {
    pub guild_id: u64,
    pub timezone: String,
    pub poll_publish_time: String,
    pub poll_close_time: String,
    pub reminder_time: String,
    pub feedback_publish_time: String,
    #[serde(default)]
    pub mode: CampMode,
}

impl GuildConfig {
    pub fn standard(guild_id: u64) -> Self {
        GuildConfig {
            guild_id,
            timezone: "Europe/Helsinki".to_owned(),
            poll_publish_time: "14:30".to_owned(),
            poll_close_time: "09:00".to_owned(),
            reminder_time: "19:00".to_owned(),
            feedback_publish_time: "22:00".to_owned(),
            mode: CampMode::Standard,
        }
    }

    pub fn cyprus(guild_id: u64) -> Self {
        GuildConfig {
            guild_id,
            timezone: "Europe/Nicosia".to_owned(),
            feedback_publish_time: "23:00".to_owned(),
            mode: CampMode::Cyprus,
            ..GuildConfig::standard(guild_id)
        }
    }

    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        parse_tz(&self.timezone)
    }

    /// Reject configs with an unknown timezone or malformed trigger times
    /// before they reach the scheduler.
    pub fn validate(&self) -> Result<()> {
        self.tz()?;
        parse_time(&self.poll_publish_time)?;
        parse_time(&self.poll_close_time)?;
        parse_time(&self.reminder_time)?;
        parse_time(&self.feedback_publish_time)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_defaults_validate() {
        let config = GuildConfig::standard(1);
        assert_eq!(config.timezone, "Europe/Helsinki");
        assert_eq!(config.poll_publish_time, "14:30");
        config.validate().unwrap();
    }

    #[test]
    fn cyprus_defaults_override_zone_and_feedback_time() {
        let config = GuildConfig::cyprus(1);
        assert_eq!(config.timezone, "Europe/Nicosia");
        assert_eq!(config.feedback_publish_time, "23:00");
        assert_eq!(config.mode, CampMode::Cyprus);
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_timezone_and_times() {
        let mut config = GuildConfig::standard(1);
        config.timezone = "Camp/Nowhere".to_owned();
        assert!(config.validate().is_err());

        let mut config = GuildConfig::standard(1);
        config.reminder_time = "7pm".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn mode_defaults_to_standard_when_missing() {
        let json = r#"{
            "guild_id": 5,
            "timezone": "Europe/Helsinki",
            "poll_publish_time": "14:30",
            "poll_close_time": "09:00",
            "reminder_time": "19:00",
            "feedback_publish_time": "22:00"
        }"#;
        let config: GuildConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, CampMode::Standard);
    }
}
