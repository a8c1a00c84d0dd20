//! Mode policy: which triggers a guild's camp mode enables, and which
//! wall-clock time each trigger fires at. Pure functions of the config so
//! tests can exercise arbitrary modes.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::config::{CampMode, GuildConfig};
use crate::error::Result;
use crate::timeutil::parse_time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerKind {
    AttendancePublish,
    Reminder,
    AttendanceClose,
    FeedbackPublish,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 4] = [
        TriggerKind::AttendancePublish,
        TriggerKind::Reminder,
        TriggerKind::AttendanceClose,
        TriggerKind::FeedbackPublish,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TriggerKind::AttendancePublish => "attendance_publish",
            TriggerKind::Reminder => "reminder",
            TriggerKind::AttendanceClose => "attendance_close",
            TriggerKind::FeedbackPublish => "feedback_publish",
        }
    }
}

/// Cyprus camps run feedback polls only; attendance publish, reminders, and
/// the close trigger are inert there.
pub fn enabled_triggers(mode: CampMode) -> &'static [TriggerKind] {
    match mode {
        CampMode::Standard => &TriggerKind::ALL,
        CampMode::Cyprus => &[TriggerKind::FeedbackPublish],
    }
}

pub fn is_enabled(mode: CampMode, kind: TriggerKind) -> bool {
    enabled_triggers(mode).contains(&kind)
}

/// The configured guild-local fire time for a trigger.
pub fn trigger_time(config: &GuildConfig, kind: TriggerKind) -> Result<NaiveTime> {
    let raw = match kind {
        TriggerKind::AttendancePublish => &config.poll_publish_time,
        TriggerKind::Reminder => &config.reminder_time,
        TriggerKind::AttendanceClose => &config.poll_close_time,
        TriggerKind::FeedbackPublish => &config.feedback_publish_time,
    };
    parse_time(raw)
}
