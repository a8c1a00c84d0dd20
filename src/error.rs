use chrono::NaiveDate;
use thiserror::Error;

use crate::model::EventType;

pub type Result<T> = std::result::Result<T, CampPollError>;

#[derive(Debug, Error)]
pub enum CampPollError {
    #[error("{} '{title}' on {date} already exists", event_type.display_name())]
    Duplicate {
        date: NaiveDate,
        title: String,
        event_type: EventType,
    },

    #[error("event not found: {0}")]
    EventNotFound(String),

    #[error("event {0} is referenced by an open poll")]
    EventInUse(String),

    #[error("poll not found: {0}")]
    PollNotFound(String),

    #[error("poll {0} is closed")]
    PollClosed(String),

    #[error("option index {index} is out of range for poll {poll_id}")]
    InvalidOption { poll_id: String, index: usize },

    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CampPollError {
    pub fn delivery(err: anyhow::Error) -> Self {
        CampPollError::Delivery(format!("{:#}", err))
    }
}
