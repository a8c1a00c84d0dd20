use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "lecture")]
    Lecture,
    #[serde(rename = "contest")]
    Contest,
    #[serde(rename = "contest_editorial")]
    ContestEditorial,
    #[serde(rename = "extra")]
    ExtraLecture,
    #[serde(rename = "evening")]
    EveningActivity,
}

impl EventType {
    /// Only lectures and contests appear in attendance polls.
    pub fn is_pollable(self) -> bool {
        matches!(self, EventType::Lecture | EventType::Contest)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            EventType::Lecture => "Lecture",
            EventType::Contest => "Contest",
            EventType::ContestEditorial => "Contest Editorial",
            EventType::ExtraLecture => "Extra Lecture",
            EventType::EveningActivity => "Evening Activity",
        }
    }

    pub fn parse(s: &str) -> Option<EventType> {
        match s.trim().to_lowercase().as_str() {
            "lecture" => Some(EventType::Lecture),
            "contest" => Some(EventType::Contest),
            "contest_editorial" => Some(EventType::ContestEditorial),
            "extra" => Some(EventType::ExtraLecture),
            "evening" => Some(EventType::EveningActivity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub guild_id: u64,
    pub title: String,
    pub date: NaiveDate,
    pub event_type: EventType,
    #[serde(default)]
    pub feedback_only: bool,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Identity within a guild is (date, title, type); two events sharing it
    /// are duplicates.
    pub fn same_identity(&self, guild_id: u64, date: NaiveDate, title: &str, event_type: EventType) -> bool {
        self.guild_id == guild_id
            && self.date == date
            && self.title == title
            && self.event_type == event_type
    }

    /// The line this event contributes to an attendance poll.
    pub fn option_title(&self) -> String {
        format!("{}: {}", self.event_type.display_name(), self.title)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollKind {
    Attendance,
    Feedback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    pub user_id: u64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub event_id: String,
    pub title: String,
    pub event_type: EventType,
    #[serde(default)]
    pub votes: Vec<Voter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollMeta {
    pub id: String,
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub kind: PollKind,
    pub poll_date: NaiveDate,
    pub question: String,
    pub options: Vec<PollOption>,
    pub published_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Feedback polls auto-close this long after publication; attendance
    /// polls close on the guild's close trigger instead.
    pub close_after: Option<DateTime<Utc>>,
    /// The summary delivered at close time. Votes can still land while the
    /// close is delivering; re-closing returns this frozen copy, not a
    /// recomputation from `options`.
    #[serde(default)]
    pub final_summary: Option<Summary>,
    #[serde(default)]
    pub reminded_users: Vec<u64>,
}

impl PollMeta {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    /// Replace any previous vote by this user, then record the new choice.
    /// The caller validates the index against `options`.
    pub fn record_vote(&mut self, voter: Voter, option_index: usize) {
        for option in &mut self.options {
            option.votes.retain(|v| v.user_id != voter.user_id);
        }
        self.options[option_index].votes.push(voter);
    }

    pub fn voters(&self) -> HashSet<u64> {
        self.options
            .iter()
            .flat_map(|o| o.votes.iter().map(|v| v.user_id))
            .collect()
    }

    pub fn references_event(&self, event_id: &str) -> bool {
        self.options.iter().any(|o| o.event_id == event_id)
    }

    pub fn summary(&self) -> Summary {
        let option_counts = self
            .options
            .iter()
            .map(|o| (o.title.clone(), o.votes.len()))
            .sorted_by_key(|(_, count)| std::cmp::Reverse(*count))
            .collect();

        let raw_votes = self
            .options
            .iter()
            .flat_map(|o| {
                o.votes
                    .iter()
                    .map(move |v| (v.user_id, v.username.clone(), o.title.clone()))
            })
            .collect();

        Summary {
            poll_id: self.id.clone(),
            guild_id: self.guild_id,
            poll_date: self.poll_date,
            kind: self.kind,
            question: self.question.clone(),
            option_counts,
            raw_votes,
        }
    }
}

/// Closed-poll result handed to the export gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub poll_id: String,
    pub guild_id: u64,
    pub poll_date: NaiveDate,
    pub kind: PollKind,
    pub question: String,
    /// (option title, vote count), highest count first.
    pub option_counts: Vec<(String, usize)>,
    /// (user_id, username, chosen option title).
    pub raw_votes: Vec<(u64, String, String)>,
}

impl Summary {
    pub fn total_votes(&self) -> usize {
        self.raw_votes.len()
    }

    /// Three-column attendance export: user_id,username,choice.
    pub fn csv(&self) -> String {
        let mut out = String::from("user_id,username,choice\n");
        for (user_id, username, choice) in &self.raw_votes {
            out.push_str(&format!(
                "{},{},{}\n",
                user_id,
                csv_escape(username),
                csv_escape(choice)
            ));
        }
        out
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

/// One DM's worth of reminders: every open attendance poll the user has not
/// voted in yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderBatch {
    pub user_id: u64,
    pub poll_questions: Vec<String>,
    /// Guild-local close time, for the deadline line in the DM.
    pub deadline: String,
}
