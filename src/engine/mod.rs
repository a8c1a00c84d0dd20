//! The poll lifecycle engine: creates polls from due events, records votes,
//! aggregates reminders, and closes polls into summaries. Every transition is
//! idempotent against repeated timer fires, and platform I/O never happens
//! while a guild's lock is held — records are committed only after the
//! external call succeeded.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use evlog::meta;
use tokio::sync::Mutex;

use crate::config::{CampMode, GuildConfig};
use crate::error::{CampPollError, Result};
use crate::gateway::Gateway;
use crate::model::{Event, EventType, PollKind, PollMeta, PollOption, ReminderBatch, Summary, Voter};
use crate::policy::{self, TriggerKind};
use crate::runtime::get_logger;
use crate::store::{events, polls, Store};
use crate::{templates, timeutil};

/// Platform cap on options per poll message; longer event lists split.
pub const MAX_POLL_OPTIONS: usize = 10;

/// How long feedback polls stay open before the expiry sweep closes them.
const FEEDBACK_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemindStats {
    pub sent: usize,
    pub failed: usize,
    pub already_reminded: usize,
}

pub struct PollEngine {
    store: Arc<Store>,
    gateway: Arc<dyn Gateway>,
    guild_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl PollEngine {
    pub fn new(store: Arc<Store>, gateway: Arc<dyn Gateway>) -> Self {
        PollEngine {
            store,
            gateway,
            guild_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// One lock per guild; every read-modify-write of a guild's events or
    /// polls goes through it. Different guilds proceed independently.
    fn guild_lock(&self, guild_id: u64) -> Arc<Mutex<()>> {
        self.guild_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ---- events -----------------------------------------------------------

    /// Add an event. Feedback-only events get their feedback poll published
    /// immediately instead of waiting for a daily trigger; a failed publish
    /// is alerted but does not undo the event.
    pub async fn create_event(
        &self,
        config: &GuildConfig,
        title: &str,
        date: NaiveDate,
        event_type: EventType,
        feedback_only: bool,
        now: DateTime<Utc>,
    ) -> Result<Event> {
        let event = {
            let lock = self.guild_lock(config.guild_id);
            let _guard = lock.lock().await;
            events::add_event(&self.store, config.guild_id, title, date, event_type, feedback_only, now)
                .await?
        };

        get_logger().info("Event created.", meta! {
            "GuildID" => config.guild_id,
            "EventID" => event.id.clone(),
            "Type" => event.event_type.display_name(),
            "Date" => event.date,
        });

        if feedback_only {
            if let Err(e) = self.publish_feedback_for_event(config, &event, date, now).await {
                get_logger().error("Immediate feedback publish failed.", meta! {
                    "GuildID" => config.guild_id,
                    "EventID" => event.id.clone(),
                    "Error" => e,
                });
            }
        }

        Ok(event)
    }

    /// Edit date/title; rejected while any open poll references the event,
    /// since published option text cannot change.
    pub async fn edit_event(
        &self,
        guild_id: u64,
        event_id: &str,
        date: NaiveDate,
        title: &str,
    ) -> Result<Event> {
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        self.ensure_not_in_open_poll(guild_id, event_id).await?;
        events::edit_event(&self.store, event_id, date, title).await
    }

    pub async fn delete_event(&self, guild_id: u64, event_id: &str) -> Result<Event> {
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        self.ensure_not_in_open_poll(guild_id, event_id).await?;
        events::delete_event(&self.store, event_id).await
    }

    pub async fn list_events(
        &self,
        guild_id: u64,
        event_type: Option<EventType>,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Event>> {
        events::list_events(&self.store, guild_id, event_type, date).await
    }

    async fn ensure_not_in_open_poll(&self, guild_id: u64, event_id: &str) -> Result<()> {
        let open = polls::open_polls(&self.store, guild_id, None).await?;
        if open.iter().any(|p| p.references_event(event_id)) {
            return Err(CampPollError::EventInUse(event_id.to_owned()));
        }
        Ok(())
    }

    // ---- publish ----------------------------------------------------------

    /// Attendance publish trigger: poll tomorrow's pollable events. Splits
    /// into ⌈n/10⌉ polls preserving event creation order. A repeat fire for
    /// the same date is a no-op. The date guard is checked before the gateway
    /// post, not atomically with the commit, so publishes for one guild must
    /// not run concurrently — the scheduler serializes its fires.
    pub async fn publish_attendance(
        &self,
        config: &GuildConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<PollMeta>> {
        let tz = config.tz()?;
        let date = timeutil::tomorrow_in(tz, now);
        let guild_id = config.guild_id;

        let due = {
            let lock = self.guild_lock(guild_id);
            let _guard = lock.lock().await;

            // Timers deliver at least once; the date's artifact is the guard.
            let existing = polls::polls_by_guild(&self.store, guild_id).await?;
            if existing
                .iter()
                .any(|p| p.kind == PollKind::Attendance && p.poll_date == date)
            {
                get_logger().debug("Attendance poll for date already exists.", meta! {
                    "GuildID" => guild_id,
                    "Date" => date,
                });
                return Ok(Vec::new());
            }

            events::due_events(&self.store, guild_id, date, true, Some(false)).await?
        };

        if due.is_empty() {
            get_logger().info("No pollable events due; skipping attendance publish.", meta! {
                "GuildID" => guild_id,
                "Date" => date,
            });
            return Ok(Vec::new());
        }

        let chunk_count = (due.len() + MAX_POLL_OPTIONS - 1) / MAX_POLL_OPTIONS;
        let mut created = Vec::new();

        for (i, chunk) in due.chunks(MAX_POLL_OPTIONS).enumerate() {
            let mut question = format!("🗳️ Choose your attendance for {}", date);
            if chunk_count > 1 {
                question.push_str(&format!(" (Poll {}/{})", i + 1, chunk_count));
            }

            let option_titles: Vec<String> = chunk.iter().map(|e| e.option_title()).collect();

            let posted = self
                .gateway
                .post_poll(guild_id, &question, &option_titles)
                .await
                .map_err(CampPollError::delivery)?;

            let poll = PollMeta {
                id: posted.message_id.to_string(),
                guild_id,
                channel_id: posted.channel_id,
                message_id: posted.message_id,
                kind: PollKind::Attendance,
                poll_date: date,
                question,
                options: chunk
                    .iter()
                    .map(|e| PollOption {
                        event_id: e.id.clone(),
                        title: e.option_title(),
                        event_type: e.event_type,
                        votes: Vec::new(),
                    })
                    .collect(),
                published_at: now,
                closed_at: None,
                close_after: None,
                final_summary: None,
                reminded_users: Vec::new(),
            };

            {
                let lock = self.guild_lock(guild_id);
                let _guard = lock.lock().await;
                polls::save_poll(&self.store, poll.clone()).await?;
            }

            get_logger().info("Published attendance poll.", meta! {
                "GuildID" => guild_id,
                "PollID" => poll.id.clone(),
                "Options" => poll.options.len(),
            });
            created.push(poll);
        }

        Ok(created)
    }

    /// Feedback publish trigger: one single-choice poll per due event for the
    /// guild-local *today*, using the mode's fixed option template.
    pub async fn publish_feedback(
        &self,
        config: &GuildConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<PollMeta>> {
        let tz = config.tz()?;
        let date = timeutil::today_in(tz, now);

        let due = match config.mode {
            CampMode::Standard => {
                events::due_events(&self.store, config.guild_id, date, true, Some(false)).await?
            }
            CampMode::Cyprus => {
                let mut all = events::list_events(&self.store, config.guild_id, None, Some(date)).await?;
                all.retain(|e| templates::has_feedback_template(CampMode::Cyprus, e.event_type));
                all
            }
        };

        let mut created = Vec::new();
        for event in &due {
            if let Some(poll) = self.publish_feedback_for_event(config, event, date, now).await? {
                created.push(poll);
            }
        }
        Ok(created)
    }

    /// Publish one feedback poll for an event, deduplicating against any
    /// existing feedback poll for the same event and date.
    async fn publish_feedback_for_event(
        &self,
        config: &GuildConfig,
        event: &Event,
        poll_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Option<PollMeta>> {
        let guild_id = config.guild_id;

        let options = match templates::feedback_options(config.mode, event.event_type) {
            Some(v) => v,
            None => {
                get_logger().debug("No feedback template for event type.", meta! {
                    "GuildID" => guild_id,
                    "EventID" => event.id.clone(),
                    "Type" => event.event_type.display_name(),
                });
                return Ok(None);
            }
        };

        {
            let lock = self.guild_lock(guild_id);
            let _guard = lock.lock().await;

            let existing = polls::polls_by_guild(&self.store, guild_id).await?;
            if existing.iter().any(|p| {
                p.kind == PollKind::Feedback && p.poll_date == poll_date && p.references_event(&event.id)
            }) {
                return Ok(None);
            }
        }

        let question = match config.mode {
            CampMode::Standard => format!("📝 Feedback for {}", event.option_title()),
            CampMode::Cyprus => format!(
                "📝 Feedback: {} - {}",
                event.event_type.display_name(),
                event.title
            ),
        };

        let option_titles: Vec<String> = options.to_vec();
        let posted = self
            .gateway
            .post_poll(guild_id, &question, &option_titles)
            .await
            .map_err(CampPollError::delivery)?;

        let poll = PollMeta {
            id: posted.message_id.to_string(),
            guild_id,
            channel_id: posted.channel_id,
            message_id: posted.message_id,
            kind: PollKind::Feedback,
            poll_date,
            question,
            options: option_titles
                .iter()
                .map(|title| PollOption {
                    event_id: event.id.clone(),
                    title: title.clone(),
                    event_type: event.event_type,
                    votes: Vec::new(),
                })
                .collect(),
            published_at: now,
            closed_at: None,
            close_after: Some(now + Duration::hours(FEEDBACK_WINDOW_HOURS)),
            final_summary: None,
            reminded_users: Vec::new(),
        };

        {
            let lock = self.guild_lock(guild_id);
            let _guard = lock.lock().await;
            polls::save_poll(&self.store, poll.clone()).await?;
        }

        get_logger().info("Published feedback poll.", meta! {
            "GuildID" => guild_id,
            "PollID" => poll.id.clone(),
            "EventID" => event.id.clone(),
        });
        Ok(Some(poll))
    }

    // ---- votes ------------------------------------------------------------

    /// Record a single-choice vote. A re-vote before close replaces the
    /// previous choice.
    pub async fn vote(
        &self,
        poll_id: &str,
        user_id: u64,
        username: &str,
        option_index: usize,
    ) -> Result<()> {
        let poll = polls::get_poll(&self.store, poll_id).await?;
        let lock = self.guild_lock(poll.guild_id);
        let _guard = lock.lock().await;

        let username = username.to_owned();
        polls::update_poll(&self.store, poll_id, move |poll| {
            if !poll.is_open() {
                return Err(CampPollError::PollClosed(poll.id.clone()));
            }
            if option_index >= poll.options.len() {
                return Err(CampPollError::InvalidOption {
                    poll_id: poll.id.clone(),
                    index: option_index,
                });
            }

            poll.record_vote(Voter { user_id, username }, option_index);
            Ok(())
        })
        .await
    }

    // ---- reminders --------------------------------------------------------

    /// Reminder trigger: one DM per roster user who still has unvoted open
    /// attendance polls, aggregating all of them. Feedback polls never count.
    pub async fn remind(&self, config: &GuildConfig, _now: DateTime<Utc>) -> Result<RemindStats> {
        let mut stats = RemindStats::default();
        if !policy::is_enabled(config.mode, TriggerKind::Reminder) {
            return Ok(stats);
        }
        let guild_id = config.guild_id;

        let roster = self
            .gateway
            .roster(guild_id)
            .await
            .map_err(CampPollError::delivery)?;

        let batches: Vec<ReminderBatch> = {
            let lock = self.guild_lock(guild_id);
            let _guard = lock.lock().await;

            let open = polls::open_polls(&self.store, guild_id, Some(PollKind::Attendance)).await?;
            if open.is_empty() {
                return Ok(stats);
            }

            let mut per_user: HashMap<u64, Vec<String>> = HashMap::new();
            for poll in &open {
                let voters = poll.voters();
                for member in &roster {
                    if voters.contains(&member.user_id) {
                        continue;
                    }
                    if poll.reminded_users.contains(&member.user_id) {
                        stats.already_reminded += 1;
                        continue;
                    }
                    per_user
                        .entry(member.user_id)
                        .or_default()
                        .push(poll.question.clone());
                }
            }

            per_user
                .into_iter()
                .map(|(user_id, poll_questions)| ReminderBatch {
                    user_id,
                    poll_questions,
                    deadline: format!("Tomorrow at {}", config.poll_close_time),
                })
                .collect()
        };

        // DMs go out without holding the lock; only confirmed sends are
        // committed as reminded.
        let mut reminded = Vec::new();
        for batch in &batches {
            match self.gateway.send_dm(batch).await {
                Ok(()) => {
                    stats.sent += 1;
                    reminded.push(batch.user_id);
                }
                Err(e) => {
                    stats.failed += 1;
                    get_logger().warn("Reminder DM failed.", meta! {
                        "GuildID" => guild_id,
                        "UserID" => batch.user_id,
                        "Error" => format!("{:#}", e),
                    });
                }
            }
        }

        if !reminded.is_empty() {
            let lock = self.guild_lock(guild_id);
            let _guard = lock.lock().await;
            polls::mark_reminded(&self.store, guild_id, &reminded).await?;
        }

        get_logger().info("Reminder run finished.", meta! {
            "GuildID" => guild_id,
            "Sent" => stats.sent,
            "Failed" => stats.failed,
            "AlreadyReminded" => stats.already_reminded,
        });
        Ok(stats)
    }

    // ---- close ------------------------------------------------------------

    /// Close a poll and emit its summary. Closing an already-closed poll is
    /// an idempotent success returning the summary delivered by the first
    /// close; a failed delivery leaves the poll open for the next fire. Votes
    /// landing while the delivery is in flight stay in the record but not in
    /// the delivered summary.
    pub async fn close_poll(&self, poll_id: &str, now: DateTime<Utc>) -> Result<Summary> {
        let poll = polls::get_poll(&self.store, poll_id).await?;
        let lock = self.guild_lock(poll.guild_id);

        let snapshot = {
            let _guard = lock.lock().await;
            let poll = polls::get_poll(&self.store, poll_id).await?;
            if !poll.is_open() {
                return Ok(poll.final_summary.clone().unwrap_or_else(|| poll.summary()));
            }
            poll
        };

        let summary = snapshot.summary();

        self.gateway
            .end_poll(snapshot.guild_id, snapshot.channel_id, snapshot.message_id)
            .await
            .map_err(CampPollError::delivery)?;
        self.gateway
            .deliver_summary(&summary, &summary.csv())
            .await
            .map_err(CampPollError::delivery)?;

        let frozen = {
            let _guard = lock.lock().await;
            polls::update_poll(&self.store, poll_id, move |poll| {
                if poll.is_open() {
                    poll.closed_at = Some(now);
                    poll.final_summary = Some(summary);
                }
                Ok(poll.final_summary.clone().unwrap_or_else(|| poll.summary()))
            })
            .await?
        };

        get_logger().info("Closed poll.", meta! {
            "GuildID" => snapshot.guild_id,
            "PollID" => snapshot.id.clone(),
            "Votes" => frozen.total_votes(),
        });
        Ok(frozen)
    }

    /// Close trigger: closes every open attendance poll for the guild.
    /// Feedback polls are left to the expiry sweep or an explicit close.
    pub async fn close_open_polls(&self, config: &GuildConfig, now: DateTime<Utc>) -> Result<usize> {
        let open = polls::open_polls(&self.store, config.guild_id, Some(PollKind::Attendance)).await?;

        let mut closed = 0;
        for poll in &open {
            match self.close_poll(&poll.id, now).await {
                Ok(_) => closed += 1,
                Err(e) => {
                    get_logger().error("Failed to close poll.", meta! {
                        "GuildID" => config.guild_id,
                        "PollID" => poll.id.clone(),
                        "Error" => e,
                    });
                }
            }
        }
        Ok(closed)
    }

    /// Sweep: close feedback polls whose 24-hour window has elapsed.
    pub async fn expire_feedback_polls(
        &self,
        config: &GuildConfig,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let open = polls::open_polls(&self.store, config.guild_id, Some(PollKind::Feedback)).await?;

        let mut closed = 0;
        for poll in open
            .iter()
            .filter(|p| p.close_after.map_or(false, |at| at <= now))
        {
            match self.close_poll(&poll.id, now).await {
                Ok(_) => closed += 1,
                Err(e) => {
                    get_logger().error("Failed to expire feedback poll.", meta! {
                        "GuildID" => config.guild_id,
                        "PollID" => poll.id.clone(),
                        "Error" => e,
                    });
                }
            }
        }
        Ok(closed)
    }

    // ---- trigger dispatch -------------------------------------------------

    /// Run the engine transition for one fired trigger. Triggers the guild's
    /// mode disables are silently inert.
    pub async fn dispatch(
        &self,
        config: &GuildConfig,
        kind: TriggerKind,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !policy::is_enabled(config.mode, kind) {
            return Ok(());
        }

        match kind {
            TriggerKind::AttendancePublish => {
                self.publish_attendance(config, now).await?;
            }
            TriggerKind::Reminder => {
                self.remind(config, now).await?;
            }
            TriggerKind::AttendanceClose => {
                self.close_open_polls(config, now).await?;
            }
            TriggerKind::FeedbackPublish => {
                self.publish_feedback(config, now).await?;
            }
        }
        Ok(())
    }
}
