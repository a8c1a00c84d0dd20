//! Daily trigger scheduler. Fire times are wall-clock HH:MM in each guild's
//! timezone; they are resolved to UTC instants one day at a time so DST
//! shifts land on the right local time. Delivery is at-least-once — the
//! engine's transitions are idempotent, so a catch-up replay after downtime
//! is safe.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use evlog::meta;
use tokio::time::sleep;

use crate::config::GuildConfig;
use crate::engine::PollEngine;
use crate::error::{CampPollError, Result};
use crate::policy::{self, TriggerKind};
use crate::runtime::get_logger;
use crate::store::{polls, settings};
use crate::timeutil;

/// How often the run loop re-reads guild configs and sweeps expired feedback
/// polls when no trigger is due sooner.
const IDLE_WAKE_SECS: u64 = 60;

/// Closed polls older than this are dropped from the store.
const RETENTION_DAYS: i64 = 30;

/// The next UTC instant strictly after `after` at which this trigger fires
/// for the guild. A local fire time skipped by a DST transition rolls to the
/// next day.
pub fn next_fire(
    config: &GuildConfig,
    kind: TriggerKind,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let tz = config.tz()?;
    let time = policy::trigger_time(config, kind)?;

    let mut date = timeutil::today_in(tz, after);
    for _ in 0..3 {
        if let Some(at) = timeutil::local_instant(date, time, tz) {
            if at > after {
                return Ok(at);
            }
        }
        date += Duration::days(1);
    }

    // Two consecutive skipped days cannot happen in any real zone.
    Err(CampPollError::InvalidTime(format!(
        "{} in {}",
        time, config.timezone
    )))
}

/// Enabled triggers that fired in the window `(since, now]`, latest fire per
/// trigger, ordered chronologically. This is the catch-up set after downtime.
pub fn due_triggers(
    config: &GuildConfig,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<(TriggerKind, DateTime<Utc>)>> {
    let mut due = Vec::new();
    for &kind in policy::enabled_triggers(config.mode) {
        let mut cursor = since;
        let mut latest = None;
        loop {
            let at = next_fire(config, kind, cursor)?;
            if at > now {
                break;
            }
            latest = Some(at);
            cursor = at;
        }
        if let Some(at) = latest {
            due.push((kind, at));
        }
    }
    due.sort_by_key(|(_, at)| *at);
    Ok(due)
}

pub struct Scheduler {
    engine: Arc<PollEngine>,
}

impl Scheduler {
    pub fn new(engine: Arc<PollEngine>) -> Self {
        Scheduler { engine }
    }

    /// One scheduler pass: dispatch every enabled trigger across every guild
    /// that fired in `(since, now]` — several triggers can share one fire
    /// instant — then sweep expired feedback polls and prune old closed
    /// records. Failures are logged and the pass keeps going; nothing here
    /// terminates the scheduler. Returns the earliest upcoming fire instant
    /// for the caller's sleep, or `None` when it could not be computed.
    pub async fn run_pass(
        &self,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let configs = match settings::load_all(self.engine.store()).await {
            Ok(configs) => configs,
            Err(e) => {
                get_logger().error("Could not load guild configs.", meta! {
                    "Error" => e,
                });
                return None;
            }
        };

        for config in &configs {
            let due = match due_triggers(config, since, now) {
                Ok(due) => due,
                Err(e) => {
                    get_logger().error("Could not resolve due triggers.", meta! {
                        "GuildID" => config.guild_id,
                        "Error" => e,
                    });
                    continue;
                }
            };

            for (kind, fired_at) in due {
                if let Err(e) = self.engine.dispatch(config, kind, now).await {
                    get_logger().error("Trigger failed.", meta! {
                        "GuildID" => config.guild_id,
                        "Trigger" => kind.name(),
                        "FiredAt" => fired_at,
                        "Error" => e,
                    });
                }
            }

            if let Err(e) = self.engine.expire_feedback_polls(config, now).await {
                get_logger().error("Feedback expiry sweep failed.", meta! {
                    "GuildID" => config.guild_id,
                    "Error" => e,
                });
            }
        }

        let cutoff = now - Duration::days(RETENTION_DAYS);
        match polls::prune_closed_before(self.engine.store(), cutoff).await {
            Ok(0) => {}
            Ok(removed) => {
                get_logger().info("Pruned old closed polls.", meta! {
                    "Removed" => removed,
                });
            }
            Err(e) => {
                get_logger().error("Poll retention prune failed.", meta! {
                    "Error" => e,
                });
            }
        }

        let mut next: Option<DateTime<Utc>> = None;
        for config in &configs {
            for &kind in policy::enabled_triggers(config.mode) {
                match next_fire(config, kind, now) {
                    Ok(at) => {
                        if next.map_or(true, |best| at < best) {
                            next = Some(at);
                        }
                    }
                    Err(e) => {
                        get_logger().error("Could not schedule trigger.", meta! {
                            "GuildID" => config.guild_id,
                            "Trigger" => kind.name(),
                            "Error" => e,
                        });
                    }
                }
            }
        }
        next
    }

    /// Drive the daily cycle forever. Each pass covers the window since the
    /// previous one, so triggers sharing a fire instant all dispatch; the
    /// first pass replays the last day, catching up fires missed while the
    /// process was down. Configs are re-read every pass, so mode or time
    /// changes apply without a restart.
    pub async fn run(&self) {
        let mut since = Utc::now() - Duration::days(1);

        loop {
            let now = Utc::now();
            let next = self.run_pass(since, now).await;
            since = now;

            let idle = Duration::seconds(IDLE_WAKE_SECS as i64);
            let wait = match next {
                Some(at) => (at - Utc::now()).min(idle),
                None => idle,
            };
            if let Ok(wait) = wait.to_std() {
                sleep(wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::gateway::{Gateway, PostedPoll};
    use crate::model::{EventType, ReminderBatch, Summary, Voter};
    use crate::store::temp_store;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    struct RecordingGateway {
        posts: StdMutex<Vec<u64>>,
        next_message_id: AtomicU64,
    }

    impl RecordingGateway {
        fn new() -> Arc<Self> {
            Arc::new(RecordingGateway {
                posts: StdMutex::new(Vec::new()),
                next_message_id: AtomicU64::new(1000),
            })
        }
    }

    #[async_trait]
    impl Gateway for RecordingGateway {
        async fn post_poll(
            &self,
            guild_id: u64,
            _question: &str,
            _options: &[String],
        ) -> anyhow::Result<PostedPoll> {
            self.posts.lock().unwrap().push(guild_id);
            Ok(PostedPoll {
                channel_id: 1,
                message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
            })
        }

        async fn end_poll(
            &self,
            _guild_id: u64,
            _channel_id: u64,
            _message_id: u64,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn send_dm(&self, _batch: &ReminderBatch) -> anyhow::Result<()> {
            Ok(())
        }

        async fn deliver_summary(&self, _summary: &Summary, _csv: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn roster(&self, _guild_id: u64) -> anyhow::Result<Vec<Voter>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn helsinki_summer_publish_fires_at_utc_plus_three() {
        let config = GuildConfig::standard(1);

        // Before 14:30 local: fires today.
        let next = next_fire(&config, TriggerKind::AttendancePublish, at(2026, 7, 13, 8, 0)).unwrap();
        assert_eq!(next, at(2026, 7, 13, 11, 30));

        // After 14:30 local: fires tomorrow.
        let next = next_fire(&config, TriggerKind::AttendancePublish, at(2026, 7, 13, 12, 0)).unwrap();
        assert_eq!(next, at(2026, 7, 14, 11, 30));
    }

    #[test]
    fn winter_offset_differs_from_summer() {
        let config = GuildConfig::standard(1);

        // Winter Helsinki is UTC+2, so 14:30 local is 12:30 UTC.
        let next = next_fire(&config, TriggerKind::AttendancePublish, at(2026, 1, 15, 8, 0)).unwrap();
        assert_eq!(next, at(2026, 1, 15, 12, 30));
    }

    #[test]
    fn dst_skipped_fire_time_rolls_to_the_next_day() {
        let mut config = GuildConfig::standard(1);
        // Helsinki springs forward 2026-03-29 at 03:00; 03:30 never occurs.
        config.poll_close_time = "03:30".to_owned();

        let next = next_fire(&config, TriggerKind::AttendanceClose, at(2026, 3, 29, 0, 0)).unwrap();
        assert_eq!(next, at(2026, 3, 30, 0, 30));
    }

    #[test]
    fn exact_fire_instant_is_not_returned_again() {
        let config = GuildConfig::standard(1);
        let fire = at(2026, 7, 13, 11, 30);

        let next = next_fire(&config, TriggerKind::AttendancePublish, fire).unwrap();
        assert_eq!(next, at(2026, 7, 14, 11, 30));
    }

    #[test]
    fn due_triggers_covers_the_whole_standard_cycle() {
        let config = GuildConfig::standard(1);

        // Full local day 2026-07-13 in Helsinki (UTC+3): close 06:00, publish
        // 11:30, reminder 16:00, feedback 19:00 UTC.
        let due = due_triggers(&config, at(2026, 7, 13, 0, 0), at(2026, 7, 13, 23, 0)).unwrap();
        let kinds: Vec<TriggerKind> = due.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                TriggerKind::AttendanceClose,
                TriggerKind::AttendancePublish,
                TriggerKind::Reminder,
                TriggerKind::FeedbackPublish,
            ]
        );
        assert_eq!(due[0].1, at(2026, 7, 13, 6, 0));
        assert_eq!(due[3].1, at(2026, 7, 13, 19, 0));
    }

    #[test]
    fn due_triggers_keeps_only_the_latest_fire_per_trigger() {
        let config = GuildConfig::standard(1);

        // Two days of downtime still yields one entry per trigger.
        let due = due_triggers(&config, at(2026, 7, 11, 0, 0), at(2026, 7, 13, 23, 0)).unwrap();
        assert_eq!(due.len(), 4);
        assert_eq!(due[1].1, at(2026, 7, 13, 11, 30));
    }

    #[test]
    fn coincident_trigger_times_are_both_due() {
        let mut config = GuildConfig::standard(1);
        config.reminder_time = "22:00".to_owned();

        // Reminder and feedback publish now share 22:00 local (19:00 UTC);
        // neither swallows the other.
        let due = due_triggers(&config, at(2026, 7, 13, 0, 0), at(2026, 7, 13, 23, 0)).unwrap();
        let shared: Vec<&(TriggerKind, DateTime<Utc>)> = due
            .iter()
            .filter(|(_, fired)| *fired == at(2026, 7, 13, 19, 0))
            .collect();
        assert_eq!(shared.len(), 2);
    }

    #[test]
    fn cyprus_guild_schedules_feedback_only() {
        let config = GuildConfig::cyprus(1);

        let due = due_triggers(&config, at(2026, 7, 13, 0, 0), at(2026, 7, 13, 23, 0)).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, TriggerKind::FeedbackPublish);
        // 23:00 Nicosia summer time is 20:00 UTC.
        assert_eq!(due[0].1, at(2026, 7, 13, 20, 0));
    }

    #[test]
    fn nothing_due_in_an_empty_window() {
        let config = GuildConfig::standard(1);
        let due = due_triggers(&config, at(2026, 7, 13, 13, 0), at(2026, 7, 13, 13, 30)).unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn pass_dispatches_every_guild_sharing_a_fire_instant() {
        let store = Arc::new(temp_store());
        let gateway = RecordingGateway::new();
        let engine = Arc::new(PollEngine::new(store.clone(), gateway.clone()));
        let scheduler = Scheduler::new(engine.clone());

        // Two guilds on identical default times, each with a pollable event
        // for tomorrow, so both publishes resolve to 11:30 UTC.
        for guild_id in [1u64, 2] {
            let config = GuildConfig::standard(guild_id);
            settings::save_config(&store, config.clone()).await.unwrap();
            engine
                .create_event(
                    &config,
                    "Graphs",
                    NaiveDate::from_ymd_opt(2026, 7, 14).unwrap(),
                    EventType::Lecture,
                    false,
                    at(2026, 7, 13, 8, 0),
                )
                .await
                .unwrap();
        }

        let next = scheduler
            .run_pass(at(2026, 7, 13, 11, 0), at(2026, 7, 13, 11, 30))
            .await;

        let mut posts = gateway.posts.lock().unwrap().clone();
        posts.sort_unstable();
        assert_eq!(posts, vec![1, 2]);

        // Next upcoming fire is the 16:00 UTC reminder.
        assert_eq!(next, Some(at(2026, 7, 13, 16, 0)));
    }

    #[tokio::test]
    async fn pass_survives_a_corrupt_settings_file() {
        let store = Arc::new(temp_store());
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(store.dir().join("guild_settings.json"), "{not json").unwrap();

        let gateway = RecordingGateway::new();
        let engine = Arc::new(PollEngine::new(store, gateway.clone()));
        let scheduler = Scheduler::new(engine);

        let next = scheduler
            .run_pass(at(2026, 7, 13, 11, 0), at(2026, 7, 13, 11, 30))
            .await;

        assert_eq!(next, None);
        assert!(gateway.posts.lock().unwrap().is_empty());
    }
}
