//! camppoll — poll lifecycle engine for training-camp attendance and
//! feedback. Events are scheduled per guild; daily timezone-aware triggers
//! publish attendance polls for tomorrow, remind non-voters, close polls into
//! CSV-backed summaries, and run nightly feedback polls. The chat platform
//! sits behind the [`gateway::Gateway`] trait.

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod model;
pub mod policy;
pub mod runtime;
pub mod scheduler;
pub mod store;
pub mod templates;
pub mod timeutil;

pub use config::{CampMode, GuildConfig};
pub use engine::{PollEngine, RemindStats, MAX_POLL_OPTIONS};
pub use error::{CampPollError, Result};
pub use gateway::{Gateway, PostedPoll};
pub use model::{Event, EventType, PollKind, PollMeta, ReminderBatch, Summary, Voter};
pub use policy::TriggerKind;
pub use scheduler::Scheduler;
pub use store::Store;
