//! Interface to the chat platform and export layer. Everything behind this
//! trait is an external collaborator: channel posting, DM delivery, CSV
//! attachment upload, and the member roster.

use async_trait::async_trait;

use crate::model::{ReminderBatch, Summary, Voter};

#[derive(Debug, Clone, Copy)]
pub struct PostedPoll {
    pub channel_id: u64,
    pub message_id: u64,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Publish a single-choice poll message; the returned message id becomes
    /// the poll id.
    async fn post_poll(
        &self,
        guild_id: u64,
        question: &str,
        options: &[String],
    ) -> anyhow::Result<PostedPoll>;

    /// End the platform-side poll on close.
    async fn end_poll(&self, guild_id: u64, channel_id: u64, message_id: u64)
        -> anyhow::Result<()>;

    /// One reminder DM per user. Delivery failures are reported to the
    /// guild's alerts channel by the gateway itself.
    async fn send_dm(&self, batch: &ReminderBatch) -> anyhow::Result<()>;

    /// Forward a closed poll's summary and its CSV export to the organiser
    /// channel.
    async fn deliver_summary(&self, summary: &Summary, csv: &str) -> anyhow::Result<()>;

    /// Guild members eligible to vote (bots and organisers already excluded).
    async fn roster(&self, guild_id: u64) -> anyhow::Result<Vec<Voter>>;
}
