//! The Polls+Votes table: flat list of poll records keyed by poll id.

use chrono::{DateTime, Utc};

use crate::error::{CampPollError, Result};
use crate::model::{PollKind, PollMeta};

use super::Store;

const POLLS: &str = "polls";

/// Insert or replace a poll record.
pub async fn save_poll(store: &Store, poll: PollMeta) -> Result<()> {
    store
        .update(POLLS, move |polls: &mut Vec<PollMeta>| {
            match polls.iter_mut().find(|p| p.id == poll.id) {
                Some(existing) => *existing = poll,
                None => polls.push(poll),
            }
        })
        .await
}

pub async fn get_poll(store: &Store, poll_id: &str) -> Result<PollMeta> {
    let polls: Vec<PollMeta> = store.read(POLLS).await?;
    polls
        .into_iter()
        .find(|p| p.id == poll_id)
        .ok_or_else(|| CampPollError::PollNotFound(poll_id.to_owned()))
}

/// Read-modify-write one poll record under the table lock.
pub async fn update_poll<R, F>(store: &Store, poll_id: &str, f: F) -> Result<R>
where
    F: FnOnce(&mut PollMeta) -> Result<R>,
{
    let poll_id = poll_id.to_owned();

    store
        .update(POLLS, move |polls: &mut Vec<PollMeta>| {
            let poll = polls
                .iter_mut()
                .find(|p| p.id == poll_id)
                .ok_or(CampPollError::PollNotFound(poll_id))?;
            f(poll)
        })
        .await?
}

pub async fn polls_by_guild(store: &Store, guild_id: u64) -> Result<Vec<PollMeta>> {
    let polls: Vec<PollMeta> = store.read(POLLS).await?;
    Ok(polls.into_iter().filter(|p| p.guild_id == guild_id).collect())
}

pub async fn open_polls(store: &Store, guild_id: u64, kind: Option<PollKind>) -> Result<Vec<PollMeta>> {
    let mut open = polls_by_guild(store, guild_id).await?;
    open.retain(|p| p.is_open());
    if let Some(kind) = kind {
        open.retain(|p| p.kind == kind);
    }
    Ok(open)
}

/// Record that these users were reminded, on every open attendance poll they
/// have not voted in yet.
pub async fn mark_reminded(store: &Store, guild_id: u64, user_ids: &[u64]) -> Result<()> {
    let user_ids = user_ids.to_vec();

    store
        .update(POLLS, move |polls: &mut Vec<PollMeta>| {
            for poll in polls
                .iter_mut()
                .filter(|p| p.guild_id == guild_id && p.is_open() && p.kind == PollKind::Attendance)
            {
                let voters = poll.voters();
                for &user_id in &user_ids {
                    if !voters.contains(&user_id) && !poll.reminded_users.contains(&user_id) {
                        poll.reminded_users.push(user_id);
                    }
                }
            }
        })
        .await
}

/// Drop closed polls published before the cutoff. Open polls are always kept.
pub async fn prune_closed_before(store: &Store, cutoff: DateTime<Utc>) -> Result<usize> {
    store
        .update(POLLS, move |polls: &mut Vec<PollMeta>| {
            let before = polls.len();
            polls.retain(|p| p.is_open() || p.published_at >= cutoff);
            before - polls.len()
        })
        .await
}
