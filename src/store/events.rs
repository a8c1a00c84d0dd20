//! The Events table: flat list keyed by event id, with the per-guild
//! (date, title, type) duplicate guard enforced on every insert and edit.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{CampPollError, Result};
use crate::model::{Event, EventType};

use super::Store;

const EVENTS: &str = "events";

pub async fn add_event(
    store: &Store,
    guild_id: u64,
    title: &str,
    date: NaiveDate,
    event_type: EventType,
    feedback_only: bool,
    now: DateTime<Utc>,
) -> Result<Event> {
    let event = Event {
        id: Uuid::new_v4().to_string(),
        guild_id,
        title: title.trim().to_owned(),
        date,
        event_type,
        feedback_only,
        created_at: now,
    };

    store
        .update(EVENTS, move |events: &mut Vec<Event>| {
            if events
                .iter()
                .any(|e| e.same_identity(guild_id, date, &event.title, event_type))
            {
                return Err(CampPollError::Duplicate {
                    date,
                    title: event.title.clone(),
                    event_type,
                });
            }

            events.push(event.clone());
            Ok(event)
        })
        .await?
}

pub async fn get_event(store: &Store, event_id: &str) -> Result<Event> {
    let events: Vec<Event> = store.read(EVENTS).await?;
    events
        .into_iter()
        .find(|e| e.id == event_id)
        .ok_or_else(|| CampPollError::EventNotFound(event_id.to_owned()))
}

/// Change an event's date and/or title. The type is part of the identity and
/// never changes. Rejected when the new identity collides with a different
/// event in the same guild.
pub async fn edit_event(
    store: &Store,
    event_id: &str,
    date: NaiveDate,
    title: &str,
) -> Result<Event> {
    let event_id = event_id.to_owned();
    let title = title.trim().to_owned();

    store
        .update(EVENTS, move |events: &mut Vec<Event>| {
            let index = events
                .iter()
                .position(|e| e.id == event_id)
                .ok_or_else(|| CampPollError::EventNotFound(event_id.clone()))?;

            let (guild_id, event_type) = (events[index].guild_id, events[index].event_type);
            if events
                .iter()
                .any(|e| e.id != event_id && e.same_identity(guild_id, date, &title, event_type))
            {
                return Err(CampPollError::Duplicate {
                    date,
                    title,
                    event_type,
                });
            }

            events[index].date = date;
            events[index].title = title;
            Ok(events[index].clone())
        })
        .await?
}

pub async fn delete_event(store: &Store, event_id: &str) -> Result<Event> {
    let event_id = event_id.to_owned();

    store
        .update(EVENTS, move |events: &mut Vec<Event>| {
            let index = events
                .iter()
                .position(|e| e.id == event_id)
                .ok_or_else(|| CampPollError::EventNotFound(event_id.clone()))?;
            Ok(events.remove(index))
        })
        .await?
}

/// Guild events, optionally narrowed by type and date, in creation order.
pub async fn list_events(
    store: &Store,
    guild_id: u64,
    event_type: Option<EventType>,
    date: Option<NaiveDate>,
) -> Result<Vec<Event>> {
    let events: Vec<Event> = store.read(EVENTS).await?;

    let mut matched: Vec<Event> = events
        .into_iter()
        .filter(|e| e.guild_id == guild_id)
        .filter(|e| event_type.map_or(true, |t| e.event_type == t))
        .filter(|e| date.map_or(true, |d| e.date == d))
        .collect();
    matched.sort_by_key(|e| e.created_at);

    Ok(matched)
}

/// Candidates for a publish trigger: the guild's events on `date`, restricted
/// to pollable types when asked, and filtered on the feedback-only flag.
pub async fn due_events(
    store: &Store,
    guild_id: u64,
    date: NaiveDate,
    pollable_only: bool,
    feedback_only: Option<bool>,
) -> Result<Vec<Event>> {
    let mut due = list_events(store, guild_id, None, Some(date)).await?;
    due.retain(|e| !pollable_only || e.event_type.is_pollable());
    if let Some(flag) = feedback_only {
        due.retain(|e| e.feedback_only == flag);
    }
    Ok(due)
}
