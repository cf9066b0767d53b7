//! Change summaries, store and promotion events, and event sinks.

use crate::key::StoreKey;
use crate::promotion::{GroupPromotionResult, PromotionResult};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;

/// Who changed something and why. Carried in event payloads only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub user: String,
    pub summary: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ChangeSummary {
    pub fn new(user: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            summary: summary.into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// A change made by the system itself.
    pub fn system(summary: impl Into<String>) -> Self {
        Self::new("system", summary)
    }
}

/// What happened to a store definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreChangeType {
    Added,
    Updated,
    Deleted,
}

/// A store definition was added, updated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreUpdatedEvent {
    pub key: StoreKey,
    pub change_type: StoreChangeType,
    pub change: ChangeSummary,
}

/// A promotion finished, successfully or not.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionCompletedEvent {
    pub result: PromotionResult,
}

/// A group promotion (or its rollback) finished.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPromotionCompletedEvent {
    pub result: GroupPromotionResult,
    /// Whether this was a rollback.
    pub rollback: bool,
}

/// Everything published to an [`EventSink`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DepotEvent {
    StoreUpdated(StoreUpdatedEvent),
    PromotionCompleted(PromotionCompletedEvent),
    GroupPromotionCompleted(GroupPromotionCompletedEvent),
}

/// Receiver of store and promotion events.
///
/// `publish` must not block; sinks that need to do real work hand the event
/// off to another task.
pub trait EventSink: Send + Sync + 'static {
    fn publish(&self, event: DepotEvent);
}

/// Writes events to the tracing log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: DepotEvent) {
        match event {
            DepotEvent::StoreUpdated(e) => tracing::info!(
                store = %e.key,
                change_type = ?e.change_type,
                user = %e.change.user,
                summary = %e.change.summary,
                "Store definition changed"
            ),
            DepotEvent::PromotionCompleted(e) => tracing::info!(
                promotion_id = %e.result.id,
                source = %e.result.request.source,
                target = %e.result.request.target,
                completed = e.result.completed.len(),
                skipped = e.result.skipped.len(),
                errors = e.result.errors.len(),
                cancelled = e.result.cancelled,
                "Promotion completed"
            ),
            DepotEvent::GroupPromotionCompleted(e) => tracing::info!(
                promotion_id = %e.result.id,
                source = %e.result.request.source,
                group = %e.result.request.target_group,
                changed = e.result.changed,
                rollback = e.rollback,
                error = e.result.error.as_deref().unwrap_or(""),
                "Group promotion completed"
            ),
        }
    }
}

/// Fans events out over a tokio broadcast channel.
#[derive(Clone, Debug)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<DepotEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DepotEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn publish(&self, event: DepotEvent) {
        // Having no subscribers is not an error.
        if self.sender.send(event).is_err() {
            tracing::trace!("Event dropped, no subscribers");
        }
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: DepotEvent) {}
}
