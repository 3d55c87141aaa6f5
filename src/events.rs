//! Typed publish/subscribe for registry changes
//!
//! Presentation code subscribes a callback and refreshes itself when a timer
//! starts, changes, is cancelled or completes. Callbacks may run on any
//! thread and always after the change they describe has been committed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::timer::{Timer, TimerId};

/// Which timers a cancellation covered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CancelScope {
    One(TimerId),
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TimerEvent {
    TimerStarted(Timer),
    TimerUpdated(TimerId),
    TimerCancelled(CancelScope),
    TimerCompleted {
        id: TimerId,
        display_name: String,
        description: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&TimerEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: RwLock<BTreeMap<SubscriptionId, Callback>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&TimerEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::new(callback));
        id
    }

    /// Returns false if `id` was not subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Deliver `event` to every subscriber in subscription order.
    ///
    /// The subscriber list is copied first, so a callback may subscribe or
    /// unsubscribe without deadlocking.
    pub fn publish(&self, event: &TimerEvent) {
        let callbacks: Vec<Callback> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();

        tracing::debug!(?event, subscribers = callbacks.len(), "Publishing timer event");
        for callback in callbacks {
            callback(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
