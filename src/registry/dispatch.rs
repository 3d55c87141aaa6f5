//! Ordered side-effect worker
//!
//! The registry queues effects while holding its lock; this thread carries
//! them out afterwards. Failures are logged and swallowed.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::events::{EventBus, TimerEvent};
use crate::notifier::Notifier;
use crate::timer::TimerId;

#[derive(Debug)]
pub(super) enum Effect {
    Schedule {
        id: TimerId,
        title: String,
        body: String,
        delay: Duration,
    },
    CancelScheduled(TimerId),
    Immediate {
        title: String,
        body: String,
    },
    Sound,
    Publish(TimerEvent),
    /// Signals once everything queued before it has run
    Barrier(Sender<()>),
}

/// Start the worker. It exits once every sender has been dropped.
///
/// Returns the worker's thread id, or `None` if it could not be started.
pub(super) fn spawn_worker(
    rx: Receiver<Effect>,
    notifier: Arc<dyn Notifier>,
    events: Arc<EventBus>,
) -> Option<ThreadId> {
    let spawned = thread::Builder::new()
        .name("timebar-dispatch".to_string())
        .spawn(move || {
            while let Ok(effect) = rx.recv() {
                // A panicking subscriber must not take later effects down with it
                if catch_unwind(AssertUnwindSafe(|| apply(effect, notifier.as_ref(), &events))).is_err() {
                    tracing::warn!("Side effect panicked");
                }
            }
            tracing::debug!("Dispatch worker stopped");
        });

    match spawned {
        Ok(handle) => Some(handle.thread().id()),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to start dispatch worker, side effects disabled");
            None
        }
    }
}

fn apply(effect: Effect, notifier: &dyn Notifier, events: &EventBus) {
    let result = match effect {
        Effect::Schedule {
            id,
            title,
            body,
            delay,
        } => notifier.schedule_delayed_notification(id, &title, &body, delay),
        Effect::CancelScheduled(id) => notifier.cancel_scheduled_notification(id),
        Effect::Immediate { title, body } => notifier.fire_immediate_notification(&title, &body),
        Effect::Sound => notifier.play_completion_sound(),
        Effect::Publish(event) => {
            events.publish(&event);
            Ok(())
        }
        Effect::Barrier(done) => {
            let _ = done.send(());
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::warn!(error = %e, "Notification dispatch failed");
    }
}
