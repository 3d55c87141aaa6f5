//! Timer registry
//!
//! This module provides:
//! - **Commands**: start, update, cancel and cancel-all
//! - **Queries**: snapshots of the active set, point lookups
//! - **Sweep**: the periodic pass that removes expired timers and completes them
//! - **Settings**: the notification and sound toggles, persisted on change
//!
//! All state sits behind one mutex. Side effects (notifications, sound, event
//! delivery) are queued while the lock is held and executed afterwards on a
//! single dispatch thread, so they run in commit order and never stall a
//! command or the sweep.

mod dispatch;
mod sweeper;


use std::collections::VecDeque;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};

use crate::config::{NOTIFICATIONS_KEY, SOUND_KEY, Settings, SettingsStore};
use crate::events::{CancelScope, EventBus, SubscriptionId, TimerEvent};
use crate::notifier::Notifier;
use crate::timer::{Timer, TimerId, format_duration};

use dispatch::Effect;
pub use sweeper::Sweeper;

/// How often the sweep runs
pub const SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Completed timers kept around for `timer()` lookups
const RECENTLY_COMPLETED: usize = 16;

/// Wall-clock source
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Default)]
struct State {
    /// Insertion order, oldest first
    active: Vec<Timer>,
    completed: VecDeque<Timer>,
    settings: Settings,
}

struct Shared {
    state: Mutex<State>,
    // orders settings writes without holding `state` across file IO
    persist_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn SettingsStore>,
    events: Arc<EventBus>,
    effects: Sender<Effect>,
    worker: Option<ThreadId>,
}

/// Handle to the active-timer set. Clones share the same registry.
#[derive(Clone)]
pub struct TimerRegistry {
    shared: Arc<Shared>,
}

impl TimerRegistry {
    pub fn new(notifier: Arc<dyn Notifier>, store: Arc<dyn SettingsStore>) -> Self {
        Self::with_clock(notifier, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let settings = Settings::load(store.as_ref());
        let events = Arc::new(EventBus::new());
        let (tx, rx) = mpsc::channel();
        let worker = dispatch::spawn_worker(rx, notifier, Arc::clone(&events));

        tracing::info!(
            notifications_enabled = settings.notifications_enabled,
            sound_enabled = settings.sound_enabled,
            "Timer registry created"
        );

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    settings,
                    ..State::default()
                }),
                persist_lock: Mutex::new(()),
                clock,
                store,
                events,
                effects: tx,
                worker,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn now(&self) -> DateTime<Utc> {
        self.shared.clock.now()
    }

    fn queue(&self, effect: Effect) {
        if self.shared.effects.send(effect).is_err() {
            tracing::warn!("Dispatch worker is gone, dropping side effect");
        }
    }

    // ─── Commands ────────────────────────────────────────────────────────────

    /// Start a countdown of `duration`.
    ///
    /// Returns `None` without side effects when `duration` is zero.
    pub fn start_timer(&self, duration: Duration, title: impl Into<String>) -> Option<TimerId> {
        let now = self.now();
        let Some(timer) = Timer::new(title, duration, now) else {
            tracing::debug!(?duration, "Ignoring start with unusable duration");
            return None;
        };
        let id = timer.id;

        let mut state = self.lock();
        state.active.push(timer.clone());
        if state.settings.notifications_enabled {
            self.queue(schedule_completion(&timer, now));
            self.queue(Effect::Immediate {
                title: "Timer Started".to_string(),
                body: start_body(&timer),
            });
        }
        self.queue(Effect::Publish(TimerEvent::TimerStarted(timer)));
        drop(state);

        tracing::info!(timer_id = %id, ?duration, "Timer started");
        Some(id)
    }

    /// Rename or re-describe an active timer. Its end time does not move.
    pub fn update_timer(
        &self,
        id: TimerId,
        custom_name: impl Into<String>,
        description: impl Into<String>,
    ) {
        let now = self.now();
        let mut state = self.lock();
        let notifications = state.settings.notifications_enabled;

        let Some(timer) = state
            .active
            .iter_mut()
            .find(|t| t.id == id && t.is_active(now))
        else {
            tracing::debug!(timer_id = %id, "Update for unknown timer ignored");
            return;
        };

        timer.custom_name = custom_name.into();
        timer.description = description.into();
        if notifications {
            let effect = schedule_completion(timer, now);
            self.queue(effect);
        }
        self.queue(Effect::Publish(TimerEvent::TimerUpdated(id)));
        drop(state);

        tracing::debug!(timer_id = %id, "Timer updated");
    }

    /// Remove a timer before it completes.
    ///
    /// Unknown ids are ignored, as are timers already past their end time:
    /// those belong to the sweep and complete normally.
    pub fn cancel_timer(&self, id: TimerId) {
        let now = self.now();
        let mut state = self.lock();
        let Some(index) = state
            .active
            .iter()
            .position(|t| t.id == id && t.is_active(now))
        else {
            tracing::debug!(timer_id = %id, "Cancel for unknown timer ignored");
            return;
        };
        state.active.remove(index);
        self.queue_cancellation(id);
        drop(state);

        tracing::info!(timer_id = %id, "Timer cancelled");
    }

    /// Cancel every active timer, then announce the bulk cancellation once.
    /// Expired timers are left for the sweep to complete.
    pub fn cancel_all_timers(&self) {
        let now = self.now();
        let mut state = self.lock();
        let (removed, expired): (Vec<Timer>, Vec<Timer>) = std::mem::take(&mut state.active)
            .into_iter()
            .partition(|t| t.is_active(now));
        state.active = expired;
        for timer in &removed {
            self.queue_cancellation(timer.id);
        }
        self.queue(Effect::Publish(TimerEvent::TimerCancelled(CancelScope::All)));
        drop(state);

        tracing::info!(count = removed.len(), "All timers cancelled");
    }

    fn queue_cancellation(&self, id: TimerId) {
        self.queue(Effect::CancelScheduled(id));
        self.queue(Effect::Publish(TimerEvent::TimerCancelled(CancelScope::One(id))));
    }

    // ─── Queries ─────────────────────────────────────────────────────────────

    /// Unexpired timers, oldest first. Expired timers never appear here even
    /// if the sweep has not removed them yet.
    pub fn active_timers(&self) -> Vec<Timer> {
        let now = self.now();
        self.lock()
            .active
            .iter()
            .filter(|t| t.is_active(now))
            .cloned()
            .collect()
    }

    /// Look up a timer whether or not it has expired.
    ///
    /// Recently completed timers are still found, so completion handlers can
    /// read their fields. Cancelled timers are not.
    pub fn timer(&self, id: TimerId) -> Option<Timer> {
        let state = self.lock();
        state
            .active
            .iter()
            .chain(state.completed.iter())
            .find(|t| t.id == id)
            .cloned()
    }

    pub fn has_active_timers(&self) -> bool {
        let now = self.now();
        self.lock().active.iter().any(|t| t.is_active(now))
    }

    pub fn settings(&self) -> Settings {
        self.lock().settings
    }

    // ─── Settings ────────────────────────────────────────────────────────────

    /// Flip the notification flag and persist it. Returns the new value.
    ///
    /// Pending completion notifications follow the flag.
    pub fn toggle_notifications(&self) -> bool {
        let now = self.now();
        let _persist = self.persist_guard();
        let mut state = self.lock();
        let enabled = !state.settings.notifications_enabled;
        state.settings.notifications_enabled = enabled;

        for timer in state.active.iter().filter(|t| t.is_active(now)) {
            let effect = if enabled {
                schedule_completion(timer, now)
            } else {
                Effect::CancelScheduled(timer.id)
            };
            self.queue(effect);
        }
        drop(state);
        self.persist(NOTIFICATIONS_KEY, enabled);

        tracing::info!(enabled, "Notifications toggled");
        enabled
    }

    /// Flip the sound flag and persist it. Returns the new value.
    pub fn toggle_sound(&self) -> bool {
        let _persist = self.persist_guard();
        let mut state = self.lock();
        let enabled = !state.settings.sound_enabled;
        state.settings.sound_enabled = enabled;
        drop(state);
        self.persist(SOUND_KEY, enabled);

        tracing::info!(enabled, "Sound toggled");
        enabled
    }

    fn persist_guard(&self) -> MutexGuard<'_, ()> {
        self.shared
            .persist_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, key: &str, value: bool) {
        if let Err(e) = self.shared.store.save_bool(key, value) {
            tracing::warn!(error = %e, key, value, "Failed to persist setting");
        }
    }

    // ─── Sweep ───────────────────────────────────────────────────────────────

    /// Remove every expired timer and queue its completion.
    ///
    /// Removal happens before any side effect is queued, so a timer completes
    /// at most once no matter how sweeps and commands interleave. Returns the
    /// ids completed by this pass.
    pub fn sweep(&self) -> Vec<TimerId> {
        let now = self.now();
        let mut state = self.lock();

        if !state.active.iter().any(|t| !t.is_active(now)) {
            return Vec::new();
        }

        let (expired, still_active): (Vec<Timer>, Vec<Timer>) = std::mem::take(&mut state.active)
            .into_iter()
            .partition(|t| !t.is_active(now));
        state.active = still_active;

        let sound = state.settings.sound_enabled;
        let mut completed = Vec::with_capacity(expired.len());
        for timer in expired {
            if sound {
                self.queue(Effect::Sound);
            }
            self.queue(Effect::Publish(TimerEvent::TimerCompleted {
                id: timer.id,
                display_name: timer.display_name().to_string(),
                description: timer.description.clone(),
            }));
            completed.push(timer.id);

            if state.completed.len() == RECENTLY_COMPLETED {
                state.completed.pop_front();
            }
            state.completed.push_back(timer);
        }
        drop(state);

        tracing::info!(count = completed.len(), "Timers completed");
        completed
    }

    /// Run [`sweep`](Self::sweep) every `period` on a background thread until
    /// the returned handle is stopped or dropped.
    pub fn spawn_sweeper(&self, period: Duration) -> std::io::Result<Sweeper> {
        Sweeper::spawn(Arc::downgrade(&self.shared), period)
    }

    // ─── Events ──────────────────────────────────────────────────────────────

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&TimerEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.events.unsubscribe(id)
    }

    /// Block until every side effect queued so far has been carried out.
    ///
    /// Called from a subscriber callback this returns at once: the callback
    /// runs on the dispatch thread, which cannot wait on itself.
    pub fn flush(&self) {
        if self.shared.worker == Some(thread::current().id()) {
            tracing::debug!("flush() from the dispatch thread ignored");
            return;
        }
        let (tx, rx) = mpsc::channel();
        self.queue(Effect::Barrier(tx));
        let _ = rx.recv();
    }
}

impl std::fmt::Debug for TimerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("TimerRegistry")
            .field("active", &state.active.len())
            .field("settings", &state.settings)
            .finish()
    }
}

/// (Re)schedule the completion banner for `timer` at its end time
fn schedule_completion(timer: &Timer, now: DateTime<Utc>) -> Effect {
    Effect::Schedule {
        id: timer.id,
        title: "Timer Complete".to_string(),
        body: timer.completion_body(),
        delay: timer.remaining(now),
    }
}

fn start_body(timer: &Timer) -> String {
    let ends = timer.end_time.with_timezone(&Local).format("%H:%M");
    format!(
        "{} ({}), ends at {}",
        timer.display_name(),
        format_duration(timer.duration.as_secs()),
        ends
    )
}
