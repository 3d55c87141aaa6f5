//! Desktop notifications and the completion sound
//!
//! Every call is best-effort. The registry logs a [`DispatchError`] and moves
//! on; nothing here can hold up a timer's lifecycle.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use notify_rust::Notification;

use crate::error::DispatchError;
use crate::timer::TimerId;

const APP_NAME: &str = "timebar";

#[cfg(target_os = "macos")]
const SOUND_PLAYERS: &[(&str, &[&str])] = &[(
    "afplay",
    &[
        "/System/Library/Sounds/Glass.aiff",
        "/System/Library/Sounds/Ping.aiff",
        "/System/Library/Sounds/Pop.aiff",
    ],
)];

#[cfg(not(target_os = "macos"))]
const SOUND_PLAYERS: &[(&str, &[&str])] = &[
    (
        "paplay",
        &[
            "/usr/share/sounds/freedesktop/stereo/complete.oga",
            "/usr/share/sounds/gnome/default/alerts/glass.ogg",
        ],
    ),
    (
        "aplay",
        &[
            "/usr/share/sounds/alsa/Front_Left.wav",
            "/usr/share/sounds/sound-icons/bell.wav",
        ],
    ),
];

/// Sink for everything user-visible that happens outside the registry
pub trait Notifier: Send + Sync {
    /// Deliver a notification for `id` after `delay`, replacing any pending one
    fn schedule_delayed_notification(
        &self,
        id: TimerId,
        title: &str,
        body: &str,
        delay: Duration,
    ) -> Result<(), DispatchError>;

    /// Drop the pending notification for `id`, if any
    fn cancel_scheduled_notification(&self, id: TimerId) -> Result<(), DispatchError>;

    fn fire_immediate_notification(&self, title: &str, body: &str) -> Result<(), DispatchError>;

    fn play_completion_sound(&self) -> Result<(), DispatchError>;
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn schedule_delayed_notification(
        &self,
        _id: TimerId,
        _title: &str,
        _body: &str,
        _delay: Duration,
    ) -> Result<(), DispatchError> {
        Ok(())
    }

    fn cancel_scheduled_notification(&self, _id: TimerId) -> Result<(), DispatchError> {
        Ok(())
    }

    fn fire_immediate_notification(&self, _title: &str, _body: &str) -> Result<(), DispatchError> {
        Ok(())
    }

    fn play_completion_sound(&self) -> Result<(), DispatchError> {
        Ok(())
    }
}

type Deliver = Arc<dyn Fn(&str, &str) -> Result<(), DispatchError> + Send + Sync>;

#[derive(Debug)]
struct Pending {
    due: Instant,
    title: String,
    body: String,
}

#[derive(Debug, Default)]
struct Schedule {
    pending: HashMap<TimerId, Pending>,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Scheduler {
    schedule: Mutex<Schedule>,
    wake: Condvar,
}

impl Scheduler {
    fn lock(&self) -> MutexGuard<'_, Schedule> {
        self.schedule.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Desktop notifications through `notify-rust`, sound through the platform
/// command-line player.
///
/// Scheduled notifications live in a deadline table served by one scheduler
/// thread per notifier. Scheduling, rescheduling and cancelling only edit the
/// table and wake that thread.
pub struct SystemNotifier {
    scheduler: Arc<Scheduler>,
    deliver: Deliver,
    running: bool,
}

impl SystemNotifier {
    pub fn new() -> Self {
        Self::with_delivery(Arc::new(show_desktop))
    }

    fn with_delivery(deliver: Deliver) -> Self {
        let scheduler = Arc::new(Scheduler::default());

        let thread_scheduler = Arc::clone(&scheduler);
        let thread_deliver = Arc::clone(&deliver);
        let running = match thread::Builder::new()
            .name("timebar-notify".to_string())
            .spawn(move || run_scheduler(&thread_scheduler, thread_deliver.as_ref()))
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to start notification scheduler");
                false
            }
        };

        Self {
            scheduler,
            deliver,
            running,
        }
    }

    fn pending_count(&self) -> usize {
        self.scheduler.lock().pending.len()
    }
}

impl Default for SystemNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SystemNotifier {
    fn drop(&mut self) {
        self.scheduler.lock().shutdown = true;
        self.scheduler.wake.notify_all();
    }
}

impl std::fmt::Debug for SystemNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemNotifier")
            .field("pending", &self.pending_count())
            .field("running", &self.running)
            .finish()
    }
}

fn show_desktop(title: &str, body: &str) -> Result<(), DispatchError> {
    Notification::new()
        .appname(APP_NAME)
        .summary(title)
        .body(body)
        .show()
        .map(|_| ())
        .map_err(|e| DispatchError::Notification(e.to_string()))
}

/// Deliver due entries, then sleep until the next deadline or a wake-up.
fn run_scheduler(
    scheduler: &Scheduler,
    deliver: &(dyn Fn(&str, &str) -> Result<(), DispatchError> + Send + Sync),
) {
    let mut schedule = scheduler.lock();
    loop {
        if schedule.shutdown {
            break;
        }

        let now = Instant::now();
        let due_ids: Vec<TimerId> = schedule
            .pending
            .iter()
            .filter(|(_, p)| p.due <= now)
            .map(|(id, _)| *id)
            .collect();

        if !due_ids.is_empty() {
            let mut due: Vec<(TimerId, Pending)> = due_ids
                .into_iter()
                .filter_map(|id| schedule.pending.remove(&id).map(|p| (id, p)))
                .collect();
            due.sort_by_key(|(_, p)| p.due);
            drop(schedule);

            for (id, pending) in due {
                if let Err(e) = deliver(&pending.title, &pending.body) {
                    tracing::warn!(error = %e, timer_id = %id, "Scheduled notification failed");
                }
            }
            schedule = scheduler.lock();
            continue;
        }

        let next = schedule.pending.values().map(|p| p.due).min();
        schedule = match next {
            Some(next) => scheduler
                .wake
                .wait_timeout(schedule, next - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0),
            None => scheduler
                .wake
                .wait(schedule)
                .unwrap_or_else(|e| e.into_inner()),
        };
    }
    tracing::debug!("Notification scheduler stopped");
}

impl Notifier for SystemNotifier {
    fn schedule_delayed_notification(
        &self,
        id: TimerId,
        title: &str,
        body: &str,
        delay: Duration,
    ) -> Result<(), DispatchError> {
        if !self.running {
            return Err(DispatchError::Notification(
                "notification scheduler not running".to_string(),
            ));
        }
        let due = Instant::now()
            .checked_add(delay)
            .ok_or_else(|| DispatchError::Notification("delay out of range".to_string()))?;

        self.scheduler.lock().pending.insert(
            id,
            Pending {
                due,
                title: title.to_string(),
                body: body.to_string(),
            },
        );
        self.scheduler.wake.notify_all();
        Ok(())
    }

    fn cancel_scheduled_notification(&self, id: TimerId) -> Result<(), DispatchError> {
        if self.scheduler.lock().pending.remove(&id).is_some() {
            self.scheduler.wake.notify_all();
        }
        Ok(())
    }

    fn fire_immediate_notification(&self, title: &str, body: &str) -> Result<(), DispatchError> {
        (self.deliver)(title, body)
    }

    fn play_completion_sound(&self) -> Result<(), DispatchError> {
        for (player, sounds) in SOUND_PLAYERS {
            for sound in sounds.iter().filter(|s| Path::new(s).exists()) {
                // Player runs detached; a spawned child counts as played
                if Command::new(player).arg(sound).spawn().is_ok() {
                    return Ok(());
                }
            }
        }

        print!("\x07");
        std::io::Write::flush(&mut std::io::stdout()).map_err(|_| DispatchError::Sound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn recording() -> (SystemNotifier, mpsc::Receiver<(String, String)>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let notifier = SystemNotifier::with_delivery(Arc::new(move |title: &str, body: &str| {
            let _ = tx.lock().unwrap().send((title.to_string(), body.to_string()));
            Ok(())
        }));
        (notifier, rx)
    }

    #[cfg(target_os = "linux")]
    fn thread_count() -> usize {
        std::fs::read_dir("/proc/self/task").map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn cancel_clears_pending_entry() {
        let (notifier, _rx) = recording();
        let id = TimerId::new();
        notifier
            .schedule_delayed_notification(id, "t", "b", Duration::from_secs(3600))
            .unwrap();
        assert_eq!(notifier.pending_count(), 1);

        notifier.cancel_scheduled_notification(id).unwrap();
        assert_eq!(notifier.pending_count(), 0);
    }

    #[test]
    fn reschedule_replaces_pending_text() {
        let (notifier, rx) = recording();
        let id = TimerId::new();
        notifier
            .schedule_delayed_notification(id, "Timer Complete", "old", Duration::from_millis(100))
            .unwrap();
        notifier
            .schedule_delayed_notification(id, "Timer Complete", "new", Duration::from_millis(100))
            .unwrap();
        assert_eq!(notifier.pending_count(), 1);

        let (_, body) = rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(body, "new");
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn cancelled_notification_is_never_delivered() {
        let (notifier, rx) = recording();
        let kept = TimerId::new();
        let dropped = TimerId::new();
        notifier
            .schedule_delayed_notification(dropped, "t", "dropped", Duration::from_millis(50))
            .unwrap();
        notifier
            .schedule_delayed_notification(kept, "t", "kept", Duration::from_millis(150))
            .unwrap();
        notifier.cancel_scheduled_notification(dropped).unwrap();

        let (_, body) = rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(body, "kept");
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert_eq!(notifier.pending_count(), 0);
    }

    #[test]
    fn due_notifications_arrive_in_deadline_order() {
        let (notifier, rx) = recording();
        notifier
            .schedule_delayed_notification(TimerId::new(), "t", "second", Duration::from_millis(200))
            .unwrap();
        notifier
            .schedule_delayed_notification(TimerId::new(), "t", "first", Duration::from_millis(50))
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(3)).unwrap().1, "first");
        assert_eq!(rx.recv_timeout(Duration::from_secs(3)).unwrap().1, "second");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn scheduling_does_not_spawn_threads() {
        let (notifier, _rx) = recording();
        let before = thread_count();

        let id = TimerId::new();
        for n in 0..1000 {
            notifier
                .schedule_delayed_notification(id, "t", &format!("{n}"), Duration::from_secs(3600))
                .unwrap();
            notifier
                .schedule_delayed_notification(TimerId::new(), "t", "other", Duration::from_secs(3600))
                .unwrap();
        }
        notifier.cancel_scheduled_notification(id).unwrap();

        // other tests run concurrently, so allow for their threads
        let after = thread_count();
        assert!(after < before + 200, "threads before={before} after={after}");
        assert_eq!(notifier.pending_count(), 1000);
    }

    #[test]
    fn cancel_unknown_id_is_ok() {
        assert!(SystemNotifier::new().cancel_scheduled_notification(TimerId::new()).is_ok());
    }
}
