//! Countdown timers for a menu-bar agent.
//!
//! The [`TimerRegistry`] owns the active timers and completes them from a
//! once-a-second sweep. Presentation code drives it through commands and
//! listens on its [`EventBus`]; notifications and sound go through a
//! [`Notifier`].

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod notifier;
pub mod registry;
pub mod timer;

pub use config::{JsonFileStore, MemoryStore, Settings, SettingsStore};
pub use error::{DispatchError, DurationError, SettingsError};
pub use events::{CancelScope, EventBus, SubscriptionId, TimerEvent};
pub use notifier::{Notifier, NullNotifier, SystemNotifier};
pub use registry::{Clock, SWEEP_PERIOD, Sweeper, SystemClock, TimerRegistry};
pub use timer::{Timer, TimerId};
