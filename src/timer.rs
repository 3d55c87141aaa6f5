/// Timer model plus the duration helpers the front end uses to build titles
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DurationError;

/// Quick-start presets, in minutes
pub const PRESET_MINUTES: [u64; 8] = [1, 5, 10, 15, 25, 30, 45, 60];

/// Opaque timer identifier, unique per created timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerId(Uuid);

impl TimerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TimerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single countdown.
///
/// `id`, `title`, `duration` and the start/end instants are fixed at creation.
/// Only `custom_name` and `description` change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timer {
    pub id: TimerId,
    pub title: String,
    pub custom_name: String,
    pub description: String,
    pub duration: Duration,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Timer {
    /// Build a timer starting at `now`.
    ///
    /// Returns `None` for a zero duration or one whose end instant cannot be
    /// represented.
    pub fn new(title: impl Into<String>, duration: Duration, now: DateTime<Utc>) -> Option<Self> {
        if duration.is_zero() {
            return None;
        }
        let delta = TimeDelta::from_std(duration).ok()?;
        let end_time = now.checked_add_signed(delta)?;

        Some(Self {
            id: TimerId::new(),
            title: title.into(),
            custom_name: String::new(),
            description: String::new(),
            duration,
            start_time: now,
            end_time,
        })
    }

    /// Custom name when one is set, otherwise the creation title
    pub fn display_name(&self) -> &str {
        if self.custom_name.trim().is_empty() {
            &self.title
        } else {
            &self.custom_name
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.end_time > now
    }

    /// Time left until `end_time`, zero once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.end_time - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Elapsed fraction of the duration, clamped to `[0, 1]`
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = (now - self.start_time).to_std().unwrap_or(Duration::ZERO);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Body text for the completion notification
    pub fn completion_body(&self) -> String {
        if self.description.trim().is_empty() {
            format!("{} is done", self.display_name())
        } else {
            format!("{} is done\n{}", self.display_name(), self.description)
        }
    }
}

/// Title used for a preset of `minutes`
pub fn preset_title(minutes: u64) -> String {
    format_duration(minutes * 60)
}

/// Parse `25m`, `30s`, `1h`, `1m30s`; a bare number means minutes.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let input = input.trim().to_lowercase();

    if let Ok(minutes) = input.parse::<u64>() {
        if minutes == 0 {
            return Err(DurationError::Zero);
        }
        let seconds = minutes.checked_mul(60).ok_or(DurationError::Overflow)?;
        return Ok(Duration::from_secs(seconds));
    }

    let mut total_seconds = 0u64;
    let mut current_number = String::new();

    for ch in input.chars() {
        if ch.is_ascii_digit() {
            current_number.push(ch);
        } else if matches!(ch, 'h' | 'm' | 's') {
            if current_number.is_empty() {
                return Err(DurationError::MissingNumber);
            }
            let number: u64 = current_number
                .parse()
                .map_err(|_| DurationError::Overflow)?;
            let unit = match ch {
                'h' => 3600,
                'm' => 60,
                _ => 1,
            };
            total_seconds = number
                .checked_mul(unit)
                .and_then(|s| total_seconds.checked_add(s))
                .ok_or(DurationError::Overflow)?;
            current_number.clear();
        } else if !ch.is_whitespace() {
            return Err(DurationError::InvalidChar(ch));
        }
    }

    if !current_number.is_empty() {
        return Err(DurationError::MissingUnit);
    }
    if total_seconds == 0 {
        return Err(DurationError::Zero);
    }

    Ok(Duration::from_secs(total_seconds))
}

/// Human title such as `"5 minutes"` or `"1 hour 30 minutes"`
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let remaining_seconds = seconds % 60;

    let parts: Vec<String> = [(hours, "hour"), (minutes, "minute"), (remaining_seconds, "second")]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{} {}{}", n, unit, if n == 1 { "" } else { "s" }))
        .collect();

    if parts.is_empty() {
        "0 seconds".to_string()
    } else {
        parts.join(" ")
    }
}

/// Countdown text for the menu bar: `MM:SS`, or `H:MM:SS` past an hour
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
