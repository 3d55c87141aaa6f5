//! Error types for timer operations

use std::path::PathBuf;
use thiserror::Error;

/// A notification or sound request the OS side refused.
///
/// Never propagated past the registry: it is logged and the timer lifecycle
/// carries on.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notification rejected: {0}")]
    Notification(String),

    #[error("no sound player succeeded")]
    Sound,
}

/// Errors while reading or writing the settings file
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write settings file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings JSON in {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize settings")]
    Serialize(#[source] serde_json::Error),
}

/// Malformed duration text such as `"5x"` or `"m"`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("invalid duration format, use formats like: 25m, 30s, 1h, 1m30s")]
    MissingNumber,

    #[error("invalid character '{0}' in duration, use formats like: 25m, 30s, 1m30s")]
    InvalidChar(char),

    #[error("duration must end with 'h', 'm' or 's'")]
    MissingUnit,

    #[error("number too large in duration")]
    Overflow,

    #[error("duration must be greater than 0")]
    Zero,
}
