//! Logging setup.
//!
//! Logs go to stderr so they do not tear the countdown line on stdout. Set
//! `DEBUG_LOGGING=1` for debug output from this crate, or `RUST_LOG` for full
//! control.

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Install the global subscriber. Later calls are ignored.
pub fn init() {
    let debug_logging = std::env::var("DEBUG_LOGGING").is_ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(debug_logging)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::NONE);

    if tracing_subscriber::registry()
        .with(stderr_layer)
        .with(filter)
        .try_init()
        .is_ok()
    {
        tracing::debug!(debug_logging, "timebar logging initialized");
    }
}

fn filter_directive(debug_logging: bool) -> &'static str {
    if debug_logging {
        "info,timebar=debug"
    } else {
        "warn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_raises_crate_level() {
        assert_eq!(filter_directive(true), "info,timebar=debug");
        assert_eq!(filter_directive(false), "warn");
    }

    #[test]
    fn init_twice_does_not_panic() {
        init();
        init();
    }
}
