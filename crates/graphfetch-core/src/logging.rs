//! Logging for the graphfetch crates.
//!
//! The pipeline logs through [`tracing`]: the executor opens a span per
//! fetch carrying the root table, tree hash, and id count, and emits debug
//! events around stored-function creation and the raw fallback. This module
//! only installs the process-wide subscriber, formatted according to
//! [`Settings`].

use crate::settings::Settings;

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line human-readable output with source locations.
    Pretty,
    /// Single-line human-readable output.
    Compact,
    /// Structured JSON, one object per event.
    Json,
}

impl LogFormat {
    /// Picks the format for the given settings: pretty while developing,
    /// JSON everywhere else.
    pub const fn for_settings(settings: &Settings) -> Self {
        if settings.debug {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Installs the global tracing subscriber for the settings' default format.
///
/// The filter directive comes from `settings.log_level`. Returns `false`
/// when a subscriber was already installed (test harnesses often bring
/// their own), `true` on success.
pub fn init_tracing(settings: &Settings) -> bool {
    init_tracing_with_format(settings, LogFormat::for_settings(settings))
}

/// Installs the global tracing subscriber with an explicit format.
pub fn init_tracing_with_format(settings: &Settings, format: LogFormat) -> bool {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = match format {
        LogFormat::Pretty => builder
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.is_ok()
}
