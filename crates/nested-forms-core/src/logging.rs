//! Logging integration for nested-forms.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating per-form spans.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The log level is read from `settings.log_level`. In debug mode a pretty,
/// human-readable format is used; otherwise a structured JSON format is used.
/// Installing a subscriber twice is a no-op.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for one form or sub-form prefix.
///
/// Everything logged while synchronizing or saving under the span carries
/// the prefix, which makes deep trees readable.
///
/// # Examples
///
/// ```
/// use nested_forms_core::logging::form_span;
///
/// let span = form_span("contacts-0-phones");
/// let _guard = span.enter();
/// tracing::debug!("synchronizing");
/// ```
pub fn form_span(prefix: &str) -> tracing::Span {
    tracing::debug_span!("form", prefix = prefix)
}
