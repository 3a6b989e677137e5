//! Settings for the nested-forms engine.
//!
//! This module provides the [`Settings`] struct, which holds engine-wide
//! configuration, and [`LazySettings`], a globally-accessible, lazily
//! initialized settings instance.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// The complete set of engine settings.
///
/// Use [`SETTINGS`] to access the global instance. Every field has a
/// default, so an unconfigured process behaves like `Settings::default()`.
///
/// # Examples
///
/// ```
/// use nested_forms_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.absolute_max_forms, 1000);
/// assert_eq!(settings.pk_field_name, "id");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Whether debug mode is enabled (pretty logs, verbose reports).
    pub debug: bool,

    /// The log level (e.g. "info", "debug", "nested_forms=trace").
    pub log_level: String,

    // ── Formsets ─────────────────────────────────────────────────────

    /// Hard cap on the number of rows a single sub-form may materialize,
    /// regardless of the submitted `TOTAL_FORMS` value.
    pub absolute_max_forms: usize,
    /// The `max_num` used when a declaration does not set one.
    pub default_max_num_forms: usize,
    /// The row field carrying an existing child's primary key.
    pub pk_field_name: String,
    /// The row field whose truthy value marks the row for deletion.
    pub delete_marker: String,

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "info".to_string(),
            absolute_max_forms: 1000,
            default_max_num_forms: 1000,
            pk_field_name: "id".to_string(),
            delete_marker: "DELETE".to_string(),
            extra: HashMap::new(),
        }
    }
}

/// A lazily-initialized, globally-accessible settings container.
///
/// Call [`configure`](LazySettings::configure) once at startup, then use
/// [`get`](LazySettings::get) anywhere. `get` falls back to the defaults if
/// nothing was configured.
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the global settings. Must be called at most once, before
    /// the first [`get`](Self::get).
    ///
    /// # Panics
    ///
    /// Panics if settings have already been configured or read.
    pub fn configure(&self, settings: Settings) {
        self.inner
            .set(settings)
            .expect("Settings have already been configured");
    }

    /// Returns the configured settings, initializing defaults on first use.
    pub fn get(&self) -> &Settings {
        self.inner.get_or_init(Settings::default)
    }

    /// Returns `true` if settings have been configured or read.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: LazySettings = LazySettings::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert!(s.debug);
        assert_eq!(s.log_level, "info");
        assert_eq!(s.absolute_max_forms, 1000);
        assert_eq!(s.default_max_num_forms, 1000);
        assert_eq!(s.pk_field_name, "id");
        assert_eq!(s.delete_marker, "DELETE");
        assert!(s.extra.is_empty());
    }

    #[test]
    fn test_lazy_settings_configure_and_get() {
        let lazy = LazySettings::new();
        assert!(!lazy.is_configured());

        let settings = Settings {
            absolute_max_forms: 50,
            ..Settings::default()
        };

        lazy.configure(settings);
        assert!(lazy.is_configured());
        assert_eq!(lazy.get().absolute_max_forms, 50);
    }

    #[test]
    fn test_lazy_settings_get_falls_back_to_defaults() {
        let lazy = LazySettings::new();
        assert_eq!(lazy.get().pk_field_name, "id");
        assert!(lazy.is_configured());
    }

    #[test]
    #[should_panic(expected = "already been configured")]
    fn test_lazy_settings_double_configure_panics() {
        let lazy = LazySettings::new();
        lazy.configure(Settings::default());
        lazy.configure(Settings::default());
    }
}
