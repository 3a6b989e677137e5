//! Core error types for nested-forms.
//!
//! [`FormsError`] covers the failures that escape the engine: data-layer
//! errors, configuration errors, and suspicious input. Per-field and
//! per-row validation problems never travel through this type; they are
//! recorded in the owning form's error maps instead.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Represents a validation error with optional field-level errors.
///
/// Validation errors can be either simple (a single message) or compound
/// (containing per-field error lists).
///
/// # Examples
///
/// ```
/// use nested_forms_core::error::ValidationError;
///
/// // Simple validation error
/// let err = ValidationError::new("This field is required.", "required");
///
/// // Field-level validation errors
/// let mut field_errors = std::collections::HashMap::new();
/// field_errors.insert(
///     "email".to_string(),
///     vec![ValidationError::new("Invalid email address.", "invalid")],
/// );
/// let err = ValidationError::with_field_errors(field_errors);
/// ```
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The primary error message.
    pub message: String,
    /// A short code identifying the type of validation failure (e.g. "required", "invalid").
    pub code: String,
    /// Additional parameters providing context for the error message.
    pub params: HashMap<String, String>,
    /// Per-field validation errors, keyed by field name.
    pub field_errors: HashMap<String, Vec<Self>>,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a message and code.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            params: HashMap::new(),
            field_errors: HashMap::new(),
        }
    }

    /// Creates a `ValidationError` containing per-field errors.
    pub fn with_field_errors(field_errors: HashMap<String, Vec<Self>>) -> Self {
        Self {
            message: String::new(),
            code: String::new(),
            params: HashMap::new(),
            field_errors,
        }
    }

    /// Adds a parameter to this validation error.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.message.is_empty() {
            write!(f, "{}", self.message)?;
        } else if !self.field_errors.is_empty() {
            let mut first = true;
            for (field, errors) in &self.field_errors {
                for error in errors {
                    if !first {
                        write!(f, "; ")?;
                    }
                    write!(f, "{field}: {error}")?;
                    first = false;
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// The primary error type for nested-forms.
///
/// Only structural problems and data-layer failures are represented here.
/// A `ConfigurationError` is fatal for the form being constructed; data-layer
/// errors are propagated to the caller, who owns the enclosing transaction.
#[derive(Error, Debug)]
pub enum FormsError {
    // ── Data layer ───────────────────────────────────────────────────

    /// A lookup by primary key found no record.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// A generic storage error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A storage integrity constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    // ── Validation ───────────────────────────────────────────────────

    /// One or more fields failed validation.
    #[error("Validation error: {0}")]
    ValidationError(ValidationError),

    // ── Configuration ────────────────────────────────────────────────

    /// A sub-form declaration cannot be resolved against the model schema.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The engine is improperly configured (settings, registry).
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    // ── Security ─────────────────────────────────────────────────────

    /// A potentially malicious or illegal operation was attempted.
    #[error("Suspicious operation: {0}")]
    SuspiciousOperation(String),
}

impl FormsError {
    /// Returns `true` for errors that indicate a broken declaration or
    /// settings rather than a runtime failure.
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationError(_) | Self::ImproperlyConfigured(_)
        )
    }

    /// Returns `true` if this is a "record not found" error.
    pub const fn is_does_not_exist(&self) -> bool {
        matches!(self, Self::DoesNotExist(_))
    }
}

/// A convenience type alias for `Result<T, FormsError>`.
pub type FormsResult<T> = Result<T, FormsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_simple() {
        let err = ValidationError::new("This field is required.", "required");
        assert_eq!(err.to_string(), "This field is required.");
    }

    #[test]
    fn test_validation_error_display_field_errors() {
        let mut field_errors = HashMap::new();
        field_errors.insert(
            "email".to_string(),
            vec![ValidationError::new("Invalid email.", "invalid")],
        );
        let err = ValidationError::with_field_errors(field_errors);
        assert!(err.to_string().contains("email: Invalid email."));
    }

    #[test]
    fn test_validation_error_with_param() {
        let err = ValidationError::new("Too short.", "min_length").with_param("min", "8");
        assert_eq!(err.params.get("min").unwrap(), "8");
    }

    #[test]
    fn test_error_classification() {
        assert!(FormsError::ConfigurationError("x".into()).is_configuration());
        assert!(FormsError::ImproperlyConfigured("x".into()).is_configuration());
        assert!(!FormsError::DatabaseError("x".into()).is_configuration());
        assert!(FormsError::DoesNotExist("contact 3".into()).is_does_not_exist());
        assert!(!FormsError::IntegrityError("x".into()).is_does_not_exist());
    }

    #[test]
    fn test_forms_error_display() {
        let err = FormsError::DoesNotExist("contact 7".into());
        assert_eq!(err.to_string(), "Object does not exist: contact 7");
    }
}
