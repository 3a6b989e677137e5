//! Form field definitions and type-level validation.
//!
//! Each [`FormFieldDef`] describes a single form field: its type, whether it
//! is required, its initial value, and extra validators. The
//! [`FormFieldType`] enum drives the parsing and coercion performed by
//! [`clean_field_value`], and [`field_has_changed`] compares a submitted raw
//! value against the field's initial value.

use std::collections::HashMap;
use std::sync::LazyLock;

use nested_forms_core::FormsError;
use nested_forms_db::validators::Validator;
use nested_forms_db::value::Value;
use regex::Regex;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").expect("valid regex")
});
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").expect("valid regex"));
static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("valid regex"));

/// Defines the type of a form field, including type-specific parameters.
#[derive(Debug, Clone)]
pub enum FormFieldType {
    /// A character (string) field.
    Char {
        /// Minimum length (characters).
        min_length: Option<usize>,
        /// Maximum length (characters).
        max_length: Option<usize>,
        /// Whether to strip leading/trailing whitespace.
        strip: bool,
    },
    /// An integer field.
    Integer {
        /// Minimum allowed value.
        min_value: Option<i64>,
        /// Maximum allowed value.
        max_value: Option<i64>,
    },
    /// A floating-point field.
    Float {
        /// Minimum allowed value.
        min_value: Option<f64>,
        /// Maximum allowed value.
        max_value: Option<f64>,
    },
    /// A fixed-precision decimal field.
    Decimal {
        /// Maximum total number of digits.
        max_digits: u32,
        /// Number of digits after the decimal point.
        decimal_places: u32,
    },
    /// A checkbox. Absent means `false`.
    Boolean,
    /// A date field (YYYY-MM-DD).
    Date,
    /// A date-time field (YYYY-MM-DDTHH:MM:SS).
    DateTime,
    /// A time field (HH:MM:SS).
    Time,
    /// An email address field.
    Email,
    /// A URL field.
    Url,
    /// A UUID field.
    Uuid,
    /// A slug field (letters, numbers, hyphens, underscores).
    Slug,
    /// A single-choice field.
    Choice {
        /// Available choices as `(value, display_label)` pairs.
        choices: Vec<(String, String)>,
    },
    /// A file upload field. The raw value is the uploaded file name.
    File {
        /// Maximum file size in bytes.
        max_size: Option<usize>,
        /// Allowed file extensions (e.g. `["jpg", "png"]`).
        allowed_extensions: Vec<String>,
    },
    /// A JSON field.
    Json,
}

impl FormFieldType {
    /// A plain stripped character field with no length limits.
    pub const fn char() -> Self {
        Self::Char {
            min_length: None,
            max_length: None,
            strip: true,
        }
    }

    /// Returns `true` for file upload fields, whose raw value comes from
    /// the file key-space rather than the text submission.
    pub const fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }
}

/// Complete definition of a form field.
#[derive(Debug)]
pub struct FormFieldDef {
    /// The field name; submitted as `<prefix>-<name>`.
    pub name: String,
    /// The field type, controlling parsing and coercion.
    pub field_type: FormFieldType,
    /// Whether this field is required.
    pub required: bool,
    /// Default value used when the form is unbound.
    pub initial: Option<Value>,
    /// Help text displayed alongside the field.
    pub help_text: String,
    /// Human-readable label.
    pub label: String,
    /// Additional validators applied after type coercion.
    pub validators: Vec<Box<dyn Validator>>,
    /// Custom error messages keyed by error code.
    pub error_messages: HashMap<String, String>,
    /// Whether the field is disabled. A disabled field ignores submitted
    /// data and always cleans to its initial value.
    pub disabled: bool,
}

impl FormFieldDef {
    /// Creates a new `FormFieldDef`. The field is required by default.
    pub fn new(name: impl Into<String>, field_type: FormFieldType) -> Self {
        let name = name.into();
        let label = name.replace('_', " ");
        Self {
            name,
            field_type,
            required: true,
            initial: None,
            help_text: String::new(),
            label,
            validators: Vec::new(),
            error_messages: HashMap::new(),
            disabled: false,
        }
    }

    /// Sets whether this field is required.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets the initial value.
    #[must_use]
    pub fn initial(mut self, value: Value) -> Self {
        self.initial = Some(value);
        self
    }

    /// Sets the help text.
    #[must_use]
    pub fn help_text(mut self, text: impl Into<String>) -> Self {
        self.help_text = text.into();
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Adds a validator.
    #[must_use]
    pub fn validator(mut self, validator: Box<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Sets a custom error message for a given code.
    #[must_use]
    pub fn error_message(mut self, code: impl Into<String>, msg: impl Into<String>) -> Self {
        self.error_messages.insert(code.into(), msg.into());
        self
    }

    /// Sets whether this field is disabled.
    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

/// Extracts the user-facing message from a validator failure.
pub(crate) fn error_message(error: &FormsError) -> String {
    match error {
        FormsError::ValidationError(v) => v.to_string(),
        other => other.to_string(),
    }
}

fn truthy(raw: &str) -> bool {
    matches!(raw.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// Cleans (validates and coerces) a raw form input string into a typed `Value`.
///
/// This performs, in order: the required check, type coercion, the
/// type-specific constraints (min/max, patterns, choices), and finally the
/// field's own validators. Returns the cleaned `Value` or a list of error
/// messages.
pub fn clean_field_value(field: &FormFieldDef, raw: Option<&str>) -> Result<Value, Vec<String>> {
    let raw_str = raw.unwrap_or("");

    // A missing checkbox is `false`, not empty.
    if matches!(field.field_type, FormFieldType::Boolean) {
        let value = truthy(raw_str.trim());
        if field.required && !value {
            return Err(vec![required_message(field)]);
        }
        return Ok(Value::Bool(value));
    }

    let is_empty = raw_str.trim().is_empty();
    if field.required && is_empty {
        return Err(vec![required_message(field)]);
    }
    if is_empty {
        return Ok(field.initial.clone().unwrap_or(Value::Null));
    }

    let mut errors = Vec::new();

    let value = match &field.field_type {
        FormFieldType::Char {
            min_length,
            max_length,
            strip,
        } => {
            let s = if *strip { raw_str.trim() } else { raw_str };
            let len = s.chars().count();
            if let Some(min) = min_length {
                if len < *min {
                    errors.push(format!(
                        "Ensure this value has at least {min} characters (it has {len})."
                    ));
                }
            }
            if let Some(max) = max_length {
                if len > *max {
                    errors.push(format!(
                        "Ensure this value has at most {max} characters (it has {len})."
                    ));
                }
            }
            Value::String(s.to_string())
        }

        FormFieldType::Integer {
            min_value,
            max_value,
        } => match raw_str.trim().parse::<i64>() {
            Ok(n) => {
                if let Some(min) = min_value {
                    if n < *min {
                        errors.push(format!(
                            "Ensure this value is greater than or equal to {min}."
                        ));
                    }
                }
                if let Some(max) = max_value {
                    if n > *max {
                        errors.push(format!("Ensure this value is less than or equal to {max}."));
                    }
                }
                Value::Int(n)
            }
            Err(_) => {
                errors.push("Enter a whole number.".to_string());
                Value::Null
            }
        },

        FormFieldType::Float {
            min_value,
            max_value,
        } => match raw_str.trim().parse::<f64>() {
            Ok(n) => {
                if let Some(min) = min_value {
                    if n < *min {
                        errors.push(format!(
                            "Ensure this value is greater than or equal to {min}."
                        ));
                    }
                }
                if let Some(max) = max_value {
                    if n > *max {
                        errors.push(format!("Ensure this value is less than or equal to {max}."));
                    }
                }
                Value::Float(n)
            }
            Err(_) => {
                errors.push("Enter a number.".to_string());
                Value::Null
            }
        },

        FormFieldType::Decimal {
            max_digits,
            decimal_places,
        } => {
            let trimmed = raw_str.trim();
            match trimmed.parse::<f64>() {
                Ok(n) => {
                    let unsigned = trimmed.trim_start_matches('-');
                    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
                    let total_digits = integer.len() + fraction.len();

                    if total_digits > *max_digits as usize {
                        errors.push(format!(
                            "Ensure that there are no more than {max_digits} digits in total."
                        ));
                    }
                    if fraction.len() > *decimal_places as usize {
                        errors.push(format!(
                            "Ensure that there are no more than {decimal_places} decimal places."
                        ));
                    }
                    Value::Float(n)
                }
                Err(_) => {
                    errors.push("Enter a number.".to_string());
                    Value::Null
                }
            }
        }

        FormFieldType::Boolean => Value::Bool(truthy(raw_str)),

        FormFieldType::Date => {
            match chrono::NaiveDate::parse_from_str(raw_str.trim(), "%Y-%m-%d") {
                Ok(d) => Value::Date(d),
                Err(_) => {
                    errors.push("Enter a valid date (YYYY-MM-DD).".to_string());
                    Value::Null
                }
            }
        }

        FormFieldType::DateTime => {
            let s = raw_str.trim();
            let result = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"));
            match result {
                Ok(dt) => Value::DateTime(dt),
                Err(_) => {
                    errors.push("Enter a valid date/time.".to_string());
                    Value::Null
                }
            }
        }

        FormFieldType::Time => {
            let s = raw_str.trim();
            let result = chrono::NaiveTime::parse_from_str(s, "%H:%M:%S")
                .or_else(|_| chrono::NaiveTime::parse_from_str(s, "%H:%M"));
            match result {
                Ok(t) => Value::Time(t),
                Err(_) => {
                    errors.push("Enter a valid time (HH:MM or HH:MM:SS).".to_string());
                    Value::Null
                }
            }
        }

        FormFieldType::Email => {
            let s = raw_str.trim();
            if !EMAIL_RE.is_match(s) {
                errors.push("Enter a valid email address.".to_string());
            }
            Value::String(s.to_string())
        }

        FormFieldType::Url => {
            let s = raw_str.trim();
            if !URL_RE.is_match(s) {
                errors.push("Enter a valid URL.".to_string());
            }
            Value::String(s.to_string())
        }

        FormFieldType::Uuid => match uuid::Uuid::parse_str(raw_str.trim()) {
            Ok(u) => Value::Uuid(u),
            Err(_) => {
                errors.push("Enter a valid UUID.".to_string());
                Value::Null
            }
        },

        FormFieldType::Slug => {
            let s = raw_str.trim();
            if !SLUG_RE.is_match(s) {
                errors.push(
                    "Enter a valid \"slug\" consisting of letters, numbers, underscores or hyphens."
                        .to_string(),
                );
            }
            Value::String(s.to_string())
        }

        FormFieldType::Choice { choices } => {
            if !choices.iter().any(|(v, _)| v == raw_str) {
                errors.push(format!(
                    "Select a valid choice. {raw_str} is not one of the available choices."
                ));
            }
            Value::String(raw_str.to_string())
        }

        FormFieldType::File {
            max_size,
            allowed_extensions,
        } => {
            if let Some(max) = max_size {
                if raw_str.len() > *max {
                    errors.push(format!("File size exceeds maximum of {max} bytes."));
                }
            }
            if !allowed_extensions.is_empty() {
                let ext = raw_str
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_lowercase())
                    .unwrap_or_default();
                if !allowed_extensions.iter().any(|e| e.to_lowercase() == ext) {
                    errors.push(format!(
                        "File extension not allowed. Allowed extensions: {}.",
                        allowed_extensions.join(", ")
                    ));
                }
            }
            Value::String(raw_str.to_string())
        }

        FormFieldType::Json => match serde_json::from_str::<serde_json::Value>(raw_str) {
            Ok(j) => Value::Json(j),
            Err(_) => {
                errors.push("Enter valid JSON.".to_string());
                Value::Null
            }
        },
    };

    if errors.is_empty() {
        for validator in &field.validators {
            if let Err(e) = validator.validate(&value) {
                errors.push(error_message(&e));
            }
        }
    }

    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors)
    }
}

fn required_message(field: &FormFieldDef) -> String {
    field
        .error_messages
        .get("required")
        .cloned()
        .unwrap_or_else(|| "This field is required.".to_string())
}

/// Returns `true` if the submitted raw value differs from `initial`.
///
/// Values are compared in their submission rendering, so `"7"` matches an
/// initial `Value::Int(7)` and surrounding whitespace is ignored. For
/// checkboxes an absent value equals an initial `false`.
pub fn field_has_changed(field: &FormFieldDef, initial: Option<&Value>, raw: Option<&str>) -> bool {
    if field.disabled {
        return false;
    }
    if matches!(field.field_type, FormFieldType::Boolean) {
        let before = initial.and_then(Value::as_bool).unwrap_or(false);
        return truthy(raw.unwrap_or("").trim()) != before;
    }
    let before = initial.map(Value::as_form_value).unwrap_or_default();
    raw.unwrap_or("").trim() != before.trim()
}
