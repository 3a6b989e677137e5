//! Validation pipeline for form processing.
//!
//! 1. Field-level validation (type coercion + per-field validators)
//! 2. Form-level cross-field validation (the form's `clean` hook)
//!
//! Errors accumulate rather than short-circuiting, so all validation
//! issues are reported at once.

use std::collections::HashMap;

use nested_forms_db::value::Value;

use crate::fields::{clean_field_value, field_has_changed, FormFieldDef};
use crate::form::Form;

/// Returns the initial value of a field: the form-level initial map first,
/// then the field's own default.
pub(crate) fn initial_for<'a>(
    field: &'a FormFieldDef,
    initial: &'a HashMap<String, Value>,
) -> Option<&'a Value> {
    initial.get(&field.name).or(field.initial.as_ref())
}

/// Performs field-level validation for all fields.
///
/// Populates `cleaned_data` on success or `errors` on failure. Disabled
/// fields take their initial value and skip validation.
pub fn clean_fields(
    field_defs: &[FormFieldDef],
    initial: &HashMap<String, Value>,
    raw_data: &HashMap<String, Option<String>>,
    cleaned_data: &mut HashMap<String, Value>,
    errors: &mut HashMap<String, Vec<String>>,
) {
    for field in field_defs {
        if field.disabled {
            if let Some(value) = initial_for(field, initial) {
                cleaned_data.insert(field.name.clone(), value.clone());
            }
            continue;
        }

        let raw = raw_data.get(&field.name).and_then(|v| v.as_deref());

        match clean_field_value(field, raw) {
            Ok(value) => {
                cleaned_data.insert(field.name.clone(), value);
            }
            Err(field_errors) => {
                errors.insert(field.name.clone(), field_errors);
            }
        }
    }
}

/// Returns the names of the fields whose submitted value differs from
/// their initial value, in declaration order.
pub fn changed_fields(
    field_defs: &[FormFieldDef],
    initial: &HashMap<String, Value>,
    raw_data: &HashMap<String, Option<String>>,
) -> Vec<String> {
    field_defs
        .iter()
        .filter(|field| {
            let raw = raw_data.get(&field.name).and_then(|v| v.as_deref());
            field_has_changed(field, initial_for(field, initial), raw)
        })
        .map(|field| field.name.clone())
        .collect()
}

/// Runs the full validation pipeline and returns structured errors.
///
/// # Returns
///
/// - `Ok(())` if all validation passes
/// - `Err(errors)` with a list of `(field_name, error_messages)` tuples,
///   sorted by field name
pub fn full_clean(form: &mut dyn Form) -> Result<(), Vec<(String, Vec<String>)>> {
    if form.is_valid() {
        Ok(())
    } else {
        let mut errors: Vec<(String, Vec<String>)> = form
            .errors()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        errors.sort_by(|a, b| a.0.cmp(&b.0));
        Err(errors)
    }
}
