//! A serializable dump of the errors of a whole nested form.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::form::{Form, NON_FIELD_ERRORS};
use crate::formset::{ChildForm, ChildRow, SubFormGroup};
use crate::nested::{FormState, NestedForm};

/// The errors of one form and its sub-forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub prefix: Option<String>,
    pub valid: bool,
    pub field_errors: BTreeMap<String, Vec<String>>,
    pub non_field_errors: Vec<String>,
    pub groups: Vec<GroupReport>,
}

/// The errors of one sub-form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    pub name: String,
    pub prefix: String,
    pub bound: bool,
    pub non_form_errors: Vec<String>,
    pub rows: Vec<RowReport>,
}

/// The errors of one row. Rows without errors are left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowReport {
    pub index: usize,
    pub prefix: String,
    pub errors: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Box<ErrorReport>>,
}

impl ErrorReport {
    /// Returns `true` if nothing anywhere in the tree has an error.
    pub fn is_empty(&self) -> bool {
        self.field_errors.is_empty()
            && self.non_field_errors.is_empty()
            && self
                .groups
                .iter()
                .all(|g| g.non_form_errors.is_empty() && g.rows.is_empty())
    }
}

impl NestedForm {
    /// Builds the error tree of the form. Meaningful after validation.
    pub fn error_report(&self) -> ErrorReport {
        let (field_errors, non_field_errors) = split_errors(self.form.errors());
        ErrorReport {
            prefix: self.form.prefix().map(String::from),
            valid: matches!(self.state, FormState::Validated | FormState::Saved),
            field_errors,
            non_field_errors,
            groups: self.groups.iter().map(group_report).collect(),
        }
    }

    /// Logs the error tree as JSON at debug level.
    pub fn show_errors(&self) {
        match serde_json::to_string_pretty(&self.error_report()) {
            Ok(json) => tracing::debug!(report = %json, "form errors"),
            Err(e) => tracing::warn!(error = %e, "could not serialize the error report"),
        }
    }
}

fn split_errors(
    errors: &HashMap<String, Vec<String>>,
) -> (BTreeMap<String, Vec<String>>, Vec<String>) {
    let mut fields = BTreeMap::new();
    let mut non_field = Vec::new();
    for (field, messages) in errors {
        if field == NON_FIELD_ERRORS {
            non_field.extend(messages.iter().cloned());
        } else {
            fields.insert(field.clone(), messages.clone());
        }
    }
    (fields, non_field)
}

fn group_report(group: &SubFormGroup) -> GroupReport {
    GroupReport {
        name: group.name().to_string(),
        prefix: group.prefix().to_string(),
        bound: group.is_bound(),
        non_form_errors: group.non_form_errors().to_vec(),
        rows: group
            .rows()
            .iter()
            .filter_map(|row| row_report(row, &group.pk_field))
            .collect(),
    }
}

fn row_report(row: &ChildRow, pk_field: &str) -> Option<RowReport> {
    let (mut errors, children) = match &row.form {
        ChildForm::Leaf(form) => (form.errors().clone(), None),
        ChildForm::Nested(form) => (
            form.form().errors().clone(),
            Some(Box::new(form.error_report())),
        ),
    };
    if let Some(message) = &row.pk_error {
        errors
            .entry(pk_field.to_string())
            .or_default()
            .push(message.clone());
    }
    let children = children.filter(|c| !c.is_empty());
    if errors.is_empty() && children.is_none() {
        return None;
    }
    Some(RowReport {
        index: row.index,
        prefix: row.form.prefix().unwrap_or_default().to_string(),
        errors: errors.into_iter().collect(),
        children,
    })
}
