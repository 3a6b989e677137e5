//! Form trait and `BaseForm` implementation.
//!
//! The [`Form`] trait is the common surface of every form in the engine:
//! plain [`BaseForm`]s, [`ModelForm`](crate::model_form::ModelForm)s, and
//! [`NestedForm`](crate::nested::NestedForm)s. Validation is synchronous;
//! anything that needs the record store happens before or after it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use nested_forms_db::value::Value;
use nested_forms_http::{FileDict, QueryDict};

use crate::fields::FormFieldDef;
use crate::validation;

/// The error map key for errors that belong to the form as a whole.
pub const NON_FIELD_ERRORS: &str = "__all__";

/// A cross-field validation hook. Receives the cleaned data and returns
/// extra errors keyed by field name (or [`NON_FIELD_ERRORS`]).
pub type CleanHook =
    Arc<dyn Fn(&HashMap<String, Value>) -> Result<(), HashMap<String, Vec<String>>> + Send + Sync>;

/// The core form trait. All form types implement this.
pub trait Form: Send + Sync {
    /// Returns the form's field definitions.
    fn fields(&self) -> &[FormFieldDef];

    /// Returns the initial values for fields.
    fn initial(&self) -> &HashMap<String, Value>;

    /// Returns the form prefix.
    fn prefix(&self) -> Option<&str>;

    /// Returns `true` if this form has been bound to data.
    fn is_bound(&self) -> bool;

    /// Validates the form. Returns `true` if valid.
    ///
    /// After calling this, `errors()` and `cleaned_data()` are populated.
    fn is_valid(&mut self) -> bool;

    /// Returns per-field validation errors.
    fn errors(&self) -> &HashMap<String, Vec<String>>;

    /// Returns the cleaned (validated and coerced) data.
    fn cleaned_data(&self) -> &HashMap<String, Value>;

    /// Returns `true` if the submitted data differs from the initial data.
    fn has_changed(&self) -> bool;

    /// Returns the non-field (form-level) errors.
    fn non_field_errors(&self) -> &[String] {
        self.errors()
            .get(NON_FIELD_ERRORS)
            .map_or(&[], Vec::as_slice)
    }

    /// Cross-field validation hook. The default implementation does nothing.
    fn clean(&self) -> Result<(), HashMap<String, Vec<String>>> {
        Ok(())
    }
}

/// A general-purpose form built from a list of field definitions.
pub struct BaseForm {
    field_defs: Vec<FormFieldDef>,
    initial_data: HashMap<String, Value>,
    prefix: Option<String>,
    bound: bool,
    empty_permitted: bool,
    raw_data: HashMap<String, Option<String>>,
    errors: HashMap<String, Vec<String>>,
    cleaned_data: HashMap<String, Value>,
    clean_hook: Option<CleanHook>,
}

impl fmt::Debug for BaseForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseForm")
            .field("prefix", &self.prefix)
            .field("bound", &self.bound)
            .field("fields", &self.field_defs.len())
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl BaseForm {
    /// Creates a new, unbound `BaseForm` with the given field definitions.
    pub fn new(fields: Vec<FormFieldDef>) -> Self {
        Self {
            field_defs: fields,
            initial_data: HashMap::new(),
            prefix: None,
            bound: false,
            empty_permitted: false,
            raw_data: HashMap::new(),
            errors: HashMap::new(),
            cleaned_data: HashMap::new(),
            clean_hook: None,
        }
    }

    /// Sets initial values for fields.
    #[must_use]
    pub fn with_initial(mut self, initial: HashMap<String, Value>) -> Self {
        self.initial_data = initial;
        self
    }

    /// Sets the form prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Installs a cross-field validation hook.
    #[must_use]
    pub fn with_clean(mut self, hook: CleanHook) -> Self {
        self.clean_hook = Some(hook);
        self
    }

    /// Allows the form to be submitted empty. An empty-permitted form whose
    /// data did not change validates without running any field checks.
    pub fn set_empty_permitted(&mut self, empty_permitted: bool) {
        self.empty_permitted = empty_permitted;
    }

    /// Returns `true` if the form may be submitted empty.
    pub const fn empty_permitted(&self) -> bool {
        self.empty_permitted
    }

    /// Returns the submitted key of a field: `<prefix>-<name>`, or the bare
    /// name without a prefix.
    pub fn html_name(&self, name: &str) -> String {
        match &self.prefix {
            Some(p) => format!("{p}-{name}"),
            None => name.to_string(),
        }
    }

    /// Binds submitted data to this form. File fields read the name of the
    /// uploaded file from `files`, falling back to the text submission.
    pub fn bind(&mut self, data: &QueryDict, files: Option<&FileDict>) {
        self.bound = true;
        self.raw_data.clear();
        self.errors.clear();
        self.cleaned_data.clear();

        for field in &self.field_defs {
            let html_name = self.html_name(&field.name);
            let uploaded = if field.field_type.is_file() {
                files
                    .and_then(|f| f.get(&html_name))
                    .map(|file| file.name.clone())
            } else {
                None
            };
            let value = uploaded.or_else(|| data.get(&html_name).map(String::from));
            self.raw_data.insert(field.name.clone(), value);
        }
    }

    /// Returns the raw submitted value of a field.
    pub fn raw_value(&self, name: &str) -> Option<&str> {
        self.raw_data.get(name).and_then(|v| v.as_deref())
    }

    /// Returns the names of the fields whose data changed.
    pub fn changed_data(&self) -> Vec<String> {
        if !self.bound {
            return Vec::new();
        }
        validation::changed_fields(&self.field_defs, &self.initial_data, &self.raw_data)
    }

    /// Records an error on a field and drops its cleaned value.
    pub fn add_error(&mut self, field: &str, message: impl Into<String>) {
        self.cleaned_data.remove(field);
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }
}

impl Form for BaseForm {
    fn fields(&self) -> &[FormFieldDef] {
        &self.field_defs
    }

    fn initial(&self) -> &HashMap<String, Value> {
        &self.initial_data
    }

    fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    fn is_bound(&self) -> bool {
        self.bound
    }

    fn is_valid(&mut self) -> bool {
        if !self.bound {
            return false;
        }

        self.errors.clear();
        self.cleaned_data.clear();

        if self.empty_permitted && !self.has_changed() {
            return true;
        }

        validation::clean_fields(
            &self.field_defs,
            &self.initial_data,
            &self.raw_data,
            &mut self.cleaned_data,
            &mut self.errors,
        );

        if let Err(form_errors) = self.clean() {
            for (key, msgs) in form_errors {
                self.errors.entry(key).or_default().extend(msgs);
            }
        }

        self.errors.is_empty()
    }

    fn errors(&self) -> &HashMap<String, Vec<String>> {
        &self.errors
    }

    fn cleaned_data(&self) -> &HashMap<String, Value> {
        &self.cleaned_data
    }

    fn has_changed(&self) -> bool {
        !self.changed_data().is_empty()
    }

    fn clean(&self) -> Result<(), HashMap<String, Vec<String>>> {
        self.clean_hook
            .as_ref()
            .map_or(Ok(()), |hook| hook(&self.cleaned_data))
    }
}
