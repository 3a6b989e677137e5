//! The nested form: a model form plus the groups of its sub-forms.
//!
//! A [`NestedForm`] is built from a [`NestedFormConfig`] and a
//! [`FormInput`]. Construction binds the parent's own fields, then
//! synchronizes every declared sub-form against the submission and the
//! store. Validation and changed detection cover the whole tree; saving is
//! in [`crate::save`].
//!
//! ```text
//! Unbound ──bind──> Cleaning ──validate──> Validated ──save──> Saved
//!                            └───────────> Invalid
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;

use nested_forms_core::logging::form_span;
use nested_forms_core::{FormsResult, SETTINGS};
use nested_forms_db::record::Record;
use nested_forms_db::store::RecordStore;
use nested_forms_db::value::Value;
use nested_forms_http::{FileDict, QueryDict};

use crate::declaration::NestedFormConfig;
use crate::fields::FormFieldDef;
use crate::form::Form;
use crate::formset::SubFormGroup;
use crate::model_form::ModelForm;
use crate::synchronizer::{pending_children, synchronize, SyncContext};

/// Where a nested form is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormState {
    /// No submission.
    Unbound,
    /// Bound, not validated yet.
    Cleaning,
    /// Validated without errors.
    Validated,
    /// Validated with errors.
    Invalid,
    /// Committed; the groups were rebuilt from the store.
    Saved,
}

/// What a nested form is built from.
#[derive(Debug, Clone, Default)]
pub struct FormInput {
    /// The submission. `None` leaves the form unbound.
    pub data: Option<QueryDict>,
    /// Uploaded files.
    pub files: Option<FileDict>,
    /// The record to edit. `None` edits a new record.
    pub instance: Option<Record>,
    /// The key prefix of the form.
    pub prefix: Option<String>,
    /// A `(field, parent)` pair: the field is set to the parent's primary
    /// key on the edited record.
    pub parent_link: Option<(String, Record)>,
    /// Sub-form prefixes whose delete markers are ignored.
    pub safe_delete: Vec<String>,
    pub(crate) hidden: Vec<String>,
    pub(crate) initial: HashMap<String, Value>,
    pub(crate) empty_permitted: bool,
    pub(crate) rebuild: bool,
}

impl FormInput {
    /// Creates an input for an unbound form over a new record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the submission.
    #[must_use]
    pub fn with_data(mut self, data: QueryDict) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the uploaded files.
    #[must_use]
    pub fn with_files(mut self, files: FileDict) -> Self {
        self.files = Some(files);
        self
    }

    /// Sets the record to edit.
    #[must_use]
    pub fn with_instance(mut self, instance: Record) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Links the edited record to a parent through `field`.
    #[must_use]
    pub fn with_parent_link(mut self, field: impl Into<String>, parent: Record) -> Self {
        self.parent_link = Some((field.into(), parent));
        self
    }

    /// Exempts the sub-form at `prefix` from delete markers.
    #[must_use]
    pub fn with_safe_delete(mut self, prefix: impl Into<String>) -> Self {
        self.safe_delete.push(prefix.into());
        self
    }
}

/// A form over one record and, recursively, its related records.
#[derive(Debug)]
pub struct NestedForm {
    pub(crate) config: Arc<NestedFormConfig>,
    pub(crate) form: ModelForm,
    pub(crate) groups: Vec<SubFormGroup>,
    pub(crate) pending: BTreeMap<String, Vec<Record>>,
    pub(crate) state: FormState,
    pub(crate) data: Option<QueryDict>,
    pub(crate) files: Option<FileDict>,
    pub(crate) safe_delete: Vec<String>,
    pub(crate) hidden: Vec<String>,
    pub(crate) errors: HashMap<String, Vec<String>>,
}

impl NestedForm {
    /// Builds the form and synchronizes its sub-forms.
    ///
    /// Explicit deletions and update resets in the submission are applied
    /// to the store here, before validation.
    ///
    /// # Errors
    ///
    /// Returns [`FormsError::ConfigurationError`](nested_forms_core::FormsError::ConfigurationError)
    /// when a declared sub-form does not resolve to a relation of the
    /// model, and propagates store failures.
    pub fn new(
        store: &dyn RecordStore,
        config: Arc<NestedFormConfig>,
        input: FormInput,
    ) -> FormsResult<Self> {
        let meta = store.meta(config.model())?;
        let mut instance = input
            .instance
            .unwrap_or_else(|| Record::new(meta.model_name));
        if let Some((field, parent)) = &input.parent_link {
            if let Some(pk) = parent.pk() {
                instance.set(field.clone(), pk.clone());
            }
        }

        let hidden: Vec<&str> = input.hidden.iter().map(String::as_str).collect();
        let mut form =
            ModelForm::new(meta, &config.form, Some(instance), &hidden).with_initial(&input.initial);
        if let Some(prefix) = input.prefix {
            form = form.with_prefix(prefix);
        }
        form.set_empty_permitted(input.empty_permitted);
        if let Some(data) = &input.data {
            form.bind(data, input.files.as_ref());
        }

        let state = if input.data.is_some() {
            FormState::Cleaning
        } else {
            FormState::Unbound
        };
        let mut nested = Self {
            config,
            form,
            groups: Vec::new(),
            pending: BTreeMap::new(),
            state,
            data: input.data,
            files: input.files,
            safe_delete: input.safe_delete,
            hidden: input.hidden,
            errors: HashMap::new(),
        };
        nested.load(store, input.rebuild)?;
        Ok(nested)
    }

    /// Runs the pre-load hook, synchronizes every declared sub-form, then
    /// runs the loaded hook.
    pub(crate) fn load(&mut self, store: &dyn RecordStore, rebuild: bool) -> FormsResult<()> {
        let span = form_span(self.form.prefix().unwrap_or_default());
        let _guard = span.enter();

        self.groups.clear();
        self.pending.clear();
        let config = Arc::clone(&self.config);
        if let Some(hook) = config.pre_load.clone() {
            hook(self);
        }

        let working = if self.form.is_bound() && self.form.is_valid() {
            self.form.construct_instance()
        } else {
            self.form.instance().clone()
        };

        for name in config.order() {
            let Some(decl) = config.declaration(name) else {
                tracing::warn!(name, "no sub-form declared under this name, skipping");
                continue;
            };
            let ctx = SyncContext {
                store,
                parent: &working,
                parent_prefix: self.form.prefix(),
                data: self.data.as_ref(),
                files: self.files.as_ref(),
                safe_delete: &self.safe_delete,
                settings: SETTINGS.get(),
                rebuild,
            };
            let (group, pending) = synchronize(&ctx, decl)?;
            self.pending.insert(name.to_string(), pending);
            self.groups.push(group);
        }

        if let Some(hook) = config.on_loaded.clone() {
            hook(self);
        }
        Ok(())
    }

    /// Validates the form's own fields and every bound sub-form.
    ///
    /// Child errors are surfaced on this form as `"<sub-form> | <field>"`.
    /// The result is cached until the form is rebuilt.
    pub fn validate(&mut self) -> bool {
        match self.state {
            FormState::Validated => return true,
            FormState::Invalid | FormState::Unbound | FormState::Saved => return false,
            FormState::Cleaning => {}
        }

        // A new row whose sub-forms were filled in is not empty.
        if self.form.empty_permitted() && self.groups.iter().any(SubFormGroup::has_changed) {
            self.form.set_empty_permitted(false);
        }
        let mut valid = self.form.is_valid();
        let mut errors = self.form.errors().clone();
        for group in &mut self.groups {
            if !group.is_bound() {
                continue;
            }
            if !group.is_valid() {
                valid = false;
            }
            for (field, messages) in group.errors() {
                errors
                    .entry(format!("{} | {field}", group.name()))
                    .or_default()
                    .extend(messages);
            }
        }
        self.errors = errors;

        let parent = self.form.construct_instance();
        for group in &self.groups {
            self.pending
                .insert(group.name().to_string(), pending_children(group, &parent));
        }

        self.state = if valid {
            FormState::Validated
        } else {
            FormState::Invalid
        };
        tracing::debug!(valid, state = ?self.state, "validated nested form");
        valid
    }

    /// Returns the lifecycle state.
    pub const fn state(&self) -> FormState {
        self.state
    }

    /// Returns the configuration the form was built from.
    pub fn config(&self) -> &NestedFormConfig {
        &self.config
    }

    /// Returns the parent's own form.
    pub const fn form(&self) -> &ModelForm {
        &self.form
    }

    /// Returns the record as loaded.
    pub const fn instance(&self) -> &Record {
        self.form.instance()
    }

    /// Returns the sub-form groups in processing order.
    pub fn groups(&self) -> &[SubFormGroup] {
        &self.groups
    }

    /// Returns the sub-form groups, mutably.
    pub fn groups_mut(&mut self) -> &mut [SubFormGroup] {
        &mut self.groups
    }

    /// Looks up a group by sub-form name.
    pub fn group(&self, name: &str) -> Option<&SubFormGroup> {
        self.groups.iter().find(|g| g.name() == name)
    }

    /// Returns the child records the sub-form `name` will attach to this
    /// record, with the parent link already set.
    pub fn pending_children(&self, name: &str) -> &[Record] {
        self.pending.get(name).map_or(&[], Vec::as_slice)
    }
}

impl Form for NestedForm {
    fn fields(&self) -> &[FormFieldDef] {
        self.form.fields()
    }

    fn initial(&self) -> &HashMap<String, Value> {
        self.form.initial()
    }

    fn prefix(&self) -> Option<&str> {
        self.form.prefix()
    }

    fn is_bound(&self) -> bool {
        self.form.is_bound()
    }

    fn is_valid(&mut self) -> bool {
        self.validate()
    }

    fn errors(&self) -> &HashMap<String, Vec<String>> {
        &self.errors
    }

    fn cleaned_data(&self) -> &HashMap<String, Value> {
        self.form.cleaned_data()
    }

    /// Changed when the own fields changed or any row of any group did.
    fn has_changed(&self) -> bool {
        self.form.has_changed() || self.groups.iter().any(SubFormGroup::has_changed)
    }
}
