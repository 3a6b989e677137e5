//! Model-backed forms that generate their fields from model metadata.
//!
//! [`ModelFormConfig`] specifies how to derive form fields from a model's
//! [`ModelMeta`]. [`generate_form_fields`] creates the [`FormFieldDef`]s and
//! [`ModelForm`] binds them to a [`Record`], runs the model field validators
//! after form cleaning, and writes cleaned values back onto the record.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use nested_forms_core::FormsResult;
use nested_forms_db::fields::{FieldDef, FieldType};
use nested_forms_db::model::ModelMeta;
use nested_forms_db::record::Record;
use nested_forms_db::store::RecordStore;
use nested_forms_db::value::Value;
use nested_forms_http::{FileDict, QueryDict};

use crate::fields::{error_message, FormFieldDef, FormFieldType};
use crate::form::{BaseForm, CleanHook, Form};

/// Specifies which model fields to include in a `ModelForm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelFormFields {
    /// Include all editable fields.
    All,
    /// Include only the specified fields.
    Include(Vec<String>),
    /// Include all fields except the specified ones.
    Exclude(Vec<String>),
}

/// Configuration for generating a model-backed form.
#[derive(Clone)]
pub struct ModelFormConfig {
    /// The model the form edits.
    pub model: String,
    /// Which model fields to include in the form.
    pub fields: ModelFormFields,
    /// Label overrides keyed by field name.
    pub labels: HashMap<String, String>,
    /// Help text overrides keyed by field name.
    pub help_texts: HashMap<String, String>,
    /// Cross-field validation hook.
    pub clean: Option<CleanHook>,
}

impl fmt::Debug for ModelFormConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFormConfig")
            .field("model", &self.model)
            .field("fields", &self.fields)
            .field("clean", &self.clean.is_some())
            .finish_non_exhaustive()
    }
}

impl ModelFormConfig {
    /// Creates a new `ModelFormConfig` with all fields included.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            fields: ModelFormFields::All,
            labels: HashMap::new(),
            help_texts: HashMap::new(),
            clean: None,
        }
    }

    /// Sets which fields to include.
    #[must_use]
    pub fn with_fields(mut self, fields: ModelFormFields) -> Self {
        self.fields = fields;
        self
    }

    /// Adds a label override for a specific field.
    #[must_use]
    pub fn with_label(mut self, field_name: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.insert(field_name.into(), label.into());
        self
    }

    /// Adds a help text override for a specific field.
    #[must_use]
    pub fn with_help_text(
        mut self,
        field_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.help_texts.insert(field_name.into(), text.into());
        self
    }

    /// Installs a cross-field validation hook.
    #[must_use]
    pub fn with_clean(mut self, hook: CleanHook) -> Self {
        self.clean = Some(hook);
        self
    }

    fn includes(&self, name: &str) -> bool {
        match &self.fields {
            ModelFormFields::All => true,
            ModelFormFields::Include(include) => include.iter().any(|f| f == name),
            ModelFormFields::Exclude(exclude) => !exclude.iter().any(|f| f == name),
        }
    }
}

/// Generates form field definitions for a model.
///
/// Fields that are not editable, are primary keys, are relational, or are
/// named in `hidden` are left out. A field is required when it is neither
/// nullable nor blank and has no default.
pub fn generate_form_fields(
    meta: &ModelMeta,
    config: &ModelFormConfig,
    hidden: &[&str],
) -> Vec<FormFieldDef> {
    let mut form_fields = Vec::new();

    for model_field in &meta.fields {
        if !model_field.editable || model_field.primary_key || model_field.is_relation() {
            continue;
        }
        if hidden.contains(&model_field.name) || !config.includes(model_field.name) {
            continue;
        }

        let field_name = model_field.name.to_string();
        let mut form_field = FormFieldDef::new(&field_name, form_field_type(model_field));

        form_field.required = !model_field.null
            && !model_field.blank
            && model_field.default.is_none()
            && model_field.field_type != FieldType::BooleanField;

        form_field.label = config
            .labels
            .get(&field_name)
            .cloned()
            .unwrap_or_else(|| model_field.verbose_name.clone());
        form_field.help_text = config
            .help_texts
            .get(&field_name)
            .cloned()
            .unwrap_or_else(|| model_field.help_text.clone());

        if let Some(default) = &model_field.default {
            form_field.initial = Some(default.clone());
        }

        form_fields.push(form_field);
    }

    form_fields
}

/// Converts a model field to a form field type.
fn form_field_type(field_def: &FieldDef) -> FormFieldType {
    if let Some(choices) = &field_def.choices {
        return FormFieldType::Choice {
            choices: choices
                .iter()
                .map(|(value, label)| (value.as_form_value(), label.clone()))
                .collect(),
        };
    }
    match &field_def.field_type {
        FieldType::CharField | FieldType::TextField => FormFieldType::Char {
            min_length: None,
            max_length: field_def.max_length,
            strip: true,
        },
        FieldType::IntegerField
        | FieldType::BigIntegerField
        | FieldType::AutoField
        | FieldType::BigAutoField
        | FieldType::ForeignKey { .. } => FormFieldType::Integer {
            min_value: None,
            max_value: None,
        },
        FieldType::FloatField => FormFieldType::Float {
            min_value: None,
            max_value: None,
        },
        FieldType::DecimalField {
            max_digits,
            decimal_places,
        } => FormFieldType::Decimal {
            max_digits: *max_digits,
            decimal_places: *decimal_places,
        },
        FieldType::BooleanField => FormFieldType::Boolean,
        FieldType::DateField => FormFieldType::Date,
        FieldType::DateTimeField => FormFieldType::DateTime,
        FieldType::TimeField => FormFieldType::Time,
        FieldType::UuidField => FormFieldType::Uuid,
        FieldType::EmailField => FormFieldType::Email,
        FieldType::UrlField => FormFieldType::Url,
        FieldType::SlugField => FormFieldType::Slug,
        FieldType::JsonField
        | FieldType::ManyToManyField { .. }
        | FieldType::GenericRelation { .. } => FormFieldType::Json,
        FieldType::FileField => FormFieldType::File {
            max_size: None,
            allowed_extensions: Vec::new(),
        },
    }
}

/// A form editing one record of a model.
pub struct ModelForm {
    base: BaseForm,
    meta: Arc<ModelMeta>,
    instance: Record,
}

impl fmt::Debug for ModelForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelForm")
            .field("model", &self.meta.model_name)
            .field("instance", &self.instance)
            .field("base", &self.base)
            .finish()
    }
}

impl ModelForm {
    /// Creates an unbound form for `instance`, or for a new record when
    /// `instance` is `None`. The fields named in `hidden` are not exposed.
    pub fn new(
        meta: Arc<ModelMeta>,
        config: &ModelFormConfig,
        instance: Option<Record>,
        hidden: &[&str],
    ) -> Self {
        let instance = instance.unwrap_or_else(|| Record::new(meta.model_name));
        let fields = generate_form_fields(&meta, config, hidden);
        let initial: HashMap<String, Value> = fields
            .iter()
            .filter_map(|f| {
                instance
                    .get(&f.name)
                    .filter(|v| !v.is_null())
                    .map(|v| (f.name.clone(), v.clone()))
            })
            .collect();

        let mut base = BaseForm::new(fields).with_initial(initial);
        if let Some(hook) = &config.clean {
            base = base.with_clean(Arc::clone(hook));
        }

        Self {
            base,
            meta,
            instance,
        }
    }

    /// Sets the form prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.base = self.base.with_prefix(prefix);
        self
    }

    /// Overrides initial values, on top of those taken from the instance.
    #[must_use]
    pub fn with_initial(mut self, initial: &HashMap<String, Value>) -> Self {
        let mut merged = self.base.initial().clone();
        merged.extend(initial.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.base = self.base.with_initial(merged);
        self
    }

    /// Binds submitted data.
    pub fn bind(&mut self, data: &QueryDict, files: Option<&FileDict>) {
        self.base.bind(data, files);
    }

    /// Returns the model metadata.
    pub fn meta(&self) -> &Arc<ModelMeta> {
        &self.meta
    }

    /// Returns the record this form edits, as loaded.
    pub const fn instance(&self) -> &Record {
        &self.instance
    }

    /// Returns the underlying form.
    pub const fn base(&self) -> &BaseForm {
        &self.base
    }

    /// Sets whether the form may be submitted empty.
    pub fn set_empty_permitted(&mut self, empty_permitted: bool) {
        self.base.set_empty_permitted(empty_permitted);
    }

    /// Returns `true` if the form may be submitted empty.
    pub const fn empty_permitted(&self) -> bool {
        self.base.empty_permitted()
    }

    /// Records an error on a field.
    pub fn add_error(&mut self, field: &str, message: impl Into<String>) {
        self.base.add_error(field, message);
    }

    /// Returns the instance with the cleaned values applied. Before a
    /// successful validation this is the instance as loaded.
    pub fn construct_instance(&self) -> Record {
        let mut record = self.instance.clone();
        for field in self.base.fields() {
            if let Some(value) = self.base.cleaned_data().get(&field.name) {
                record.set(field.name.clone(), value.clone());
            }
        }
        record
    }

    /// Builds the instance from the cleaned data and, with `commit`,
    /// persists it.
    pub fn save(&self, store: &dyn RecordStore, commit: bool) -> FormsResult<Record> {
        let mut record = self.construct_instance();
        if commit {
            store.save(&mut record)?;
            tracing::debug!(model = %record.model, pk = %record.pk_form_value(), "saved record");
        }
        Ok(record)
    }

    fn validate_model_fields(&mut self) {
        let mut failures = Vec::new();
        for field in self.base.fields() {
            let Some(value) = self.base.cleaned_data().get(&field.name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let Some(model_field) = self.meta.get_field(&field.name) else {
                continue;
            };
            for validator in &model_field.validators {
                if let Err(e) = validator.validate(value) {
                    failures.push((field.name.clone(), error_message(&e)));
                }
            }
        }
        for (field, message) in failures {
            self.base.add_error(&field, message);
        }
    }
}

impl Form for ModelForm {
    fn fields(&self) -> &[FormFieldDef] {
        self.base.fields()
    }

    fn initial(&self) -> &HashMap<String, Value> {
        self.base.initial()
    }

    fn prefix(&self) -> Option<&str> {
        self.base.prefix()
    }

    fn is_bound(&self) -> bool {
        self.base.is_bound()
    }

    fn is_valid(&mut self) -> bool {
        if !self.base.is_valid() {
            return false;
        }
        self.validate_model_fields();
        self.base.errors().is_empty()
    }

    fn errors(&self) -> &HashMap<String, Vec<String>> {
        self.base.errors()
    }

    fn cleaned_data(&self) -> &HashMap<String, Value> {
        self.base.cleaned_data()
    }

    fn has_changed(&self) -> bool {
        self.base.has_changed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nested_forms_db::validators::MinLengthValidator;

    fn contact_meta() -> Arc<ModelMeta> {
        Arc::new(
            ModelMeta::new("crm", "contact")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(
                    FieldDef::new("name", FieldType::CharField)
                        .max_length(100)
                        .verbose_name("Full name")
                        .validator(MinLengthValidator::new(2)),
                )
                .field(
                    FieldDef::new("title", FieldType::CharField)
                        .blank()
                        .choices(vec![
                            (Value::from("mr"), "Mr".into()),
                            (Value::from("mrs"), "Mrs".into()),
                        ]),
                )
                .field(FieldDef::new("active", FieldType::BooleanField).default(true))
                .field(FieldDef::foreign_key("third_party", "thirdparty"))
                .field(FieldDef::new("created", FieldType::DateTimeField).not_editable()),
        )
    }

    #[test]
    fn test_generate_form_fields() {
        let meta = contact_meta();
        let fields = generate_form_fields(&meta, &ModelFormConfig::new("contact"), &[]);
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["name", "title", "active"]);
        assert!(fields[0].required);
        assert_eq!(fields[0].label, "Full name");
        assert!(!fields[1].required);
        assert!(matches!(fields[1].field_type, FormFieldType::Choice { .. }));
        assert!(!fields[2].required);
        assert_eq!(fields[2].initial, Some(Value::Bool(true)));
    }

    #[test]
    fn test_include_exclude_and_hidden() {
        let meta = contact_meta();
        let include = ModelFormConfig::new("contact")
            .with_fields(ModelFormFields::Include(vec!["name".into()]));
        assert_eq!(generate_form_fields(&meta, &include, &[]).len(), 1);

        let exclude = ModelFormConfig::new("contact")
            .with_fields(ModelFormFields::Exclude(vec!["title".into()]));
        assert_eq!(generate_form_fields(&meta, &exclude, &["active"]).len(), 1);
    }

    #[test]
    fn test_instance_provides_initial() {
        let instance = Record::new("contact").with_pk(4).with_value("name", "Ada");
        let form = ModelForm::new(
            contact_meta(),
            &ModelFormConfig::new("contact"),
            Some(instance),
            &[],
        );
        assert_eq!(form.initial().get("name"), Some(&Value::from("Ada")));
        assert_eq!(form.instance().pk(), Some(&Value::Int(4)));
    }

    #[test]
    fn test_bind_validate_construct() {
        let instance = Record::new("contact")
            .with_pk(4)
            .with_value("name", "Ada")
            .with_value("third_party", 1);
        let mut form = ModelForm::new(
            contact_meta(),
            &ModelFormConfig::new("contact"),
            Some(instance),
            &[],
        )
        .with_prefix("contacts-0");
        form.bind(
            &QueryDict::parse("contacts-0-name=Grace&contacts-0-title=mrs"),
            None,
        );
        assert!(form.has_changed());
        assert!(form.is_valid());

        let record = form.construct_instance();
        assert_eq!(record.get("name"), Some(&Value::from("Grace")));
        assert_eq!(record.get("title"), Some(&Value::from("mrs")));
        assert_eq!(record.get("active"), Some(&Value::Bool(false)));
        assert_eq!(record.get("third_party"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_model_validators_run_after_cleaning() {
        let mut form = ModelForm::new(contact_meta(), &ModelFormConfig::new("contact"), None, &[]);
        form.bind(&QueryDict::parse("name=A"), None);
        assert!(!form.is_valid());
        assert!(form.errors().contains_key("name"));
        assert!(form.construct_instance().get("name").is_none());
    }

    #[test]
    fn test_invalid_choice() {
        let mut form = ModelForm::new(contact_meta(), &ModelFormConfig::new("contact"), None, &[]);
        form.bind(&QueryDict::parse("name=Ada&title=xxx"), None);
        assert!(!form.is_valid());
        assert!(form.errors()["title"][0].contains("xxx"));
    }

    #[test]
    fn test_with_initial_overrides_instance() {
        let mut initial = HashMap::new();
        initial.insert("name".to_string(), Value::from("initial"));
        let form = ModelForm::new(contact_meta(), &ModelFormConfig::new("contact"), None, &[])
            .with_initial(&initial);
        assert_eq!(form.initial().get("name"), Some(&Value::from("initial")));
    }
}
