//! Model metadata.
//!
//! [`ModelMeta`] captures the equivalent of Django's `class Meta` plus the
//! declared field list: everything the engine needs to know about a record
//! type without owning a concrete Rust struct for it. Metadata is handed out
//! by the [`RecordStore`](crate::store::RecordStore) behind an `Arc`.

use crate::fields::{FieldDef, FieldType};
use crate::value::Value;

/// Metadata about a model, equivalent to Django's `class Meta`.
///
/// # Examples
///
/// ```
/// use nested_forms_db::model::ModelMeta;
/// use nested_forms_db::fields::{FieldDef, FieldType};
///
/// let meta = ModelMeta::new("contacts", "contact")
///     .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
///     .field(FieldDef::new("name", FieldType::CharField).max_length(100));
///
/// assert_eq!(meta.label(), "contacts.contact");
/// assert_eq!(meta.pk_name(), "id");
/// assert!(meta.get_field("name").is_some());
/// ```
#[derive(Debug)]
pub struct ModelMeta {
    /// The application label (e.g., "contacts").
    pub app_label: &'static str,
    /// The model name in lowercase (e.g., "contact").
    pub model_name: &'static str,
    /// Human-readable singular name.
    pub verbose_name: String,
    /// Field names records are ordered by when listed; a leading `-`
    /// sorts descending.
    pub ordering: Vec<&'static str>,
    /// Field definitions for this model.
    pub fields: Vec<FieldDef>,
}

impl ModelMeta {
    /// Creates metadata with no fields.
    pub fn new(app_label: &'static str, model_name: &'static str) -> Self {
        Self {
            app_label,
            model_name,
            verbose_name: model_name.replace('_', " "),
            ordering: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Adds a field definition.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Sets the default ordering.
    #[must_use]
    pub fn ordering(mut self, ordering: Vec<&'static str>) -> Self {
        self.ordering = ordering;
        self
    }

    /// Returns `"<app_label>.<model_name>"`, the content type label used by
    /// generic relations.
    pub fn label(&self) -> String {
        format!("{}.{}", self.app_label, self.model_name)
    }

    /// Returns `true` if `name` refers to this model, either by model name
    /// or by full label.
    pub fn is_named(&self, name: &str) -> bool {
        name == self.model_name || name == self.label()
    }

    /// Looks up a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the primary key field, if one is declared.
    pub fn pk_field(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Returns the primary key field name, defaulting to `"id"`.
    pub fn pk_name(&self) -> &'static str {
        self.pk_field().map_or("id", |f| f.name)
    }

    /// Parses a submitted primary key into the type of this model's primary
    /// key field. Returns `None` for blank or malformed input.
    pub fn parse_pk(&self, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match self.pk_field().map(|f| &f.field_type) {
            None
            | Some(
                FieldType::AutoField
                | FieldType::BigAutoField
                | FieldType::IntegerField
                | FieldType::BigIntegerField,
            ) => raw.parse::<i64>().ok().map(Value::Int),
            Some(FieldType::UuidField) => uuid::Uuid::parse_str(raw).ok().map(Value::Uuid),
            Some(_) => Some(Value::String(raw.to_string())),
        }
    }

    /// Returns the fields a model form exposes: editable and not relations
    /// to many records.
    pub fn editable_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(|f| f.editable && !f.primary_key && f.is_concrete())
    }
}
