//! Dynamic records.
//!
//! A [`Record`] is one row of a model: the model name, the primary key
//! (absent while the record is transient), and the field values keyed by
//! field name. The nested form engine builds, mutates, and persists records
//! without knowing any concrete Rust type for them.

use std::collections::BTreeMap;

use crate::value::Value;

/// One row of a model, identified by model name and optional primary key.
///
/// # Examples
///
/// ```
/// use nested_forms_db::record::Record;
/// use nested_forms_db::value::Value;
///
/// let mut contact = Record::new("contact").with_value("name", "Ada");
/// assert!(!contact.is_persisted());
///
/// contact.set_pk(Value::Int(7));
/// assert!(contact.is_persisted());
/// assert_eq!(contact.get("name"), Some(&Value::from("Ada")));
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Record {
    /// The model this record belongs to.
    pub model: String,
    /// The primary key; `None` until the record has been saved.
    pub pk: Option<Value>,
    /// Field values keyed by field name.
    pub values: BTreeMap<String, Value>,
}

impl Record {
    /// Creates a transient record with no values.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            pk: None,
            values: BTreeMap::new(),
        }
    }

    /// Sets the primary key (builder form).
    #[must_use]
    pub fn with_pk(mut self, pk: impl Into<Value>) -> Self {
        self.set_pk(pk.into());
        self
    }

    /// Sets a field value (builder form).
    #[must_use]
    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Returns the primary key if the record is persisted.
    pub fn pk(&self) -> Option<&Value> {
        self.pk.as_ref().filter(|v| !v.is_null())
    }

    /// Sets the primary key. Setting `Value::Null` makes the record transient.
    pub fn set_pk(&mut self, pk: Value) {
        self.pk = if pk.is_null() { None } else { Some(pk) };
    }

    /// Returns `true` once the record has a primary key.
    pub fn is_persisted(&self) -> bool {
        self.pk().is_some()
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Sets a field value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    /// Removes a field value.
    pub fn unset(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    /// Returns `true` if `other` is the same stored row (same model and pk).
    pub fn same_row(&self, other: &Self) -> bool {
        self.model == other.model && self.pk().is_some() && self.pk() == other.pk()
    }

    /// Returns the primary key rendered for a submission, or `""` when
    /// transient.
    pub fn pk_form_value(&self) -> String {
        self.pk().map(Value::as_form_value).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_transient() {
        let r = Record::new("phone");
        assert_eq!(r.model, "phone");
        assert!(r.pk().is_none());
        assert!(!r.is_persisted());
        assert_eq!(r.pk_form_value(), "");
    }

    #[test]
    fn test_null_pk_is_transient() {
        let mut r = Record::new("phone").with_pk(3);
        assert!(r.is_persisted());
        r.set_pk(Value::Null);
        assert!(!r.is_persisted());
    }

    #[test]
    fn test_values() {
        let mut r = Record::new("phone").with_value("number", "555");
        r.set("kind", "home");
        assert_eq!(r.get("number").and_then(Value::as_str), Some("555"));
        assert_eq!(r.unset("kind"), Some(Value::from("home")));
        assert!(r.get("kind").is_none());
    }

    #[test]
    fn test_same_row() {
        let a = Record::new("phone").with_pk(1).with_value("number", "1");
        let b = Record::new("phone").with_pk(1).with_value("number", "2");
        let c = Record::new("contact").with_pk(1);
        assert!(a.same_row(&b));
        assert!(!a.same_row(&c));
        assert!(!Record::new("phone").same_row(&Record::new("phone")));
    }

    #[test]
    fn test_pk_form_value() {
        assert_eq!(Record::new("x").with_pk(42).pk_form_value(), "42");
    }
}
