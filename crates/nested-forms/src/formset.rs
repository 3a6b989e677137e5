//! Sub-form groups: the rows of one relation, managed together.
//!
//! A [`SubFormGroup`] is what the synchronizer produces for one
//! declaration. It holds one [`ChildRow`] per row, the management counters,
//! the candidate children rows may reference, and the group-level errors
//! raised by [`SubFormGroup::is_valid`].

use std::collections::{BTreeMap, HashMap};

use nested_forms_db::record::Record;
use nested_forms_db::relation::Relation;
use nested_forms_db::value::Value;
use nested_forms_http::QueryDict;

use crate::form::{Form, NON_FIELD_ERRORS};
use crate::keyspace::{counter_key, INITIAL_FORMS, MAX_NUM_FORMS, MIN_NUM_FORMS, TOTAL_FORMS};
use crate::model_form::ModelForm;
use crate::nested::NestedForm;

/// Error recorded on a row whose primary key is not an available child.
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";

/// Error recorded on a group whose `TOTAL_FORMS` was submitted twice.
pub const CONCURRENT_SUBMISSION: &str =
    "The form was submitted more than once with different row counts. Reload it and try again.";

/// The form of one row: a plain model form or a nested form.
#[derive(Debug)]
pub enum ChildForm {
    /// A model form with no sub-forms.
    Leaf(ModelForm),
    /// A nested form with sub-forms of its own.
    Nested(Box<NestedForm>),
}

impl ChildForm {
    /// Returns the row form through the common [`Form`] surface.
    pub fn as_form(&self) -> &dyn Form {
        match self {
            Self::Leaf(form) => form,
            Self::Nested(form) => form.as_ref(),
        }
    }

    /// Validates the row form.
    pub fn is_valid(&mut self) -> bool {
        match self {
            Self::Leaf(form) => form.is_valid(),
            Self::Nested(form) => form.validate(),
        }
    }

    /// Returns `true` if the row's data, or any of its nested rows, changed.
    pub fn has_changed(&self) -> bool {
        self.as_form().has_changed()
    }

    /// Returns the errors of the row. Nested errors are already flattened.
    pub fn errors(&self) -> &HashMap<String, Vec<String>> {
        self.as_form().errors()
    }

    /// Returns the row prefix.
    pub fn prefix(&self) -> Option<&str> {
        self.as_form().prefix()
    }

    /// Returns `true` if the row may be submitted empty.
    pub fn empty_permitted(&self) -> bool {
        match self {
            Self::Leaf(form) => form.empty_permitted(),
            Self::Nested(form) => form.form().empty_permitted(),
        }
    }

    /// Returns the child record as loaded.
    pub fn instance(&self) -> &Record {
        match self {
            Self::Leaf(form) => form.instance(),
            Self::Nested(form) => form.instance(),
        }
    }

    /// Returns the child record with the row's cleaned values applied.
    pub fn construct_instance(&self) -> Record {
        match self {
            Self::Leaf(form) => form.construct_instance(),
            Self::Nested(form) => form.form().construct_instance(),
        }
    }
}

/// One row of a group.
#[derive(Debug)]
pub struct ChildRow {
    /// The row index in the submission.
    pub index: usize,
    /// The row form.
    pub form: ChildForm,
    /// Set when the row references a child that is not a candidate.
    pub pk_error: Option<String>,
}

impl ChildRow {
    /// Returns `true` for a new row left untouched. Blank rows are neither
    /// validated nor saved.
    pub fn is_blank(&self) -> bool {
        self.pk_error.is_none()
            && !self.form.instance().is_persisted()
            && self.form.empty_permitted()
            && !self.form.has_changed()
    }
}

/// The runtime state of one sub-form.
#[derive(Debug)]
pub struct SubFormGroup {
    pub(crate) name: String,
    pub(crate) prefix: String,
    pub(crate) relation: Relation,
    pub(crate) pk_field: String,
    pub(crate) bound: bool,
    pub(crate) rows: Vec<ChildRow>,
    pub(crate) initial: usize,
    pub(crate) min_num: usize,
    pub(crate) max_num: usize,
    pub(crate) total_values: usize,
    pub(crate) candidates: Vec<Record>,
    pub(crate) can_delete: bool,
    pub(crate) non_form_errors: Vec<String>,
}

impl SubFormGroup {
    /// Returns the declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the key prefix of the group's rows.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the relation the group edits.
    pub const fn relation(&self) -> &Relation {
        &self.relation
    }

    /// Returns `true` if the group was built from submitted data.
    pub const fn is_bound(&self) -> bool {
        self.bound
    }

    /// Returns the rows.
    pub fn rows(&self) -> &[ChildRow] {
        &self.rows
    }

    /// Returns the rows, mutably.
    pub fn rows_mut(&mut self) -> &mut [ChildRow] {
        &mut self.rows
    }

    /// Returns the row forms.
    pub fn forms(&self) -> impl Iterator<Item = &ChildForm> {
        self.rows.iter().map(|row| &row.form)
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the group has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the number of rows (initial + extra).
    pub fn total_form_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the number of rows editing an existing child.
    pub const fn initial_form_count(&self) -> usize {
        self.initial
    }

    /// Returns the children rows may reference.
    pub fn candidates(&self) -> &[Record] {
        &self.candidates
    }

    /// Returns `true` if rows may be deleted.
    pub const fn can_delete(&self) -> bool {
        self.can_delete
    }

    /// Returns the errors that belong to the group rather than one row.
    pub fn non_form_errors(&self) -> &[String] {
        &self.non_form_errors
    }

    /// Returns the management counters to render with the rows.
    pub fn management_data(&self) -> QueryDict {
        let prefix = &self.prefix;
        QueryDict::from_pairs([
            (
                counter_key(prefix, TOTAL_FORMS),
                self.total_form_count().to_string(),
            ),
            (
                counter_key(prefix, INITIAL_FORMS),
                self.initial_form_count().to_string(),
            ),
            (counter_key(prefix, MIN_NUM_FORMS), self.min_num.to_string()),
            (counter_key(prefix, MAX_NUM_FORMS), self.max_num.to_string()),
        ])
    }

    /// Returns the primary keys of the children edited by the rows.
    pub fn row_pks(&self) -> Vec<Value> {
        self.rows
            .iter()
            .filter_map(|row| row.form.instance().pk().cloned())
            .collect()
    }

    /// Validates every non-blank row and the group constraints: row
    /// limits, candidate availability, and a single submitted row count.
    ///
    /// An unbound group is valid.
    pub fn is_valid(&mut self) -> bool {
        self.non_form_errors.clear();
        if !self.bound {
            return true;
        }

        let mut valid = true;
        let mut filled = 0;
        for row in &mut self.rows {
            if row.is_blank() {
                continue;
            }
            filled += 1;
            if !row.form.is_valid() {
                valid = false;
            }
            if row.pk_error.is_some() {
                valid = false;
            }
        }

        if self.total_values > 1 {
            self.non_form_errors.push(CONCURRENT_SUBMISSION.to_string());
        }
        if filled < self.min_num {
            self.non_form_errors
                .push(format!("Please submit at least {} forms.", self.min_num));
        }
        if filled > self.max_num {
            self.non_form_errors
                .push(format!("Please submit at most {} forms.", self.max_num));
        }

        valid && self.non_form_errors.is_empty()
    }

    /// Returns `true` if any row changed.
    pub fn has_changed(&self) -> bool {
        self.rows.iter().any(|row| row.form.has_changed())
    }

    /// Returns the errors of all rows merged by field, plus the group's
    /// own errors under `__all__`.
    pub fn errors(&self) -> BTreeMap<String, Vec<String>> {
        let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in &self.rows {
            let mut fields: Vec<_> = row.form.errors().iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            for (field, messages) in fields {
                errors
                    .entry(field.clone())
                    .or_default()
                    .extend(messages.iter().cloned());
            }
            if let Some(message) = &row.pk_error {
                errors
                    .entry(self.pk_field.clone())
                    .or_default()
                    .push(message.clone());
            }
        }
        if !self.non_form_errors.is_empty() {
            errors
                .entry(NON_FIELD_ERRORS.to_string())
                .or_default()
                .extend(self.non_form_errors.iter().cloned());
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model_form::ModelFormConfig;
    use nested_forms_db::fields::{FieldDef, FieldType};
    use nested_forms_db::model::ModelMeta;

    fn phone_meta() -> Arc<ModelMeta> {
        Arc::new(
            ModelMeta::new("crm", "phone")
                .field(FieldDef::new("id", FieldType::BigAutoField).primary_key())
                .field(FieldDef::new("number", FieldType::CharField))
                .field(FieldDef::foreign_key("contact", "contact").related_name("phones")),
        )
    }

    fn row(index: usize, data: &QueryDict, instance: Option<Record>, empty: bool) -> ChildRow {
        let mut form = ModelForm::new(phone_meta(), &ModelFormConfig::new("phone"), instance, &[])
            .with_prefix(format!("phones-{index}"));
        form.set_empty_permitted(empty);
        form.bind(data, None);
        ChildRow {
            index,
            form: ChildForm::Leaf(form),
            pk_error: None,
        }
    }

    fn group(rows: Vec<ChildRow>) -> SubFormGroup {
        SubFormGroup {
            name: "phones".into(),
            prefix: "phones".into(),
            relation: Relation::ForeignKey {
                parent_model: "contact".into(),
                child_model: "phone".into(),
                fk_field: "contact".into(),
            },
            pk_field: "id".into(),
            bound: true,
            rows,
            initial: 0,
            min_num: 0,
            max_num: 1000,
            total_values: 1,
            candidates: Vec::new(),
            can_delete: true,
            non_form_errors: Vec::new(),
        }
    }

    #[test]
    fn test_blank_rows_are_skipped() {
        let data = QueryDict::parse("phones-0-number=555&phones-1-number=");
        let mut g = group(vec![row(0, &data, None, true), row(1, &data, None, true)]);
        assert!(!g.rows()[0].is_blank());
        assert!(g.rows()[1].is_blank());
        assert!(g.is_valid());
        assert!(g.has_changed());
    }

    #[test]
    fn test_invalid_row_errors_are_merged() {
        let data = QueryDict::parse("phones-0-number=&phones-1-number=");
        let mut g = group(vec![row(0, &data, None, false), row(1, &data, None, false)]);
        assert!(!g.is_valid());
        let errors = g.errors();
        assert_eq!(errors["number"].len(), 2);
    }

    #[test]
    fn test_min_and_max_rows() {
        let data = QueryDict::parse("phones-0-number=1&phones-1-number=2");
        let mut g = group(vec![row(0, &data, None, true), row(1, &data, None, true)]);
        g.min_num = 3;
        assert!(!g.is_valid());
        assert_eq!(g.non_form_errors(), ["Please submit at least 3 forms."]);

        g.min_num = 0;
        g.max_num = 1;
        assert!(!g.is_valid());
        assert_eq!(g.non_form_errors(), ["Please submit at most 1 forms."]);
    }

    #[test]
    fn test_two_row_counts_fail() {
        let data = QueryDict::parse("phones-0-number=1");
        let mut g = group(vec![row(0, &data, None, true)]);
        g.total_values = 2;
        assert!(!g.is_valid());
        assert_eq!(g.errors()["__all__"], vec![CONCURRENT_SUBMISSION.to_string()]);
    }

    #[test]
    fn test_pk_error_invalidates_row() {
        let data = QueryDict::parse("phones-0-number=1");
        let mut r = row(0, &data, None, false);
        r.pk_error = Some(INVALID_CHOICE.to_string());
        let mut g = group(vec![r]);
        assert!(!g.is_valid());
        assert_eq!(g.errors()["id"], vec![INVALID_CHOICE.to_string()]);
    }

    #[test]
    fn test_unbound_group_is_valid() {
        let mut g = group(Vec::new());
        g.bound = false;
        g.total_values = 2;
        assert!(g.is_valid());
    }

    #[test]
    fn test_management_data() {
        let data = QueryDict::parse("phones-0-number=1");
        let existing = Record::new("phone").with_pk(3).with_value("number", "1");
        let mut g = group(vec![row(0, &data, Some(existing), false)]);
        g.initial = 1;
        let management = g.management_data();
        assert_eq!(management.get("phones-TOTAL_FORMS"), Some("1"));
        assert_eq!(management.get("phones-INITIAL_FORMS"), Some("1"));
        assert_eq!(management.get("phones-MIN_NUM_FORMS"), Some("0"));
        assert_eq!(management.get("phones-MAX_NUM_FORMS"), Some("1000"));
        assert_eq!(g.row_pks(), vec![Value::Int(3)]);
    }
}
