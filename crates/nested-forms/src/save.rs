//! Committing a validated nested form.
//!
//! The parent is saved first so children can point at it. Each bound group
//! is then saved row by row, children no row kept are removed, and
//! many-to-many links are written last. Finally the form forgets the
//! submission and rebuilds its groups from the store.
//!
//! No transaction is opened here; wrap the call in
//! [`atomic`](nested_forms_db::store::atomic) to make the save all or
//! nothing.

use std::sync::Arc;

use nested_forms_core::logging::form_span;
use nested_forms_core::FormsResult;
use nested_forms_db::record::Record;
use nested_forms_db::relation::Relation;
use nested_forms_db::store::RecordStore;
use nested_forms_db::value::Value;

use crate::form::Form;
use crate::formset::{ChildForm, SubFormGroup};
use crate::model_form::ModelForm;
use crate::nested::{FormState, NestedForm};

impl NestedForm {
    /// Validates and saves the form.
    ///
    /// Returns `Ok(None)` when the form is invalid; nothing is written.
    /// Without `commit` the record is returned with the cleaned values
    /// applied but not saved, and the sub-forms are left alone.
    ///
    /// # Errors
    ///
    /// Propagates store failures. Rows saved before the failure stay saved
    /// unless the caller rolls back.
    pub fn save(&mut self, store: &dyn RecordStore, commit: bool) -> FormsResult<Option<Record>> {
        if !self.validate() {
            return Ok(None);
        }
        if !commit {
            return Ok(Some(self.form.construct_instance()));
        }

        let record = self.commit_tree(store, None)?;
        self.rebuild(store, record.clone())?;
        tracing::info!(
            model = %record.model,
            pk = %record.pk_form_value(),
            "saved nested form"
        );
        Ok(Some(record))
    }

    /// Saves this record, pointed at `parent` through `relation` when
    /// given, then its bound groups.
    fn commit_tree(
        &mut self,
        store: &dyn RecordStore,
        parent: Option<(&Relation, &Record)>,
    ) -> FormsResult<Record> {
        let span = form_span(self.form.prefix().unwrap_or_default());
        let _guard = span.enter();

        let mut record = self.form.construct_instance();
        if let Some((relation, parent)) = parent {
            relation.attach(&mut record, parent);
        }
        store.save(&mut record)?;

        for group in &mut self.groups {
            if group.is_bound() {
                save_group(store, group, &record)?;
            }
        }
        Ok(record)
    }

    /// Drops the submission and rebuilds the form over `record`, unbound,
    /// without extra or initial rows.
    fn rebuild(&mut self, store: &dyn RecordStore, record: Record) -> FormsResult<()> {
        self.data = None;
        self.files = None;
        self.errors.clear();

        let hidden: Vec<&str> = self.hidden.iter().map(String::as_str).collect();
        let mut form = ModelForm::new(
            Arc::clone(self.form.meta()),
            &self.config.form,
            Some(record),
            &hidden,
        );
        if let Some(prefix) = self.form.prefix() {
            form = form.with_prefix(prefix.to_string());
        }
        self.form = form;
        self.load(store, true)?;
        self.state = FormState::Saved;
        Ok(())
    }
}

/// Saves the rows of one group under `parent` and removes the candidates
/// no row kept.
fn save_group(
    store: &dyn RecordStore,
    group: &mut SubFormGroup,
    parent: &Record,
) -> FormsResult<()> {
    let relation = &group.relation;
    let mut kept: Vec<Value> = Vec::new();

    for row in &mut group.rows {
        if row.is_blank() {
            continue;
        }
        let child = match &mut row.form {
            ChildForm::Leaf(form) => {
                let mut child = form.construct_instance();
                relation.attach(&mut child, parent);
                store.save(&mut child)?;
                child
            }
            ChildForm::Nested(form) => form.commit_tree(store, Some((relation, parent)))?,
        };
        if let Some(pk) = child.pk() {
            kept.push(pk.clone());
        }
    }

    let mut removed = 0;
    for candidate in &group.candidates {
        if candidate.pk().is_some_and(|pk| !kept.contains(pk)) {
            relation.discard(store, candidate)?;
            removed += 1;
        }
    }
    relation.link(store, parent, &kept)?;

    tracing::debug!(
        group = %group.name,
        kept = kept.len(),
        removed,
        "saved sub-form"
    );
    Ok(())
}
