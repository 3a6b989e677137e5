//! Reconciling submitted rows with the live set of related records.
//!
//! [`synchronize`] turns one [`SubFormDeclaration`] plus the submission
//! into a [`SubFormGroup`]. Before any child form is built the submission
//! is repaired in place, in this order:
//!
//! 1. duplicate the last row when the row counter was submitted twice and
//!    the declaration asks for it;
//! 2. prune rows that reference a child which no longer exists;
//! 3. reset every row to the declared initial rows when the update key
//!    was submitted;
//! 4. remove rows carrying a delete marker, deleting their child.
//!
//! Every removal goes through [`keyspace::shift`], so row indices stay
//! contiguous and the counters follow.

use std::collections::HashMap;
use std::sync::Arc;

use nested_forms_core::logging::form_span;
use nested_forms_core::{FormsError, FormsResult, Settings};
use nested_forms_db::model::ModelMeta;
use nested_forms_db::record::Record;
use nested_forms_db::relation::{resolve_relation, Relation, RelationKind};
use nested_forms_db::store::{find, RecordStore};
use nested_forms_db::value::Value;
use nested_forms_http::{FileDict, QueryDict};

use crate::declaration::{exclusion_matches, FormFactory, InitialRow, SubFormDeclaration};
use crate::formset::{ChildForm, ChildRow, SubFormGroup, INVALID_CHOICE};
use crate::keyspace::{
    self, canonical_count, count_values, counter_key, decrement, is_truthy, parse_row_key,
    read_count, row_prefix, write_count, INITIAL_FORMS, TOTAL_FORMS,
};
use crate::model_form::ModelForm;
use crate::nested::{FormInput, NestedForm};

/// Everything one synchronization reads from its parent form.
pub(crate) struct SyncContext<'a> {
    pub store: &'a dyn RecordStore,
    /// The parent record, carrying its cleaned values when they are valid.
    pub parent: &'a Record,
    pub parent_prefix: Option<&'a str>,
    pub data: Option<&'a QueryDict>,
    pub files: Option<&'a FileDict>,
    /// Sub-form prefixes whose delete markers are ignored.
    pub safe_delete: &'a [String],
    pub settings: &'a Settings,
    /// Set when rebuilding after a save: no extra rows, no initial rows.
    pub rebuild: bool,
}

/// Returns the prefix of a sub-form: `<parent prefix>-<name>`, or the bare
/// name at the top level.
pub fn sub_form_prefix(parent_prefix: Option<&str>, name: &str) -> String {
    match parent_prefix {
        Some(p) if !p.is_empty() => format!("{p}-{name}"),
        _ => name.to_string(),
    }
}

/// Builds the runtime group of one declaration and the child records the
/// parent will carry once saved.
pub(crate) fn synchronize(
    ctx: &SyncContext<'_>,
    decl: &SubFormDeclaration,
) -> FormsResult<(SubFormGroup, Vec<Record>)> {
    let prefix = sub_form_prefix(ctx.parent_prefix, &decl.name);
    let span = form_span(&prefix);
    let _guard = span.enter();

    let relation = resolve_relation(
        ctx.store,
        &ctx.parent.model,
        &decl.name,
        decl.fk_name.as_deref(),
    )?;
    if let Some(kind) = decl.kind {
        if kind != relation.kind() {
            return Err(FormsError::ConfigurationError(format!(
                "sub-form '{}' is declared as {kind:?} but resolves to {:?}",
                decl.name,
                relation.kind()
            )));
        }
    }
    let child_meta = ctx.store.meta(relation.child_model())?;
    let factory = decl.form.resolve(ctx.parent);
    if !child_meta.is_named(factory.model()) {
        return Err(FormsError::ConfigurationError(format!(
            "sub-form '{}' edits '{}' but its form is for '{}'",
            decl.name,
            child_meta.model_name,
            factory.model()
        )));
    }

    let (extra, initial_rows) = if ctx.rebuild {
        (0, Vec::new())
    } else {
        (decl.extra.resolve(ctx.parent), decl.initial.resolve(ctx.parent))
    };
    let update_key = decl
        .update_button
        .as_ref()
        .map(|setting| setting.resolve(prefix.as_str()));
    let pk_name = child_meta
        .pk_field()
        .map_or(ctx.settings.pk_field_name.as_str(), |f| f.name);
    let total_key = counter_key(&prefix, TOTAL_FORMS);
    let initial_key = counter_key(&prefix, INITIAL_FORMS);

    let mut data = ctx.data.and_then(|d| keyspace::slice(d, &prefix));
    let mut files = ctx.files.and_then(|f| keyspace::slice_files(f, &prefix));
    let mut total_values = data
        .as_ref()
        .map_or(0, |d| count_values(d, &total_key).len());

    if let Some(data) = data.as_mut() {
        if decl.duplicate && total_values > 1 {
            let count = canonical_count(data, &total_key);
            write_count(data, &total_key, count)?;
            total_values = 1;
            if count >= 2 {
                let source = count - 2;
                let start = format!("{}-", row_prefix(&prefix, source));
                let exclusions: Vec<String> = decl
                    .exclude_from_duplication
                    .iter()
                    .map(|setting| setting.resolve(start.as_str()))
                    .collect();
                duplicate_row(data, &prefix, source, pk_name, &exclusions)?;
            }
            tracing::debug!(rows = count, "duplicated last row");
        }

        let limit = read_count(data, &initial_key).min(ctx.settings.absolute_max_forms);
        let mut index = 0;
        for _ in 0..limit {
            let raw = data
                .get(&row_key(&prefix, index, pk_name))
                .unwrap_or_default()
                .to_string();
            let exists = match child_meta.parse_pk(&raw) {
                Some(pk) => find(ctx.store, child_meta.model_name, &pk)?.is_some(),
                None => false,
            };
            if exists {
                index += 1;
                continue;
            }
            tracing::debug!(row = index, pk = %raw, "pruning row with a stale reference");
            remove_row(data, files.as_mut(), &prefix, index)?;
            decrement(data, &initial_key)?;
        }
    }

    if let Some(key) = &update_key {
        if ctx.data.is_some_and(|d| d.contains_key(key)) {
            let data = data.get_or_insert_with(QueryDict::new_mutable);
            reset_rows(data, files.as_mut(), &prefix, &decl.initial.resolve(ctx.parent))?;
            if ctx.parent.is_persisted() {
                relation.clear(ctx.store, ctx.parent)?;
            }
            total_values = 1;
            tracing::debug!(key = %key, "reset rows to their initial values");
        }
    }

    if let Some(data) = data.as_mut() {
        let exempt = ctx.safe_delete.iter().any(|p| *p == prefix);
        if decl.can_delete && !exempt {
            let total = canonical_count(data, &total_key).min(ctx.settings.absolute_max_forms);
            for index in (0..total).rev() {
                let marker = row_key(&prefix, index, &ctx.settings.delete_marker);
                if !is_truthy(data.get(&marker)) {
                    continue;
                }
                let raw = data
                    .get(&row_key(&prefix, index, pk_name))
                    .unwrap_or_default()
                    .to_string();
                let deleted = delete_child(ctx, &relation, &child_meta, &raw)?;
                remove_row(data, files.as_mut(), &prefix, index)?;
                if deleted {
                    decrement(data, &initial_key)?;
                }
                tracing::debug!(row = index, pk = %raw, deleted, "removed deleted row");
            }
        }
        let total = canonical_count(data, &total_key);
        if read_count(data, &initial_key) > total {
            write_count(data, &initial_key, total)?;
        }
    }

    if data.as_ref().is_some_and(|d| !d.contains_key(&total_key)) {
        data = None;
        files = None;
    }

    let candidates = candidates(ctx, decl, &relation, &child_meta, data.as_ref(), &prefix, pk_name)?;

    let builder = RowBuilder {
        ctx,
        factory: &factory,
        relation: &relation,
        child_meta: &child_meta,
        prefix: &prefix,
        data: data.as_ref(),
        files: files.as_ref(),
    };
    let mut rows = Vec::new();
    let initial;
    if let Some(data) = data.as_ref() {
        let total = canonical_count(data, &total_key).min(ctx.settings.absolute_max_forms);
        initial = read_count(data, &initial_key).min(total);
        for index in 0..total {
            let mut instance = None;
            let mut pk_error = None;
            if index < initial {
                let raw = data.get(&row_key(&prefix, index, pk_name)).unwrap_or_default();
                instance = candidates
                    .iter()
                    .find(|c| c.pk().is_some_and(|pk| pk.matches_form_value(raw)))
                    .cloned();
                if instance.is_none() {
                    pk_error = Some(INVALID_CHOICE.to_string());
                }
            }
            let form = builder.build(index, instance, HashMap::new(), index >= initial)?;
            rows.push(ChildRow {
                index,
                form,
                pk_error,
            });
        }
    } else {
        let max = ctx.settings.absolute_max_forms;
        for child in candidates.iter().take(max) {
            let index = rows.len();
            let form = builder.build(index, Some(child.clone()), HashMap::new(), false)?;
            rows.push(ChildRow {
                index,
                form,
                pk_error: None,
            });
        }
        initial = rows.len();
        let blank = extra.max(initial_rows.len());
        for seed in 0..blank {
            let index = rows.len();
            if index >= max {
                break;
            }
            let seed_values = initial_rows.get(seed).map(seed_values).unwrap_or_default();
            let form = builder.build(index, None, seed_values, true)?;
            rows.push(ChildRow {
                index,
                form,
                pk_error: None,
            });
        }
    }

    tracing::debug!(
        rows = rows.len(),
        initial,
        bound = data.is_some(),
        "synchronized sub-form"
    );

    let group = SubFormGroup {
        name: decl.name.clone(),
        prefix,
        relation,
        pk_field: pk_name.to_string(),
        bound: data.is_some(),
        rows,
        initial,
        min_num: decl.min_num,
        max_num: decl.max_num.unwrap_or(ctx.settings.default_max_num_forms),
        total_values,
        candidates,
        can_delete: decl.can_delete,
        non_form_errors: Vec::new(),
    };
    let pending = pending_children(&group, ctx.parent);
    Ok((group, pending))
}

/// Returns the child records of a group as they would be saved under
/// `parent`.
pub(crate) fn pending_children(group: &SubFormGroup, parent: &Record) -> Vec<Record> {
    group
        .rows
        .iter()
        .map(|row| {
            let mut child = row.form.construct_instance();
            group.relation.attach(&mut child, parent);
            child
        })
        .collect()
}

fn row_key(prefix: &str, index: usize, field: &str) -> String {
    format!("{}-{field}", row_prefix(prefix, index))
}

fn seed_values(row: &InitialRow) -> HashMap<String, Value> {
    row.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Removes row `index` from the text and file submissions and lowers the
/// row counter.
fn remove_row(
    data: &mut QueryDict,
    files: Option<&mut FileDict>,
    prefix: &str,
    index: usize,
) -> FormsResult<()> {
    keyspace::shift(data, prefix, index, false)?;
    if let Some(files) = files {
        keyspace::shift(files, prefix, index, true)?;
    }
    decrement(data, &counter_key(prefix, TOTAL_FORMS))
}

/// Copies row `source` into the row after it. Primary keys are never
/// copied, and nested row counters start over at zero initial rows.
fn duplicate_row(
    data: &mut QueryDict,
    prefix: &str,
    source: usize,
    pk_name: &str,
    exclusions: &[String],
) -> FormsResult<()> {
    let pk_suffix = format!("-{pk_name}");
    let initial_suffix = format!("-{INITIAL_FORMS}");
    let target_prefix = row_prefix(prefix, source + 1);

    let keys: Vec<String> = data.keys().cloned().collect();
    for key in keys {
        let Some((index, rest)) = parse_row_key(prefix, &key) else {
            continue;
        };
        if index != source || rest == pk_name || rest.ends_with(&pk_suffix) {
            continue;
        }
        if exclusions.iter().any(|pattern| exclusion_matches(pattern, &key)) {
            continue;
        }
        let values = if rest.ends_with(&initial_suffix) {
            vec!["0".to_string()]
        } else {
            data.get_list(&key).cloned().unwrap_or_default()
        };
        data.set_list(&format!("{target_prefix}-{rest}"), values)?;
    }
    Ok(())
}

/// Replaces every row with the declared initial rows.
fn reset_rows(
    data: &mut QueryDict,
    files: Option<&mut FileDict>,
    prefix: &str,
    initial_rows: &[InitialRow],
) -> FormsResult<()> {
    data.retain(|key| parse_row_key(prefix, key).is_none())?;
    if let Some(files) = files {
        files.retain(|key| parse_row_key(prefix, key).is_none());
    }
    for (index, row) in initial_rows.iter().enumerate() {
        for (field, value) in row {
            data.set(&row_key(prefix, index, field), &value.as_form_value())?;
        }
    }
    write_count(data, &counter_key(prefix, INITIAL_FORMS), 0)?;
    write_count(data, &counter_key(prefix, TOTAL_FORMS), initial_rows.len())
}

/// Deletes the child a marked row references. Returns `true` if a child of
/// this parent was found and deleted.
fn delete_child(
    ctx: &SyncContext<'_>,
    relation: &Relation,
    child_meta: &ModelMeta,
    raw_pk: &str,
) -> FormsResult<bool> {
    let Some(pk) = child_meta.parse_pk(raw_pk) else {
        return Ok(false);
    };
    let Some(child) = find(ctx.store, child_meta.model_name, &pk)? else {
        return Ok(false);
    };
    if !relation.owns(&child, ctx.parent) {
        tracing::warn!(pk = %pk, "refusing to delete a record of another parent");
        return Ok(false);
    }
    relation.remove(ctx.store, ctx.parent, &child)?;
    Ok(true)
}

/// Lists the children rows may reference.
fn candidates(
    ctx: &SyncContext<'_>,
    decl: &SubFormDeclaration,
    relation: &Relation,
    child_meta: &ModelMeta,
    data: Option<&QueryDict>,
    prefix: &str,
    pk_name: &str,
) -> FormsResult<Vec<Record>> {
    let mut candidates = match &decl.queryset {
        Some(queryset) => queryset.resolve(ctx.parent),
        None => relation.related(ctx.store, ctx.parent)?,
    };

    if decl.queryset.is_none() && relation.kind() != RelationKind::ForeignKey {
        if let Some(data) = data {
            let total = canonical_count(data, &counter_key(prefix, TOTAL_FORMS));
            let initial = read_count(data, &counter_key(prefix, INITIAL_FORMS))
                .min(total)
                .min(ctx.settings.absolute_max_forms);
            for index in 0..initial {
                let Some(pk) = data
                    .get(&row_key(prefix, index, pk_name))
                    .and_then(|raw| child_meta.parse_pk(raw))
                else {
                    continue;
                };
                if candidates.iter().any(|c| c.pk() == Some(&pk)) {
                    continue;
                }
                if let Some(child) = find(ctx.store, child_meta.model_name, &pk)? {
                    candidates.push(child);
                }
            }
        }
    }

    if let Some(allowed) = &decl.allowed_objects {
        let allowed = allowed.resolve(ctx.parent);
        candidates.retain(|c| c.pk().is_some_and(|pk| allowed.contains(pk)));
    }
    Ok(candidates)
}

/// Builds the child form of one row.
struct RowBuilder<'a> {
    ctx: &'a SyncContext<'a>,
    factory: &'a FormFactory,
    relation: &'a Relation,
    child_meta: &'a Arc<ModelMeta>,
    prefix: &'a str,
    data: Option<&'a QueryDict>,
    files: Option<&'a FileDict>,
}

impl RowBuilder<'_> {
    fn build(
        &self,
        index: usize,
        instance: Option<Record>,
        seed: HashMap<String, Value>,
        empty_permitted: bool,
    ) -> FormsResult<ChildForm> {
        let row = row_prefix(self.prefix, index);
        let hidden = self.relation.managed_fields();

        match self.factory {
            FormFactory::Leaf(config) => {
                let mut form = ModelForm::new(Arc::clone(self.child_meta), config, instance, &hidden)
                    .with_prefix(row)
                    .with_initial(&seed);
                form.set_empty_permitted(empty_permitted);
                if let Some(data) = self.data {
                    form.bind(data, self.files);
                }
                Ok(ChildForm::Leaf(form))
            }
            FormFactory::Nested(config) => {
                let parent_link = match self.relation {
                    Relation::ForeignKey { fk_field, .. } => {
                        Some((fk_field.clone(), self.ctx.parent.clone()))
                    }
                    _ => None,
                };
                let input = FormInput {
                    data: self
                        .data
                        .map(|d| keyspace::slice(d, &row).unwrap_or_else(QueryDict::new_mutable)),
                    files: self.files.and_then(|f| keyspace::slice_files(f, &row)),
                    instance,
                    prefix: Some(row),
                    parent_link,
                    safe_delete: self.ctx.safe_delete.to_vec(),
                    hidden: hidden.iter().map(ToString::to_string).collect(),
                    initial: seed,
                    empty_permitted,
                    rebuild: self.ctx.rebuild,
                };
                let form = NestedForm::new(self.ctx.store, Arc::clone(config), input)?;
                Ok(ChildForm::Nested(Box::new(form)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_form_prefix() {
        assert_eq!(sub_form_prefix(None, "contacts"), "contacts");
        assert_eq!(sub_form_prefix(Some(""), "contacts"), "contacts");
        assert_eq!(
            sub_form_prefix(Some("contacts-0"), "phones"),
            "contacts-0-phones"
        );
    }

    #[test]
    fn test_duplicate_row_skips_keys() {
        let mut data = QueryDict::from_pairs([
            ("contacts-0-name", "Ann"),
            ("contacts-0-id", "4"),
            ("contacts-0-email", "ann@example.com"),
            ("contacts-0-phones-INITIAL_FORMS", "2"),
            ("contacts-0-phones-0-id", "7"),
            ("contacts-0-phones-0-number", "555"),
        ])
        .copy();
        duplicate_row(&mut data, "contacts", 0, "id", &["contacts-0-email".to_string()]).unwrap();

        assert_eq!(data.get("contacts-1-name"), Some("Ann"));
        assert_eq!(data.get("contacts-1-phones-INITIAL_FORMS"), Some("0"));
        assert_eq!(data.get("contacts-1-phones-0-number"), Some("555"));
        assert!(!data.contains_key("contacts-1-id"));
        assert!(!data.contains_key("contacts-1-phones-0-id"));
        assert!(!data.contains_key("contacts-1-email"));
    }

    #[test]
    fn test_reset_rows() {
        let mut data = QueryDict::from_pairs([
            ("contacts-TOTAL_FORMS", "2"),
            ("contacts-INITIAL_FORMS", "1"),
            ("contacts-0-name", "Ann"),
            ("contacts-1-name", "Bob"),
        ])
        .copy();
        let row: InitialRow = [("name".to_string(), Value::from("Seed"))].into();
        reset_rows(&mut data, None, "contacts", &[row]).unwrap();

        assert_eq!(data.get("contacts-TOTAL_FORMS"), Some("1"));
        assert_eq!(data.get("contacts-INITIAL_FORMS"), Some("0"));
        assert_eq!(data.get("contacts-0-name"), Some("Seed"));
        assert!(!data.contains_key("contacts-1-name"));
    }

    #[test]
    fn test_remove_row_lowers_total() {
        let mut data = QueryDict::from_pairs([
            ("contacts-TOTAL_FORMS", "2"),
            ("contacts-0-name", "Ann"),
            ("contacts-1-name", "Bob"),
        ])
        .copy();
        remove_row(&mut data, None, "contacts", 0).unwrap();
        assert_eq!(data.get("contacts-TOTAL_FORMS"), Some("1"));
        assert_eq!(data.get("contacts-0-name"), Some("Bob"));
        assert!(!data.contains_key("contacts-1-name"));
    }
}
