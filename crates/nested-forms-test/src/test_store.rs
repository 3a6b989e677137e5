//! An in-memory record store for tests.
//!
//! [`TestStore`] implements [`RecordStore`] over plain vectors guarded by a
//! mutex. It assigns integer primary keys, enforces non-null foreign keys,
//! cascades deletes along foreign keys, and counts every data access so
//! tests can assert on query counts with
//! [`assert_num_queries`](crate::assert_num_queries).
//!
//! Transactions are snapshots: [`begin`](RecordStore::begin) pushes a copy
//! of the data, [`rollback`](RecordStore::rollback) restores it, and
//! [`commit`](RecordStore::commit) drops it.
//!
//! ## Example
//!
//! ```
//! use nested_forms_db::{Record, RecordStore};
//! use nested_forms_test::fixtures::crm_models;
//! use nested_forms_test::TestStore;
//!
//! let store = TestStore::new(crm_models());
//! let mut acme = Record::new("thirdparty").with_value("name", "Acme");
//! store.save(&mut acme).unwrap();
//! assert!(acme.is_persisted());
//! assert_eq!(store.query_count(), 1);
//! ```

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use nested_forms_core::{FormsError, FormsResult};
use nested_forms_db::fields::{FieldType, OnDelete};
use nested_forms_db::model::ModelMeta;
use nested_forms_db::record::Record;
use nested_forms_db::store::{unknown_model, RecordStore};
use nested_forms_db::value::Value;

/// A many-to-many link: `(model, field, from, to)`.
type Link = (String, String, Value, Value);

#[derive(Debug, Clone, Default)]
struct Tables {
    records: Vec<Record>,
    links: Vec<Link>,
    next_pk: i64,
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    snapshots: Vec<Tables>,
}

/// An in-memory [`RecordStore`].
///
/// Clones share the same data and query counter.
#[derive(Clone)]
pub struct TestStore {
    metas: Arc<Vec<Arc<ModelMeta>>>,
    state: Arc<Mutex<State>>,
    query_count: Arc<AtomicUsize>,
}

impl std::fmt::Debug for TestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestStore")
            .field("models", &self.metas.len())
            .field("query_count", &self.query_count())
            .finish_non_exhaustive()
    }
}

impl TestStore {
    /// Creates an empty store for the given models.
    pub fn new(metas: Vec<ModelMeta>) -> Self {
        Self {
            metas: Arc::new(metas.into_iter().map(Arc::new).collect()),
            state: Arc::new(Mutex::new(State {
                tables: Tables {
                    next_pk: 1,
                    ..Tables::default()
                },
                snapshots: Vec::new(),
            })),
            query_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Saves a record and returns it with its primary key.
    ///
    /// # Panics
    ///
    /// Panics if the save fails.
    pub fn insert(&self, mut record: Record) -> Record {
        self.save(&mut record)
            .unwrap_or_else(|e| panic!("Failed to insert {}: {e}", record.model));
        record
    }

    /// Returns every record of `model`, in primary key order.
    pub fn all(&self, model: &str) -> Vec<Record> {
        self.lock()
            .map(|state| {
                state
                    .tables
                    .records
                    .iter()
                    .filter(|r| r.model == model)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the number of records of `model`.
    pub fn count(&self, model: &str) -> usize {
        self.all(model).len()
    }

    /// Returns the current query count.
    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::Relaxed)
    }

    /// Resets the query counter to zero.
    pub fn reset_query_count(&self) {
        self.query_count.store(0, Ordering::Relaxed);
    }

    /// Returns the number of open transactions.
    pub fn depth(&self) -> usize {
        self.lock().map_or(0, |state| state.snapshots.len())
    }

    fn lock(&self) -> FormsResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| FormsError::DatabaseError("test store lock poisoned".to_string()))
    }

    fn count_query(&self) {
        self.query_count.fetch_add(1, Ordering::Relaxed);
    }

    fn check_not_null(&self, meta: &ModelMeta, record: &Record) -> FormsResult<()> {
        for field in &meta.fields {
            if !matches!(field.field_type, FieldType::ForeignKey { .. }) || field.null {
                continue;
            }
            if record.get(field.name).map_or(true, Value::is_null) {
                return Err(FormsError::IntegrityError(format!(
                    "NOT NULL constraint failed: {}.{}",
                    meta.model_name, field.name
                )));
            }
        }
        Ok(())
    }

    /// Returns the model a many-to-many field links to.
    fn link_target(&self, model: &str, field: &str) -> Option<&'static str> {
        let target = self.meta(model).ok()?.get_field(field)?.related_model()?.to_string();
        self.meta(&target).ok().map(|m| m.model_name)
    }

    /// Deletes a record and applies the `on_delete` rule of every foreign
    /// key pointing at it.
    fn delete_cascading(&self, tables: &mut Tables, model: &str, pk: &Value) -> FormsResult<()> {
        let before = tables.records.len();
        tables
            .records
            .retain(|r| !(r.model == model && r.pk() == Some(pk)));
        if tables.records.len() == before {
            return Ok(());
        }
        tables.links.retain(|(m, f, from, to)| {
            let owner = m == model && from == pk;
            let target = to == pk && self.link_target(m, f) == Some(model);
            !(owner || target)
        });

        for meta in self.metas.iter() {
            for field in &meta.fields {
                let FieldType::ForeignKey { to, on_delete, .. } = &field.field_type else {
                    continue;
                };
                if !self.meta(to).is_ok_and(|m| m.model_name == model) {
                    continue;
                }
                let children: Vec<Value> = tables
                    .records
                    .iter()
                    .filter(|r| r.model == meta.model_name && r.get(field.name) == Some(pk))
                    .filter_map(|r| r.pk().cloned())
                    .collect();
                match on_delete {
                    OnDelete::Cascade => {
                        for child in &children {
                            self.delete_cascading(tables, meta.model_name, child)?;
                        }
                    }
                    OnDelete::SetNull => {
                        for record in tables.records.iter_mut().filter(|r| {
                            r.model == meta.model_name && r.get(field.name) == Some(pk)
                        }) {
                            record.set(field.name, Value::Null);
                        }
                    }
                    OnDelete::Protect if !children.is_empty() => {
                        return Err(FormsError::IntegrityError(format!(
                            "cannot delete {model} {pk}: referenced by {}",
                            meta.model_name
                        )));
                    }
                    OnDelete::Protect | OnDelete::DoNothing => {}
                }
            }
        }
        Ok(())
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (Some(Value::Int(x)), Some(Value::Int(y))) => x.cmp(y),
        (Some(Value::Float(x)), Some(Value::Float(y))) => x.total_cmp(y),
        (Some(x), Some(y)) => x.as_form_value().cmp(&y.as_form_value()),
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    }
}

impl RecordStore for TestStore {
    fn meta(&self, model: &str) -> FormsResult<Arc<ModelMeta>> {
        self.metas
            .iter()
            .find(|m| m.is_named(model))
            .cloned()
            .ok_or_else(|| unknown_model(model))
    }

    fn models(&self) -> Vec<Arc<ModelMeta>> {
        self.metas.to_vec()
    }

    fn get(&self, model: &str, pk: &Value) -> FormsResult<Record> {
        self.count_query();
        let meta = self.meta(model)?;
        self.lock()?
            .tables
            .records
            .iter()
            .find(|r| r.model == meta.model_name && r.pk() == Some(pk))
            .cloned()
            .ok_or_else(|| {
                FormsError::DoesNotExist(format!("{} matching pk {pk} does not exist", meta.model_name))
            })
    }

    fn filter(&self, model: &str, conditions: &[(&str, Value)]) -> FormsResult<Vec<Record>> {
        self.count_query();
        let meta = self.meta(model)?;
        let mut records: Vec<Record> = self
            .lock()?
            .tables
            .records
            .iter()
            .filter(|r| r.model == meta.model_name)
            .filter(|r| conditions.iter().all(|(field, value)| r.get(field) == Some(value)))
            .cloned()
            .collect();
        for key in meta.ordering.iter().rev() {
            let (field, descending) = key
                .strip_prefix('-')
                .map_or((*key, false), |field| (field, true));
            records.sort_by(|a, b| {
                let ord = compare(a.get(field), b.get(field));
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        Ok(records)
    }

    fn save(&self, record: &mut Record) -> FormsResult<()> {
        self.count_query();
        let meta = self.meta(&record.model)?;
        self.check_not_null(&meta, record)?;
        record.model = meta.model_name.to_string();

        let mut state = self.lock()?;
        let tables = &mut state.tables;
        if record.pk().is_none() {
            record.set_pk(Value::Int(tables.next_pk));
            tables.next_pk += 1;
        }
        match tables.records.iter_mut().find(|r| r.same_row(record)) {
            Some(existing) => *existing = record.clone(),
            None => tables.records.push(record.clone()),
        }
        tracing::trace!(model = %record.model, pk = %record.pk_form_value(), "saved");
        Ok(())
    }

    fn delete(&self, model: &str, pk: &Value) -> FormsResult<()> {
        self.count_query();
        let meta = self.meta(model)?;
        let mut state = self.lock()?;
        self.delete_cascading(&mut state.tables, meta.model_name, pk)?;
        tracing::trace!(model = meta.model_name, pk = %pk, "deleted");
        Ok(())
    }

    fn linked(&self, model: &str, field: &str, pk: &Value) -> FormsResult<Vec<Value>> {
        self.count_query();
        let meta = self.meta(model)?;
        Ok(self
            .lock()?
            .tables
            .links
            .iter()
            .filter(|(m, f, from, _)| m == meta.model_name && f == field && from == pk)
            .map(|(_, _, _, to)| to.clone())
            .collect())
    }

    fn set_links(
        &self,
        model: &str,
        field: &str,
        pk: &Value,
        targets: &[Value],
    ) -> FormsResult<()> {
        self.count_query();
        let meta = self.meta(model)?;
        let mut state = self.lock()?;
        let links = &mut state.tables.links;
        links.retain(|(m, f, from, _)| !(m == meta.model_name && f == field && from == pk));
        for target in targets {
            links.push((
                meta.model_name.to_string(),
                field.to_string(),
                pk.clone(),
                target.clone(),
            ));
        }
        Ok(())
    }

    fn begin(&self) -> FormsResult<()> {
        let mut state = self.lock()?;
        let snapshot = state.tables.clone();
        state.snapshots.push(snapshot);
        Ok(())
    }

    fn commit(&self) -> FormsResult<()> {
        self.lock()?
            .snapshots
            .pop()
            .map(|_| ())
            .ok_or_else(|| FormsError::DatabaseError("no transaction to commit".to_string()))
    }

    fn rollback(&self) -> FormsResult<()> {
        let mut state = self.lock()?;
        let snapshot = state
            .snapshots
            .pop()
            .ok_or_else(|| FormsError::DatabaseError("no transaction to roll back".to_string()))?;
        state.tables = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::crm_models;
    use nested_forms_db::store::atomic;

    fn acme(store: &TestStore) -> Record {
        store.insert(Record::new("thirdparty").with_value("name", "Acme"))
    }

    #[test]
    fn test_save_assigns_pks() {
        let store = TestStore::new(crm_models());
        let a = acme(&store);
        let b = acme(&store);
        assert_eq!(a.pk(), Some(&Value::Int(1)));
        assert_eq!(b.pk(), Some(&Value::Int(2)));
        assert_eq!(store.count("thirdparty"), 2);
    }

    #[test]
    fn test_save_updates_existing() {
        let store = TestStore::new(crm_models());
        let mut a = acme(&store);
        a.set("name", "Acme Corp");
        store.save(&mut a).unwrap();
        assert_eq!(store.count("thirdparty"), 1);
        let fetched = store.get("thirdparty", &Value::Int(1)).unwrap();
        assert_eq!(fetched.get("name"), Some(&Value::from("Acme Corp")));
    }

    #[test]
    fn test_get_missing_is_does_not_exist() {
        let store = TestStore::new(crm_models());
        let err = store.get("thirdparty", &Value::Int(42)).unwrap_err();
        assert!(err.is_does_not_exist());
    }

    #[test]
    fn test_foreign_key_not_null() {
        let store = TestStore::new(crm_models());
        let mut contact = Record::new("contact").with_value("name", "Ann");
        let err = store.save(&mut contact).unwrap_err();
        assert!(matches!(err, FormsError::IntegrityError(_)));
    }

    #[test]
    fn test_delete_cascades() {
        let store = TestStore::new(crm_models());
        let a = acme(&store);
        let pk = a.pk().cloned().unwrap();
        let c = store.insert(
            Record::new("contact")
                .with_value("third_party", pk.clone())
                .with_value("name", "Ann"),
        );
        store.insert(
            Record::new("phone")
                .with_value("contact", c.pk().cloned().unwrap())
                .with_value("number", "555"),
        );

        store.delete("thirdparty", &pk).unwrap();
        assert_eq!(store.count("contact"), 0);
        assert_eq!(store.count("phone"), 0);
    }

    #[test]
    fn test_filter_and_links() {
        let store = TestStore::new(crm_models());
        let a = acme(&store);
        let pk = a.pk().cloned().unwrap();
        let red = store.insert(Record::new("tag").with_value("label", "red"));
        store
            .set_links("thirdparty", "tags", &pk, &[red.pk().cloned().unwrap()])
            .unwrap();
        assert_eq!(
            store.linked("thirdparty", "tags", &pk).unwrap(),
            vec![Value::Int(2)]
        );

        let found = store
            .filter("thirdparty", &[("name", Value::from("Acme"))])
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_rollback_restores_snapshot() {
        let store = TestStore::new(crm_models());
        acme(&store);
        let result: FormsResult<()> = atomic(&store, |s| {
            let mut r = Record::new("thirdparty").with_value("name", "Globex");
            s.save(&mut r)?;
            Err(FormsError::DatabaseError("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.count("thirdparty"), 1);
        assert_eq!(store.depth(), 0);
    }

    #[test]
    fn test_query_count() {
        let store = TestStore::new(crm_models());
        acme(&store);
        store.reset_query_count();
        store.get("thirdparty", &Value::Int(1)).unwrap();
        store.filter("thirdparty", &[]).unwrap();
        assert_eq!(store.query_count(), 2);
    }
}
