//! The data-access capability the engine consumes.
//!
//! [`RecordStore`] is the bridge between the nested form engine and the
//! host application's persistence layer. It is deliberately small: look up
//! model metadata, fetch and filter records, save and delete them, read and
//! write many-to-many links, and optionally bracket work in a transaction.
//!
//! Implementations are `Send + Sync` and take `&self` everywhere; they use
//! interior mutability for their state.

use std::sync::Arc;

use nested_forms_core::{FormsError, FormsResult};

use crate::model::ModelMeta;
use crate::record::Record;
use crate::value::Value;

/// Minimal synchronous record store.
pub trait RecordStore: Send + Sync {
    /// Returns the metadata for a model.
    ///
    /// Returns [`FormsError::ImproperlyConfigured`] for an unknown model.
    fn meta(&self, model: &str) -> FormsResult<Arc<ModelMeta>>;

    /// Returns the metadata of every registered model.
    fn models(&self) -> Vec<Arc<ModelMeta>>;

    /// Fetches exactly one record by primary key.
    ///
    /// Returns [`FormsError::DoesNotExist`] when no such record exists; any
    /// other error is a genuine storage failure.
    fn get(&self, model: &str, pk: &Value) -> FormsResult<Record>;

    /// Returns every record of `model` whose fields equal all the given
    /// values, in the model's default ordering.
    fn filter(&self, model: &str, conditions: &[(&str, Value)]) -> FormsResult<Vec<Record>>;

    /// Inserts or updates a record. A transient record receives its new
    /// primary key.
    fn save(&self, record: &mut Record) -> FormsResult<()>;

    /// Deletes a record by primary key. Deleting a missing record is not an
    /// error.
    fn delete(&self, model: &str, pk: &Value) -> FormsResult<()>;

    /// Returns the primary keys linked to `pk` through the many-to-many
    /// field `field` of `model`.
    fn linked(&self, model: &str, field: &str, pk: &Value) -> FormsResult<Vec<Value>>;

    /// Replaces the many-to-many links of `pk` through `field`.
    fn set_links(&self, model: &str, field: &str, pk: &Value, targets: &[Value])
        -> FormsResult<()>;

    /// Opens a transaction.
    fn begin(&self) -> FormsResult<()> {
        Ok(())
    }

    /// Commits the open transaction.
    fn commit(&self) -> FormsResult<()> {
        Ok(())
    }

    /// Rolls back the open transaction.
    fn rollback(&self) -> FormsResult<()> {
        Ok(())
    }
}

/// Fetches a record, mapping "does not exist" to `None`.
///
/// # Errors
///
/// Propagates every store error other than [`FormsError::DoesNotExist`].
pub fn find(store: &dyn RecordStore, model: &str, pk: &Value) -> FormsResult<Option<Record>> {
    match store.get(model, pk) {
        Ok(record) => Ok(Some(record)),
        Err(e) if e.is_does_not_exist() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Executes a closure within a store transaction.
///
/// If the closure returns `Ok`, the transaction is committed. If it returns
/// `Err`, the transaction is rolled back and the original error returned.
///
/// # Examples
///
/// ```ignore
/// use nested_forms_db::store::atomic;
///
/// let saved = atomic(&store, |store| form.save(store, true))?;
/// ```
pub fn atomic<T, F>(store: &dyn RecordStore, f: F) -> FormsResult<T>
where
    F: FnOnce(&dyn RecordStore) -> FormsResult<T>,
{
    store.begin()?;

    match f(store) {
        Ok(result) => {
            store.commit()?;
            Ok(result)
        }
        Err(e) => {
            // Attempt to rollback; if rollback fails, return the original error
            if let Err(rollback_err) = store.rollback() {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}

/// Builds the error a store returns for an unknown model.
pub fn unknown_model(model: &str) -> FormsError {
    FormsError::ImproperlyConfigured(format!("Model '{model}' is not registered"))
}

#[cfg(test)]
pub(crate) mod testing {
    //! A small in-memory store for unit tests in this crate.

    use std::sync::Mutex;

    use super::*;

    pub struct MockStore {
        pub metas: Vec<Arc<ModelMeta>>,
        pub records: Mutex<Vec<Record>>,
        pub links: Mutex<Vec<(String, String, Value, Value)>>,
        pub statements: Mutex<Vec<String>>,
        next_pk: Mutex<i64>,
    }

    impl MockStore {
        pub fn new(metas: Vec<ModelMeta>) -> Self {
            Self {
                metas: metas.into_iter().map(Arc::new).collect(),
                records: Mutex::new(Vec::new()),
                links: Mutex::new(Vec::new()),
                statements: Mutex::new(Vec::new()),
                next_pk: Mutex::new(1),
            }
        }

        pub fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }

        fn log(&self, s: &str) {
            self.statements.lock().unwrap().push(s.to_string());
        }
    }

    impl RecordStore for MockStore {
        fn meta(&self, model: &str) -> FormsResult<Arc<ModelMeta>> {
            self.metas
                .iter()
                .find(|m| m.is_named(model))
                .cloned()
                .ok_or_else(|| unknown_model(model))
        }

        fn models(&self) -> Vec<Arc<ModelMeta>> {
            self.metas.clone()
        }

        fn get(&self, model: &str, pk: &Value) -> FormsResult<Record> {
            self.records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.model == model && r.pk() == Some(pk))
                .cloned()
                .ok_or_else(|| FormsError::DoesNotExist(format!("{model} {pk}")))
        }

        fn filter(&self, model: &str, conditions: &[(&str, Value)]) -> FormsResult<Vec<Record>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.model == model)
                .filter(|r| conditions.iter().all(|(f, v)| r.get(f) == Some(v)))
                .cloned()
                .collect())
        }

        fn save(&self, record: &mut Record) -> FormsResult<()> {
            self.log("SAVE");
            let mut records = self.records.lock().unwrap();
            if record.pk().is_none() {
                let mut next = self.next_pk.lock().unwrap();
                record.set_pk(Value::Int(*next));
                *next += 1;
            }
            records.retain(|r| !r.same_row(record));
            records.push(record.clone());
            Ok(())
        }

        fn delete(&self, model: &str, pk: &Value) -> FormsResult<()> {
            self.log("DELETE");
            self.records
                .lock()
                .unwrap()
                .retain(|r| !(r.model == model && r.pk() == Some(pk)));
            Ok(())
        }

        fn linked(&self, model: &str, field: &str, pk: &Value) -> FormsResult<Vec<Value>> {
            Ok(self
                .links
                .lock()
                .unwrap()
                .iter()
                .filter(|(m, f, from, _)| m == model && f == field && from == pk)
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
            let mut links = self.links.lock().unwrap();
            links.retain(|(m, f, from, _)| !(m == model && f == field && from == pk));
            for t in targets {
                links.push((model.to_string(), field.to_string(), pk.clone(), t.clone()));
            }
            Ok(())
        }

        fn begin(&self) -> FormsResult<()> {
            self.log("BEGIN");
            Ok(())
        }

        fn commit(&self) -> FormsResult<()> {
            self.log("COMMIT");
            Ok(())
        }

        fn rollback(&self) -> FormsResult<()> {
            self.log("ROLLBACK");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockStore;
    use super::*;

    #[test]
    fn test_atomic_commit() {
        let store = MockStore::new(vec![ModelMeta::new("t", "thing")]);
        let result = atomic(&store, |s| {
            let mut r = Record::new("thing");
            s.save(&mut r)?;
            Ok(r)
        });

        assert_eq!(result.unwrap().pk(), Some(&Value::Int(1)));
        assert_eq!(store.statements(), vec!["BEGIN", "SAVE", "COMMIT"]);
    }

    #[test]
    fn test_atomic_rollback() {
        let store = MockStore::new(vec![]);
        let result: FormsResult<()> = atomic(&store, |_| {
            Err(FormsError::DatabaseError("test error".to_string()))
        });

        assert!(matches!(result, Err(FormsError::DatabaseError(_))));
        assert_eq!(store.statements(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[test]
    fn test_find_maps_does_not_exist() {
        let store = MockStore::new(vec![]);
        assert!(find(&store, "thing", &Value::Int(9)).unwrap().is_none());

        let mut r = Record::new("thing");
        store.save(&mut r).unwrap();
        let found = find(&store, "thing", &Value::Int(1)).unwrap();
        assert_eq!(found.map(|r| r.model), Some("thing".to_string()));
    }

    #[test]
    fn test_unknown_model_is_configuration_error() {
        let store = MockStore::new(vec![]);
        let err = store.meta("ghost").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("ghost"));
    }
}
