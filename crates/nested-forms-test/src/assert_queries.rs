//! Query counting assertions for store tests.
//!
//! [`assert_num_queries`] counts the data accesses a closure makes against
//! a [`TestStore`] and asserts the count. Useful to catch a nested form
//! that fetches each row's child separately.
//!
//! ## Example
//!
//! ```
//! use nested_forms_db::RecordStore;
//! use nested_forms_test::fixtures::crm_models;
//! use nested_forms_test::{assert_num_queries, TestStore};
//!
//! let store = TestStore::new(crm_models());
//! assert_num_queries(&store, 1, || {
//!     store.filter("contact", &[]).unwrap();
//! });
//! ```

use crate::test_store::TestStore;

/// Asserts that exactly `expected_count` store queries run during `f`.
///
/// Resets the query counter on the [`TestStore`] before running the
/// closure, then checks the counter after it.
///
/// # Panics
///
/// Panics if the number of queries does not match `expected_count`.
pub fn assert_num_queries<F>(store: &TestStore, expected_count: usize, f: F)
where
    F: FnOnce(),
{
    store.reset_query_count();
    f();
    let actual = store.query_count();
    assert_eq!(
        actual, expected_count,
        "Expected {expected_count} store queries, but {actual} were executed"
    );
}

/// Asserts that at most `max_count` store queries run during `f`.
///
/// # Panics
///
/// Panics if more than `max_count` queries are executed.
pub fn assert_max_queries<F>(store: &TestStore, max_count: usize, f: F)
where
    F: FnOnce(),
{
    store.reset_query_count();
    f();
    let actual = store.query_count();
    assert!(
        actual <= max_count,
        "Expected at most {max_count} store queries, but {actual} were executed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::crm_models;
    use nested_forms_db::{Record, RecordStore, Value};

    #[test]
    fn test_assert_num_queries_passes() {
        let store = TestStore::new(crm_models());
        assert_num_queries(&store, 2, || {
            store.filter("thirdparty", &[]).unwrap();
            let _ = store.get("thirdparty", &Value::Int(1));
        });
    }

    #[test]
    #[should_panic(expected = "Expected 0 store queries, but 1 were executed")]
    fn test_assert_num_queries_fails() {
        let store = TestStore::new(crm_models());
        assert_num_queries(&store, 0, || {
            store.insert(Record::new("tag").with_value("label", "red"));
        });
    }

    #[test]
    fn test_assert_max_queries() {
        let store = TestStore::new(crm_models());
        assert_max_queries(&store, 3, || {
            store.filter("tag", &[]).unwrap();
        });
    }
}
