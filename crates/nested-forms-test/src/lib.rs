//! # nested-forms-test
//!
//! Testing utilities for nested-forms. Provides [`TestStore`], an in-memory
//! [`RecordStore`](nested_forms_db::RecordStore) with a query counter and
//! snapshot transactions, query-count assertions, and the model metadata of
//! a small CRM schema.

#![allow(clippy::result_large_err)]
#![allow(clippy::missing_const_for_fn)]

pub mod assert_queries;
pub mod fixtures;
pub mod test_store;

pub use assert_queries::{assert_max_queries, assert_num_queries};
pub use test_store::TestStore;
