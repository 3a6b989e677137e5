//! # nested-forms-db
//!
//! Data-access layer consumed by the nested form engine. The engine never
//! talks to a database directly; it describes records with
//! [`ModelMeta`](model::ModelMeta), carries them as dynamic
//! [`Record`](record::Record)s, and reads or writes them through the
//! [`RecordStore`](store::RecordStore) trait, which a host application
//! implements over its real persistence layer.
//!
//! ## Module Overview
//!
//! - [`value`] - The backend-agnostic [`Value`](value::Value) enum
//! - [`fields`] - Field definitions ([`FieldDef`](fields::FieldDef)) and types
//! - [`validators`] - Field validators
//! - [`model`] - [`ModelMeta`](model::ModelMeta), the declared shape of a record type
//! - [`record`] - [`Record`](record::Record), one row of a model
//! - [`store`] - The [`RecordStore`](store::RecordStore) trait and [`atomic`](store::atomic)
//! - [`relation`] - Resolving a sub-form name to a relation between two models

// - struct_excessive_bools: FieldDef mirrors Django's field API which uses many booleans
// - cast_precision_loss: i64-to-f64 casts are acceptable for validator comparisons
// - result_large_err: FormsError is the workspace error type and is used consistently
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::result_large_err)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]

pub mod fields;
pub mod model;
pub mod record;
pub mod relation;
pub mod store;
pub mod validators;
pub mod value;

// Re-export the most commonly used types at the crate root.
pub use fields::{FieldDef, FieldType, OnDelete};
pub use model::ModelMeta;
pub use record::Record;
pub use relation::{resolve_relation, Relation, RelationKind};
pub use store::{atomic, find, RecordStore};
pub use validators::Validator;
pub use value::Value;
