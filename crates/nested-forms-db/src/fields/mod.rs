//! Field definitions and types for record models.
//!
//! This module provides the [`FieldDef`] struct and [`FieldType`] enum that
//! describe the declared fields of a model, including the relational fields
//! the nested form engine follows to find child records.

pub mod types;

pub use types::{FieldDef, FieldType, OnDelete};
