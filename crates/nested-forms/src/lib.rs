//! # nested-forms
//!
//! Nested model formsets. A [`NestedForm`] edits one record and, through
//! declared sub-forms, the records related to it: reverse foreign keys,
//! many-to-many fields, and generic relations. A sub-form row can itself be
//! a nested form, so whole trees of records are edited in one submission.
//!
//! The submission is a flat [`QueryDict`](nested_forms_http::QueryDict):
//! rows live under `<prefix>-<index>-<field>` and every sub-form carries
//! `<prefix>-TOTAL_FORMS` / `<prefix>-INITIAL_FORMS` counters. Before the
//! rows are validated the submission is reconciled with the store: stale
//! rows are pruned, deleted rows removed and renumbered, and the last row
//! duplicated or every row reset on request.
//!
//! ## Module Overview
//!
//! - [`fields`] - Form field types and cleaning
//! - [`validation`] - Field cleaning and changed detection over a form
//! - [`form`] - The [`Form`] trait and [`BaseForm`](form::BaseForm)
//! - [`model_form`] - Forms generated from model metadata
//! - [`keyspace`] - Row keys, counters, and index shifting
//! - [`declaration`] - Sub-form declarations and nested form configuration
//! - [`synchronizer`] - Reconciling submitted rows with the store
//! - [`formset`] - Sub-form groups and their rows
//! - [`nested`] - The [`NestedForm`] itself
//! - [`save`] - Committing a nested form
//! - [`report`] - Serializable error reports
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nested_forms::{FormFactory, FormInput, ModelFormConfig, NestedForm, NestedFormConfig, SubFormDeclaration};
//!
//! let config = NestedFormConfig::new(ModelFormConfig::new("thirdparty")).sub_form(
//!     SubFormDeclaration::new("contacts", FormFactory::leaf(ModelFormConfig::new("contact")))
//!         .extra(1),
//! );
//! let mut form = NestedForm::new(&store, Arc::new(config), FormInput::new().with_data(data))?;
//! if let Some(record) = form.save(&store, true)? {
//!     println!("saved {}", record.pk_form_value());
//! }
//! ```

// - result_large_err: FormsError is the workspace error type and is used consistently
// - cast_precision_loss: integer-to-float conversions are acceptable for form values
#![allow(clippy::result_large_err)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::too_many_lines)]

pub mod declaration;
pub mod fields;
pub mod form;
pub mod formset;
pub mod keyspace;
pub mod model_form;
pub mod nested;
pub mod report;
pub mod save;
pub mod synchronizer;
pub mod validation;

// Re-export the most commonly used types at the crate root.
pub use declaration::{FormFactory, InitialRow, NestedFormConfig, Setting, SubFormDeclaration};
pub use fields::{FormFieldDef, FormFieldType};
pub use form::{BaseForm, Form};
pub use formset::{ChildForm, ChildRow, SubFormGroup};
pub use model_form::{ModelForm, ModelFormConfig, ModelFormFields};
pub use nested::{FormInput, FormState, NestedForm};
pub use report::ErrorReport;

