//! # nested-forms-http
//!
//! The submission side of a form post: [`QueryDict`] holds the url-encoded
//! key/value pairs and [`FileDict`] the uploaded files keyed by field name.
//! Both are ordered multi-value maps so duplicated inputs survive intact.

pub mod querydict;
pub mod upload;

pub use querydict::QueryDict;
pub use upload::{FileDict, UploadedFile};
