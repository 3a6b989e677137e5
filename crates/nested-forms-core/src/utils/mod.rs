//! Utility types for nested-forms.
//!
//! - [`MultiValueDict`]: an ordered dictionary that can hold multiple values per key.

mod multi_value_dict;

pub use multi_value_dict::MultiValueDict;
