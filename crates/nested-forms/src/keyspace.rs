//! The flat key-space of a sub-form submission.
//!
//! A sub-form named `contacts` submits its rows as `contacts-<i>-<field>`
//! and its bookkeeping as four management counters, `contacts-TOTAL_FORMS`
//! and friends. Nested sub-forms extend the prefix of their row, so a phone
//! number of the first contact arrives as `contacts-0-phones-1-number`.
//!
//! The helpers here read and rewrite that key-space: slicing out one
//! prefix, parsing row keys, shifting rows down when one is removed, and
//! reading the counters. They run over both the text submission and the
//! uploaded files through the [`KeySpace`] trait.

use std::collections::BTreeSet;

use nested_forms_core::FormsResult;
use nested_forms_http::{FileDict, QueryDict, UploadedFile};

/// Number of rows submitted.
pub const TOTAL_FORMS: &str = "TOTAL_FORMS";
/// Number of submitted rows that edit an existing record.
pub const INITIAL_FORMS: &str = "INITIAL_FORMS";
/// Minimum number of rows.
pub const MIN_NUM_FORMS: &str = "MIN_NUM_FORMS";
/// Maximum number of rows.
pub const MAX_NUM_FORMS: &str = "MAX_NUM_FORMS";

/// A mutable multi-value map keyed by submission key.
pub trait KeySpace {
    /// The value type stored under each key.
    type Item: Clone;

    /// Returns every key, in insertion order.
    fn key_list(&self) -> Vec<String>;

    /// Returns the values stored under `key`.
    fn values_of(&self, key: &str) -> Option<Vec<Self::Item>>;

    /// Replaces the values stored under `key`.
    fn put(&mut self, key: &str, values: Vec<Self::Item>) -> FormsResult<()>;

    /// Removes `key`, returning its values.
    fn take(&mut self, key: &str) -> FormsResult<Option<Vec<Self::Item>>>;
}

impl KeySpace for QueryDict {
    type Item = String;

    fn key_list(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn values_of(&self, key: &str) -> Option<Vec<String>> {
        self.get_list(key).cloned()
    }

    fn put(&mut self, key: &str, values: Vec<String>) -> FormsResult<()> {
        self.set_list(key, values)
    }

    fn take(&mut self, key: &str) -> FormsResult<Option<Vec<String>>> {
        self.remove(key)
    }
}

impl KeySpace for FileDict {
    type Item = UploadedFile;

    fn key_list(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn values_of(&self, key: &str) -> Option<Vec<UploadedFile>> {
        self.get_list(key).cloned()
    }

    fn put(&mut self, key: &str, values: Vec<UploadedFile>) -> FormsResult<()> {
        self.set_list(key, values);
        Ok(())
    }

    fn take(&mut self, key: &str) -> FormsResult<Option<Vec<UploadedFile>>> {
        Ok(self.remove(key))
    }
}

/// Returns the prefix of row `index`: `<prefix>-<index>`.
pub fn row_prefix(prefix: &str, index: usize) -> String {
    format!("{prefix}-{index}")
}

/// Returns the key of a management counter: `<prefix>-<name>`.
pub fn counter_key(prefix: &str, name: &str) -> String {
    format!("{prefix}-{name}")
}

/// Splits a row key `<prefix>-<index>-<rest>` into its index and rest.
///
/// Returns `None` for counters, for keys of other prefixes, and for keys
/// of a longer prefix that merely starts with the same characters.
pub fn parse_row_key<'a>(prefix: &str, key: &'a str) -> Option<(usize, &'a str)> {
    let tail = key.strip_prefix(prefix)?.strip_prefix('-')?;
    let (index, rest) = tail.split_once('-')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((index.parse().ok()?, rest))
}

/// Returns a mutable copy of the part of `data` under `prefix`, or `None`
/// when nothing was submitted under it.
pub fn slice(data: &QueryDict, prefix: &str) -> Option<QueryDict> {
    let start = format!("{prefix}-");
    let mut sliced = data.copy();
    sliced.retain(|key| key.starts_with(&start)).ok()?;
    (!sliced.is_empty()).then_some(sliced)
}

/// Returns a copy of the uploaded files under `prefix`, or `None` when
/// there are none.
pub fn slice_files(files: &FileDict, prefix: &str) -> Option<FileDict> {
    let start = format!("{prefix}-");
    let mut sliced = files.clone();
    sliced.retain(|key| key.starts_with(&start));
    (!sliced.is_empty()).then_some(sliced)
}

/// Returns the row indices present under `prefix`, ascending.
pub fn row_indices<K: KeySpace>(data: &K, prefix: &str) -> BTreeSet<usize> {
    data.key_list()
        .iter()
        .filter_map(|key| parse_row_key(prefix, key).map(|(index, _)| index))
        .collect()
}

/// Removes row `from` and moves every later row down by one, so the
/// remaining indices stay contiguous.
///
/// With `carry_files`, each field the last row has but row 0 lacks is first
/// copied into row 0. This keeps an upload made on the newest row when an
/// earlier row is removed.
pub fn shift<K: KeySpace>(
    data: &mut K,
    prefix: &str,
    from: usize,
    carry_files: bool,
) -> FormsResult<()> {
    if carry_files {
        carry_last_row(data, prefix)?;
    }

    let mut moved = Vec::new();
    for key in data.key_list() {
        let Some((index, rest)) = parse_row_key(prefix, &key) else {
            continue;
        };
        if index < from {
            continue;
        }
        let rest = rest.to_string();
        if let Some(values) = data.take(&key)? {
            if index > from {
                moved.push((index - 1, rest, values));
            }
        }
    }
    for (index, rest, values) in moved {
        data.put(&format!("{}-{rest}", row_prefix(prefix, index)), values)?;
    }
    Ok(())
}

fn carry_last_row<K: KeySpace>(data: &mut K, prefix: &str) -> FormsResult<()> {
    let Some(&last) = row_indices(data, prefix).iter().next_back() else {
        return Ok(());
    };
    if last == 0 {
        return Ok(());
    }
    let keys = data.key_list();
    for key in &keys {
        let Some((index, rest)) = parse_row_key(prefix, key) else {
            continue;
        };
        if index != last {
            continue;
        }
        let target = format!("{}-{rest}", row_prefix(prefix, 0));
        if data.values_of(&target).is_none() {
            if let Some(values) = data.values_of(key) {
                data.put(&target, values)?;
            }
        }
    }
    Ok(())
}

/// Returns every value submitted for a counter, parsed. Malformed values
/// read as 0.
pub fn count_values(data: &QueryDict, key: &str) -> Vec<usize> {
    data.get_list(key)
        .map(|values| values.iter().map(|v| parse_count(v)).collect())
        .unwrap_or_default()
}

/// Reads a counter: its last submitted value, or 0 when missing or
/// malformed.
pub fn read_count(data: &QueryDict, key: &str) -> usize {
    data.get(key).map_or(0, parse_count)
}

/// Reads the canonical value of a counter submitted more than once: the
/// largest of its values.
pub fn canonical_count(data: &QueryDict, key: &str) -> usize {
    count_values(data, key).into_iter().max().unwrap_or(0)
}

/// Writes a counter as a single value.
pub fn write_count(data: &mut QueryDict, key: &str, count: usize) -> FormsResult<()> {
    data.set(key, &count.to_string())
}

/// Lowers a counter by one, saturating at 0.
pub fn decrement(data: &mut QueryDict, key: &str) -> FormsResult<()> {
    let current = canonical_count(data, key);
    write_count(data, key, current.saturating_sub(1))
}

fn parse_count(raw: &str) -> usize {
    raw.trim().parse().unwrap_or(0)
}

/// Interprets a submitted checkbox marker such as `DELETE`.
///
/// A marker is set when it carries a value other than `false`, `0`, `off`,
/// or `no` (in any case). An empty or blank value is unset, like an
/// unchecked checkbox.
pub fn is_truthy(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        !matches!(
            v.trim().to_lowercase().as_str(),
            "" | "false" | "0" | "off" | "no"
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qd(pairs: &[(&str, &str)]) -> QueryDict {
        QueryDict::from_pairs(pairs.iter().copied()).copy()
    }

    fn file(name: &str) -> UploadedFile {
        UploadedFile::new(name, "application/octet-stream", name.as_bytes().to_vec())
    }

    #[test]
    fn test_parse_row_key() {
        assert_eq!(parse_row_key("contacts", "contacts-0-name"), Some((0, "name")));
        assert_eq!(
            parse_row_key("contacts", "contacts-12-phones-1-number"),
            Some((12, "phones-1-number"))
        );
        assert_eq!(parse_row_key("contacts", "contacts-TOTAL_FORMS"), None);
        assert_eq!(parse_row_key("contacts", "contacts_old-0-name"), None);
        assert_eq!(parse_row_key("contacts", "contacts-x1-name"), None);
        assert_eq!(parse_row_key("contacts", "other-0-name"), None);
    }

    #[test]
    fn test_slice() {
        let data = qd(&[
            ("name", "ACME"),
            ("contacts-TOTAL_FORMS", "1"),
            ("contacts-0-name", "Ada"),
            ("contactsx-0-name", "nope"),
        ]);
        let sliced = slice(&data, "contacts").unwrap();
        assert_eq!(sliced.len(), 2);
        assert!(sliced.is_mutable());
        assert!(!sliced.contains_key("name"));
        assert!(slice(&data, "tags").is_none());
    }

    #[test]
    fn test_shift_moves_later_rows_down() {
        let mut data = qd(&[
            ("c-TOTAL_FORMS", "3"),
            ("c-0-name", "a"),
            ("c-1-name", "b"),
            ("c-1-DELETE", "on"),
            ("c-2-name", "c"),
            ("c-2-phones-0-number", "555"),
        ]);
        shift(&mut data, "c", 1, false).unwrap();

        assert_eq!(data.get("c-0-name"), Some("a"));
        assert_eq!(data.get("c-1-name"), Some("c"));
        assert_eq!(data.get("c-1-phones-0-number"), Some("555"));
        assert!(!data.contains_key("c-1-DELETE"));
        assert!(!data.contains_key("c-2-name"));
        assert_eq!(data.get("c-TOTAL_FORMS"), Some("3"));
        assert_eq!(row_indices(&data, "c").into_iter().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_shift_last_row_only_removes() {
        let mut data = qd(&[("c-0-name", "a"), ("c-1-name", "b")]);
        shift(&mut data, "c", 1, false).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data.get("c-0-name"), Some("a"));
    }

    #[test]
    fn test_shift_files_carries_last_upload_to_first_row() {
        let mut files = FileDict::new();
        files.insert("c-0-doc", file("zero.txt"));
        files.insert("c-2-photo", file("new.png"));

        shift(&mut files, "c", 1, true).unwrap();

        assert_eq!(files.get("c-0-photo").map(|f| f.name.as_str()), Some("new.png"));
        assert_eq!(files.get("c-1-photo").map(|f| f.name.as_str()), Some("new.png"));
        assert_eq!(files.get("c-0-doc").map(|f| f.name.as_str()), Some("zero.txt"));
        assert!(!files.contains_key("c-2-photo"));
    }

    #[test]
    fn test_carry_does_not_overwrite_first_row() {
        let mut files = FileDict::new();
        files.insert("c-0-photo", file("old.png"));
        files.insert("c-1-photo", file("new.png"));

        shift(&mut files, "c", 1, true).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files.get("c-0-photo").map(|f| f.name.as_str()), Some("old.png"));
    }

    #[test]
    fn test_counters() {
        let mut data = qd(&[
            ("c-TOTAL_FORMS", "1"),
            ("c-TOTAL_FORMS", "2"),
            ("c-INITIAL_FORMS", "junk"),
        ]);
        assert_eq!(count_values(&data, "c-TOTAL_FORMS"), vec![1, 2]);
        assert_eq!(read_count(&data, "c-TOTAL_FORMS"), 2);
        assert_eq!(canonical_count(&data, "c-TOTAL_FORMS"), 2);
        assert_eq!(read_count(&data, "c-INITIAL_FORMS"), 0);
        assert_eq!(read_count(&data, "c-MIN_NUM_FORMS"), 0);

        decrement(&mut data, "c-TOTAL_FORMS").unwrap();
        assert_eq!(count_values(&data, "c-TOTAL_FORMS"), vec![1]);

        decrement(&mut data, "c-INITIAL_FORMS").unwrap();
        assert_eq!(data.get("c-INITIAL_FORMS"), Some("0"));
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy(Some("on")));
        assert!(is_truthy(Some("True")));
        assert!(!is_truthy(Some("")));
        assert!(!is_truthy(Some("   ")));
        assert!(!is_truthy(Some("false")));
        assert!(!is_truthy(Some("OFF")));
        assert!(!is_truthy(Some("0")));
        assert!(!is_truthy(Some("no")));
        assert!(!is_truthy(None));
    }

    #[test]
    fn test_key_helpers() {
        assert_eq!(row_prefix("contacts-0-phones", 2), "contacts-0-phones-2");
        assert_eq!(counter_key("tags", TOTAL_FORMS), "tags-TOTAL_FORMS");
    }
}
