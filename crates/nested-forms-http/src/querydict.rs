//! Query string dictionary for submitted form data.
//!
//! [`QueryDict`] wraps [`MultiValueDict`](nested_forms_core::utils::MultiValueDict) to
//! provide an immutable-by-default dictionary of submitted parameters. The
//! engine never mutates the caller's submission: it works on a
//! [`copy`](QueryDict::copy).

use nested_forms_core::utils::MultiValueDict;
use nested_forms_core::{FormsError, FormsResult};

/// An immutable-by-default dictionary for query string and form data.
///
/// # Examples
///
/// ```
/// use nested_forms_http::QueryDict;
///
/// let qd = QueryDict::parse("color=red&color=blue&size=large");
/// assert_eq!(qd.get("color"), Some("blue"));
/// assert_eq!(qd.get_list("color"), Some(&vec!["red".to_string(), "blue".to_string()]));
///
/// let mut mutable = qd.copy();
/// mutable.set("color", "green").unwrap();
/// assert_eq!(mutable.get("color"), Some("green"));
/// ```
#[derive(Debug, Clone)]
pub struct QueryDict {
    data: MultiValueDict<String, String>,
    mutable: bool,
    encoding: String,
}

impl Default for QueryDict {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryDict {
    /// Creates a new, empty, immutable `QueryDict`.
    pub fn new() -> Self {
        Self {
            data: MultiValueDict::new(),
            mutable: false,
            encoding: "utf-8".to_string(),
        }
    }

    /// Creates a new, empty, mutable `QueryDict`.
    pub fn new_mutable() -> Self {
        Self {
            data: MultiValueDict::new(),
            mutable: true,
            encoding: "utf-8".to_string(),
        }
    }

    /// Parses a URL query string (e.g., `"key1=val1&key2=val2"`) into an immutable `QueryDict`.
    ///
    /// Handles percent-encoding and supports multiple values per key.
    pub fn parse(query_string: &str) -> Self {
        let mut data = MultiValueDict::new();

        if !query_string.is_empty() {
            for pair in query_string.split('&') {
                if pair.is_empty() {
                    continue;
                }

                let (key, value) = pair
                    .find('=')
                    .map_or((pair, ""), |eq_pos| (&pair[..eq_pos], &pair[eq_pos + 1..]));

                data.append(percent_decode(key), percent_decode(value));
            }
        }

        Self {
            data,
            mutable: false,
            encoding: "utf-8".to_string(),
        }
    }

    /// Builds an immutable `QueryDict` from already-decoded pairs, in order.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            data: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            mutable: false,
            encoding: "utf-8".to_string(),
        }
    }

    /// Returns the last value for the given key, or `None` if not present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(&key.to_string()).map(String::as_str)
    }

    /// Returns all values for the given key, or `None` if not present.
    pub fn get_list(&self, key: &str) -> Option<&Vec<String>> {
        self.data.get_list(&key.to_string())
    }

    /// Sets a single value for the given key, replacing any existing values.
    ///
    /// # Errors
    ///
    /// Returns [`FormsError::SuspiciousOperation`] if this `QueryDict` is immutable.
    pub fn set(&mut self, key: &str, value: &str) -> FormsResult<()> {
        self.ensure_mutable()?;
        self.data.set(key.to_string(), value.to_string());
        Ok(())
    }

    /// Replaces every value of the given key.
    ///
    /// # Errors
    ///
    /// Returns [`FormsError::SuspiciousOperation`] if this `QueryDict` is immutable.
    pub fn set_list(&mut self, key: &str, values: Vec<String>) -> FormsResult<()> {
        self.ensure_mutable()?;
        self.data.set_list(key.to_string(), values);
        Ok(())
    }

    /// Appends a value to the list for the given key.
    ///
    /// # Errors
    ///
    /// Returns [`FormsError::SuspiciousOperation`] if this `QueryDict` is immutable.
    pub fn append(&mut self, key: &str, value: &str) -> FormsResult<()> {
        self.ensure_mutable()?;
        self.data.append(key.to_string(), value.to_string());
        Ok(())
    }

    /// Removes a key and all of its values.
    ///
    /// # Errors
    ///
    /// Returns [`FormsError::SuspiciousOperation`] if this `QueryDict` is immutable.
    pub fn remove(&mut self, key: &str) -> FormsResult<Option<Vec<String>>> {
        self.ensure_mutable()?;
        Ok(self.data.remove(&key.to_string()))
    }

    /// Keeps only the keys matching the predicate.
    ///
    /// # Errors
    ///
    /// Returns [`FormsError::SuspiciousOperation`] if this `QueryDict` is immutable.
    pub fn retain(&mut self, keep: impl FnMut(&String) -> bool) -> FormsResult<()> {
        self.ensure_mutable()?;
        self.data.retain(keep);
        Ok(())
    }

    /// Returns a mutable copy of this `QueryDict`.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            data: self.data.clone(),
            mutable: true,
            encoding: self.encoding.clone(),
        }
    }

    /// Encodes this `QueryDict` as a URL query string.
    ///
    /// All keys and values are percent-encoded; pairs are sorted so the
    /// output is deterministic.
    pub fn urlencode(&self) -> String {
        let mut parts = Vec::new();

        for (key, values) in self.data.iter() {
            for value in values {
                parts.push(format!("{}={}", percent_encode(key), percent_encode(value)));
            }
        }

        parts.sort();
        parts.join("&")
    }

    /// Returns `true` if this `QueryDict` is mutable.
    pub const fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Returns the encoding used for this `QueryDict`.
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the `QueryDict` contains no keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if the specified key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(&key.to_string())
    }

    /// Returns an iterator over the keys, in submission order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    /// Returns a reference to the underlying `MultiValueDict`.
    pub const fn data(&self) -> &MultiValueDict<String, String> {
        &self.data
    }

    fn ensure_mutable(&self) -> FormsResult<()> {
        if self.mutable {
            Ok(())
        } else {
            Err(FormsError::SuspiciousOperation(
                "This QueryDict instance is immutable".to_string(),
            ))
        }
    }
}

/// Decodes a percent-encoded string.
fn percent_decode(input: &str) -> String {
    // Replace + with space (form encoding), then decode percent sequences
    let plus_decoded = input.replace('+', " ");
    percent_encoding::percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

/// Percent-encodes a string for use in a URL query.
fn percent_encode(input: &str) -> String {
    percent_encoding::utf8_percent_encode(input, percent_encoding::NON_ALPHANUMERIC).to_string()
}
