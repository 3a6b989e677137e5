//! Uploaded files attached to a form submission.
//!
//! File slots follow the same `<prefix>-<index>-<field>` naming as text
//! fields, so [`FileDict`] mirrors the mutation API of
//! [`QueryDict`](crate::QueryDict) closely enough for the same row-shifting
//! code to run over both.

use nested_forms_core::utils::MultiValueDict;

/// An uploaded file from a multipart form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// The original filename as provided by the client.
    pub name: String,
    /// The MIME content type of the file.
    pub content_type: String,
    /// The size of the file content in bytes.
    pub size: usize,
    /// The raw file content.
    pub content: Vec<u8>,
}

impl UploadedFile {
    /// Creates an uploaded file, computing its size from the content.
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        let content = content.into();
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size: content.len(),
            content,
        }
    }

    /// Returns the lowercase file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

/// Uploaded files keyed by field name, in submission order.
#[derive(Debug, Clone, Default)]
pub struct FileDict {
    files: MultiValueDict<String, UploadedFile>,
}

impl FileDict {
    /// Creates an empty `FileDict`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file under the given field name.
    pub fn insert(&mut self, key: impl Into<String>, file: UploadedFile) {
        self.files.append(key.into(), file);
    }

    /// Returns the last file uploaded under `key`.
    pub fn get(&self, key: &str) -> Option<&UploadedFile> {
        self.files.get(&key.to_string())
    }

    /// Returns every file uploaded under `key`.
    pub fn get_list(&self, key: &str) -> Option<&Vec<UploadedFile>> {
        self.files.get_list(&key.to_string())
    }

    /// Replaces every file stored under `key`.
    pub fn set_list(&mut self, key: &str, files: Vec<UploadedFile>) {
        self.files.set_list(key.to_string(), files);
    }

    /// Removes a key, returning its files if present.
    pub fn remove(&mut self, key: &str) -> Option<Vec<UploadedFile>> {
        self.files.remove(&key.to_string())
    }

    /// Keeps only the keys matching the predicate.
    pub fn retain(&mut self, keep: impl FnMut(&String) -> bool) {
        self.files.retain(keep);
    }

    /// Returns `true` if a file was uploaded under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.files.contains_key(&key.to_string())
    }

    /// Returns an iterator over the keys, in upload order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if no file was uploaded.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uploaded_file_size_and_extension() {
        let f = UploadedFile::new("Scan.PDF", "application/pdf", b"%PDF-1.4".to_vec());
        assert_eq!(f.size, 8);
        assert_eq!(f.extension().as_deref(), Some("pdf"));
        assert_eq!(UploadedFile::new("README", "text/plain", "x").extension(), None);
    }

    #[test]
    fn test_file_dict_roundtrip() {
        let mut files = FileDict::new();
        files.insert("docs-0-file", UploadedFile::new("a.txt", "text/plain", "a"));
        files.insert("docs-1-file", UploadedFile::new("b.txt", "text/plain", "b"));
        assert_eq!(files.len(), 2);
        assert_eq!(files.get("docs-1-file").map(|f| f.name.as_str()), Some("b.txt"));

        let moved = files.remove("docs-1-file").unwrap();
        files.set_list("docs-0-file", moved);
        assert_eq!(files.get("docs-0-file").map(|f| f.name.as_str()), Some("b.txt"));
        assert!(!files.contains_key("docs-1-file"));
    }

    #[test]
    fn test_file_dict_retain() {
        let mut files = FileDict::new();
        files.insert("a-0-f", UploadedFile::new("a", "x", "1"));
        files.insert("b-0-f", UploadedFile::new("b", "x", "2"));
        files.retain(|k| k.starts_with("a-"));
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["a-0-f"]);
    }
}
