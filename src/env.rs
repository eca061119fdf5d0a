use std::collections::HashMap;

use bytes::Bytes;
use url::Url;

use crate::dom::Document;
use crate::storage::PreferenceStore;

/// A file picked into a file input.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: "application/octet-stream".to_string(),
            bytes: bytes.into(),
        }
    }

    pub fn read(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context as _;

        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        Ok(Self::new(name, bytes))
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Everything a page script can touch: the document, origin storage, the
/// current location and the files picked into file inputs.
pub struct PageEnv<S> {
    pub document: Document,
    pub storage: S,
    location: Url,
    files: HashMap<String, Vec<SelectedFile>>,
    navigation: Option<Url>,
}

impl<S: PreferenceStore> PageEnv<S> {
    pub fn new(html: &str, location: Url, storage: S) -> Self {
        Self {
            document: Document::parse(html),
            storage,
            location,
            files: HashMap::new(),
            navigation: None,
        }
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    /// `window.location.href = href`. The host performs the load.
    pub fn navigate(&mut self, href: &str) -> anyhow::Result<()> {
        let url = self.location.join(href)?;
        tracing::info!(%url, "navigation requested");
        self.navigation = Some(url);
        Ok(())
    }

    pub fn pending_navigation(&self) -> Option<&Url> {
        self.navigation.as_ref()
    }

    pub fn take_navigation(&mut self) -> Option<Url> {
        self.navigation.take()
    }

    /// Picks `files` into the input with id `input_id`. Returns `false`, and
    /// records nothing, when the page has no such input.
    pub fn select_files(&mut self, input_id: &str, files: Vec<SelectedFile>) -> bool {
        let Some(input) = self.document.get_element_by_id(input_id) else {
            tracing::debug!(input_id, "no file input to pick into");
            return false;
        };
        let shown = files.first().map(|f| f.name.as_str()).unwrap_or("");
        input.set_value(shown);
        self.files.insert(input_id.to_string(), files);
        true
    }

    pub fn selected_files(&self, input_id: &str) -> &[SelectedFile] {
        self.files.get(input_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `input.value = ''`.
    pub fn clear_files(&mut self, input_id: &str) {
        self.files.remove(input_id);
        if let Some(input) = self.document.get_element_by_id(input_id) {
            input.remove_attr("value");
        }
    }

    pub fn into_storage(self) -> S {
        self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn navigation_resolves_against_location() {
        let url = Url::parse("http://files.example.com/dashboard?x=1").unwrap();
        let mut env = PageEnv::new("<body></body>", url, MemoryStore::new());
        assert!(env.pending_navigation().is_none());
        env.navigate("/upload").unwrap();
        assert_eq!(
            env.take_navigation().unwrap().as_str(),
            "http://files.example.com/upload"
        );
        assert!(env.take_navigation().is_none());
    }

    #[test]
    fn file_selection_and_clear() {
        let url = Url::parse("http://files.example.com/upload").unwrap();
        let mut env = PageEnv::new(
            r#"<body><input id="fileUpload" type="file"></body>"#,
            url,
            MemoryStore::new(),
        );
        assert!(env.select_files("fileUpload", vec![SelectedFile::new("a.txt", "hello")]));
        assert_eq!(env.selected_files("fileUpload").len(), 1);
        let input = env.document.get_element_by_id("fileUpload").unwrap();
        assert_eq!(input.value(), "a.txt");

        env.clear_files("fileUpload");
        assert!(env.selected_files("fileUpload").is_empty());
        assert!(!input.has_attr("value"));
    }

    #[test]
    fn selecting_into_a_missing_input_records_nothing() {
        let url = Url::parse("http://files.example.com/upload").unwrap();
        let mut env = PageEnv::new("<body><form></form></body>", url, MemoryStore::new());
        assert!(!env.select_files("fileUpload", vec![SelectedFile::new("a.txt", "hello")]));
        assert!(env.selected_files("fileUpload").is_empty());
    }
}
