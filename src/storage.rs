use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use url::Url;

/// Origin-scoped string key/value store, the shape of `window.localStorage`.
pub trait PreferenceStore {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    items: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, key: &str, value: &str) -> Self {
        self.items.insert(key.to_string(), value.to_string());
        self
    }
}

impl PreferenceStore for MemoryStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Contents of the store file, keyed by origin and then by item key.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct PreferenceFile {
    origins: BTreeMap<String, BTreeMap<String, String>>,
}

impl PreferenceFile {
    fn get(&self, origin: &str, key: &str) -> Option<&String> {
        self.origins.get(origin)?.get(key)
    }

    fn set(&mut self, origin: &str, key: &str, value: &str) {
        self.origins
            .entry(origin.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }
}

/// Durable store backed by one JSON file shared by all origins:
/// `{ "<origin>": { "<key>": "<value>" } }`.
///
/// Every `set_item` rewrites the whole file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    origin: String,
    file: PreferenceFile,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>, page_url: &Url) -> anyhow::Result<Self> {
        let path = path.into();
        let file = if path.exists() {
            let bytes =
                std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                PreferenceFile::default()
            } else {
                serde_json::from_slice(&bytes)
                    .with_context(|| format!("parse preference store {}", path.display()))?
            }
        } else {
            PreferenceFile::default()
        };
        let origin = page_url.origin().ascii_serialization();
        tracing::debug!(path = %path.display(), %origin, "opened preference store");
        Ok(Self { path, origin, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn flush(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_vec_pretty(&self.file).context("encode preference store")?;
        std::fs::write(&self.path, json).with_context(|| format!("write {}", self.path.display()))
    }
}

impl PreferenceStore for JsonFileStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.file.get(&self.origin, key).cloned()
    }

    fn set_item(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.file.set(&self.origin, key, value);
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_survives_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("state/storage.json");
        let url = Url::parse("http://files.example.com/upload").unwrap();

        let mut store = JsonFileStore::open(&path, &url).unwrap();
        assert_eq!(store.get_item("theme"), None);
        store.set_item("theme", "dark").unwrap();

        let reopened = JsonFileStore::open(&path, &url).unwrap();
        assert_eq!(reopened.get_item("theme").as_deref(), Some("dark"));
        assert_eq!(reopened.origin(), "http://files.example.com");
    }

    #[test]
    fn file_store_is_scoped_by_origin() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("storage.json");
        let a = Url::parse("http://a.example.com/upload").unwrap();
        let b = Url::parse("http://a.example.com:8080/upload").unwrap();

        JsonFileStore::open(&path, &a)
            .unwrap()
            .set_item("theme", "dark")
            .unwrap();
        let other = JsonFileStore::open(&path, &b).unwrap();
        assert_eq!(other.get_item("theme"), None);

        let same_origin = Url::parse("http://a.example.com/dashboard").unwrap();
        let same = JsonFileStore::open(&path, &same_origin).unwrap();
        assert_eq!(same.get_item("theme").as_deref(), Some("dark"));
    }

    #[test]
    fn file_layout_is_origin_then_key() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("storage.json");
        let url = Url::parse("https://files.example.com/upload").unwrap();
        JsonFileStore::open(&path, &url)
            .unwrap()
            .set_item("theme", "dark")
            .unwrap();

        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            on_disk,
            serde_json::json!({ "https://files.example.com": { "theme": "dark" } })
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("storage.json");
        std::fs::write(&path, r#"{"http://a.example.com": ["dark"]}"#).unwrap();
        let url = Url::parse("http://a.example.com/").unwrap();
        let err = JsonFileStore::open(&path, &url).unwrap_err();
        assert!(format!("{err:#}").contains("parse preference store"));
    }

    #[test]
    fn empty_file_is_an_empty_store() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("storage.json");
        std::fs::write(&path, "\n").unwrap();
        let url = Url::parse("http://a.example.com/").unwrap();
        assert_eq!(JsonFileStore::open(&path, &url).unwrap().get_item("theme"), None);
    }

    #[test]
    fn memory_store_overwrites() {
        let mut store = MemoryStore::new().with_item("theme", "light");
        store.set_item("theme", "dark").unwrap();
        assert_eq!(store.get_item("theme").as_deref(), Some("dark"));
    }
}
