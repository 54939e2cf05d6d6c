//! Configuration documents for hotclaw
//!
//! Every plugin (and the host itself) gets a JSON document in the config
//! root, named after it. Documents are read fully into memory at open time,
//! with stored values shallow-merged over the caller's defaults, and written
//! back whole on every mutation.
//!
//! Writes go through a temp file in the same directory followed by a rename,
//! so a crash mid-write leaves the previous document intact. Keys serialize
//! in sorted order, which keeps the files diffable across writes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{HotclawError, Result};

/// A directory of JSON config documents.
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    /// Creates a store rooted at the given directory. The directory is
    /// created lazily when the first document is opened.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The platform config root for hotclaw (`~/.config/hotclaw` on Linux).
    pub fn default_root() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("hotclaw"))
            .unwrap_or_else(|| PathBuf::from(".hotclaw"))
    }

    /// Returns the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens (or seeds) the document for `name` with the given defaults.
    ///
    /// # Arguments
    ///
    /// * `name` - Document name; becomes `<root>/<name>.json`
    /// * `default` - JSON object merged under whatever is stored
    ///
    /// # Errors
    ///
    /// - `HotclawError::Config` if `name` contains a path separator or the
    ///   defaults are not a JSON object
    /// - `HotclawError::Io` / `HotclawError::Json` on unreadable or
    ///   malformed documents
    pub fn open(&self, name: &str, default: Value) -> Result<ConfigFile> {
        validate_name(name)?;
        let path = self.root.join(format!("{}.json", name));
        ConfigFile::load(path, default)
    }

    /// Returns a store rooted at `<root>/<name>/`. The plugin host hands
    /// each plugin one of these so its documents stay in their own
    /// directory.
    ///
    /// # Errors
    ///
    /// - `HotclawError::Config` if `name` is empty or contains a path
    ///   separator
    pub fn scoped(&self, name: &str) -> Result<ConfigStore> {
        validate_name(name)?;
        Ok(ConfigStore::new(self.root.join(name)))
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}

/// A single JSON config document.
///
/// The document is a flat-merged object: stored keys win over defaults at
/// the top level only. Mutations rewrite the whole file.
///
/// # Example
///
/// ```
/// use hotclaw::store::ConfigStore;
/// use serde_json::json;
///
/// let tmp = tempfile::TempDir::new().unwrap();
/// let store = ConfigStore::new(tmp.path());
///
/// let config = store.open("greeter", json!({"greeting": "hello"})).unwrap();
/// assert_eq!(config.get("greeting"), Some(json!("hello")));
///
/// config.set("greeting", json!("howdy")).unwrap();
/// let reopened = store.open("greeter", json!({"greeting": "hello"})).unwrap();
/// assert_eq!(reopened.get("greeting"), Some(json!("howdy")));
/// ```
#[derive(Debug)]
pub struct ConfigFile {
    path: PathBuf,
    doc: RwLock<Map<String, Value>>,
}

impl ConfigFile {
    /// Loads a document from `path`, seeding it with `default` when absent.
    ///
    /// Stored values are shallow-merged over the defaults: a stored top-level
    /// key replaces the default wholesale, nested objects are not merged.
    pub fn load(path: PathBuf, default: Value) -> Result<Self> {
        let default = match default {
            Value::Object(map) => map,
            other => {
                return Err(HotclawError::Config(format!(
                    "Config defaults must be a JSON object, got {}",
                    type_name(&other)
                )))
            }
        };

        let doc = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let stored: Value = serde_json::from_str(&content)?;
            let stored = match stored {
                Value::Object(map) => map,
                other => {
                    return Err(HotclawError::Config(format!(
                        "Config document {} must hold a JSON object, got {}",
                        path.display(),
                        type_name(&other)
                    )))
                }
            };
            let mut merged = default;
            for (key, value) in stored {
                merged.insert(key, value);
            }
            debug!(path = %path.display(), keys = merged.len(), "Config document loaded");
            merged
        } else {
            info!(path = %path.display(), "Seeding config document with defaults");
            write_document(&path, &default)?;
            default
        };

        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    /// Returns the file path of this document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the value for a top-level key.
    pub fn get(&self, key: &str) -> Option<Value> {
        let doc = self.doc.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        doc.get(key).cloned()
    }

    /// Sets a top-level key and persists the whole document.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut doc = self
            .doc
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        doc.insert(key.to_string(), value);
        write_document(&self.path, &doc)
    }

    /// Removes a top-level key and persists the document.
    ///
    /// Note that a later load merges defaults again, so a removed key that
    /// has a default comes back as that default in the next session.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut doc = self
            .doc
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let removed = doc.remove(key).is_some();
        if removed {
            write_document(&self.path, &doc)?;
        }
        Ok(removed)
    }

    /// Returns a clone of the whole merged document.
    pub fn all(&self) -> Value {
        let doc = self.doc.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Value::Object(doc.clone())
    }
}

/// Writes a document atomically: temp file in the same directory, then
/// rename over the target.
fn write_document(path: &Path, doc: &Map<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let serialized = serde_json::to_string_pretty(&Value::Object(doc.clone()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serialized)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return Err(HotclawError::Config(format!(
            "Invalid config document name '{}'",
            name
        )));
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// An in-memory store with the same key surface as [`ConfigFile`], for
/// state that should not outlive the process.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let map = self.map.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.get(key).cloned()
    }

    pub fn set(&self, key: &str, value: Value) {
        let mut map = self
            .map
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.insert(key.to_string(), value);
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut map = self
            .map
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.remove(key).is_some()
    }

    pub fn all(&self) -> Value {
        let map = self.map.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Value::Object(map.clone())
    }

    pub fn len(&self) -> usize {
        let map = self.map.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut map = self
            .map
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.clear();
    }
}
