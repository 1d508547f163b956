//! Session-scoped persistence of the last signature transform.
//!
//! The controller never talks to a concrete backend: it gets a boxed
//! [`KeyValueStore`], so the binary can use a JSON file in the temp directory
//! while tests use [`MemoryStore`]. There is no versioning; a record saved for
//! one signature is reapplied to whatever signature is placed next.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transform::SignatureTransform;

/// Key under which the transform record lives.
pub const TRANSFORM_KEY: &str = "esignature_transform";

/// Minimal string key-value store with session lifetime.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<()>;
}

/// Process-local store; gone when the process exits.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Store backed by one JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Open the store, starting empty if the file is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
                warn!(path = %path.display(), %err, "session store unreadable, starting empty");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&self.entries).map_err(Error::RecordWrite)?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

/// A persisted record as read back: any field may be missing or malformed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PersistedRecord {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub scale_x: Option<f64>,
    pub scale_y: Option<f64>,
}

impl PersistedRecord {
    /// Parse the stored JSON. A non-object is corrupt; bad fields become `None`.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| Error::RecordCorrupt(e.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| Error::RecordCorrupt("expected a JSON object".into()))?;
        let finite = |k: &str| obj.get(k).and_then(Value::as_f64).filter(|v| v.is_finite());
        // Sizes and scales must be positive to be usable.
        let positive = |k: &str| finite(k).filter(|v| *v > 0.0);
        Ok(Self {
            x: finite("x"),
            y: finite("y"),
            width: positive("width"),
            height: positive("height"),
            scale_x: positive("scaleX"),
            scale_y: positive("scaleY"),
        })
    }

    /// Fill whatever is missing from `defaults`.
    pub fn resolve(&self, defaults: &SignatureTransform) -> SignatureTransform {
        SignatureTransform {
            x: self.x.unwrap_or(defaults.x),
            y: self.y.unwrap_or(defaults.y),
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            scale_x: self.scale_x.unwrap_or(defaults.scale_x),
            scale_y: self.scale_y.unwrap_or(defaults.scale_y),
        }
    }

    /// The full transform, only if every field survived.
    pub fn complete(&self) -> Option<SignatureTransform> {
        Some(SignatureTransform {
            x: self.x?,
            y: self.y?,
            width: self.width?,
            height: self.height?,
            scale_x: self.scale_x?,
            scale_y: self.scale_y?,
        })
    }
}

/// Typed save/load of the signature transform over an injected store.
pub struct TransformStore {
    inner: Box<dyn KeyValueStore>,
}

impl TransformStore {
    pub fn new(inner: Box<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub fn save(&mut self, transform: &SignatureTransform) -> Result<()> {
        let text = serde_json::to_string(transform).map_err(Error::RecordWrite)?;
        self.inner.set(TRANSFORM_KEY, text)?;
        debug!(?transform, "transform persisted");
        Ok(())
    }

    /// The stored record, possibly partial. Corrupt JSON reads as absent.
    pub fn load_record(&self) -> Option<PersistedRecord> {
        let text = self.inner.get(TRANSFORM_KEY)?;
        match PersistedRecord::from_json(&text) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(%err, "ignoring persisted transform");
                None
            }
        }
    }

    pub fn load(&self) -> Option<SignatureTransform> {
        self.load_record().and_then(|r| r.complete())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> SignatureTransform {
        SignatureTransform { x: 12.5, y: 40.0, width: 300.0, height: 120.0, scale_x: 0.25, scale_y: 0.5 }
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut store = TransformStore::new(Box::new(MemoryStore::default()));
        assert!(store.load().is_none());
        store.save(&sample()).unwrap();
        assert_eq!(store.load(), Some(sample()));
    }

    #[test]
    fn layout_uses_camel_case_keys() {
        let mut mem = MemoryStore::default();
        let text = serde_json::to_string(&sample()).unwrap();
        mem.set(TRANSFORM_KEY, text.clone()).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        for key in ["x", "y", "width", "height", "scaleX", "scaleY"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn partial_record_takes_defaults_per_field() {
        let record = PersistedRecord::from_json(r#"{"x": 5, "y": 6, "width": 0, "scaleX": "big"}"#).unwrap();
        let defaults = SignatureTransform { x: 1.0, y: 2.0, width: 3.0, height: 4.0, scale_x: 0.5, scale_y: 0.75 };
        let t = record.resolve(&defaults);
        assert_eq!(t, SignatureTransform { x: 5.0, y: 6.0, width: 3.0, height: 4.0, scale_x: 0.5, scale_y: 0.75 });
        assert!(record.complete().is_none());
    }

    #[test]
    fn corrupt_record_reads_as_absent() {
        let mut mem = MemoryStore::default();
        mem.set(TRANSFORM_KEY, "{not json".into()).unwrap();
        assert!(TransformStore::new(Box::new(mem.clone())).load_record().is_none());
        mem.set(TRANSFORM_KEY, "[1,2,3]".into()).unwrap();
        assert!(TransformStore::new(Box::new(mem)).load_record().is_none());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let mut store = TransformStore::new(Box::new(FileStore::open(&path)));
        store.save(&sample()).unwrap();

        let reopened = TransformStore::new(Box::new(FileStore::open(&path)));
        assert_eq!(reopened.load(), Some(sample()));
    }

    #[test]
    fn write_failures_are_not_reported_as_corrupt_records() {
        let dir = tempdir().unwrap();
        // The store path is a directory, so the write itself fails.
        let mut store = TransformStore::new(Box::new(FileStore::open(dir.path())));
        assert!(matches!(store.save(&sample()), Err(Error::Io(_))));

        let json_err = serde_json::from_str::<Value>("{").unwrap_err();
        let err = Error::RecordWrite(json_err);
        assert!(!err.to_string().contains("corrupt"));
    }

    #[test]
    fn file_store_tolerates_garbage_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "garbage").unwrap();
        let store = FileStore::open(&path);
        assert!(store.get(TRANSFORM_KEY).is_none());
        assert_eq!(store.path(), path.as_path());
    }
}
