//! Persistent encoding cache: image path → {encodings, name}.
//!
//! Stored as pretty-printed JSON (4-space indent). Records are kept in key
//! order so the file content and the matching order are deterministic.

use crate::types::Encoding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default cache file name, relative to the working directory.
pub const DEFAULT_CACHE_FILE: &str = "precomputed_encodings.json";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed cache file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Cached face data for one source image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingRecord {
    /// Only the first detected face is stored, but the format allows more.
    pub encodings: Vec<Encoding>,
    pub name: String,
}

impl EncodingRecord {
    pub fn new(encoding: Encoding, name: impl Into<String>) -> Self {
        Self {
            encodings: vec![encoding],
            name: name.into(),
        }
    }

    /// The encoding used for matching.
    pub fn primary(&self) -> Option<&Encoding> {
        self.encodings.first().filter(|e| !e.is_empty())
    }
}

/// In-memory encoding cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodingCache {
    records: BTreeMap<String, EncodingRecord>,
}

impl EncodingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a cache file. A missing file is an empty cache.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no cache file, starting empty");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(CacheError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let cache: Self = serde_json::from_slice(&bytes).map_err(|source| CacheError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), entries = cache.len(), "loaded encoding cache");
        Ok(cache)
    }

    /// Like [`load`](Self::load), but an unreadable or corrupt file is
    /// logged and treated as empty.
    pub fn load_or_empty(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring unusable cache file");
            Self::new()
        })
    }

    /// Serialise with 4-space indentation.
    pub fn to_json(&self) -> Result<Vec<u8>, CacheError> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        Ok(out)
    }

    /// Overwrite `path` with the full cache.
    ///
    /// Writes a sibling `.tmp` file first and renames it into place.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let json = self.to_json()?;
        let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        let write_err = |source| CacheError::Write {
            path: path.to_path_buf(),
            source,
        };
        std::fs::write(&tmp, json).map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)?;

        tracing::info!(path = %path.display(), entries = self.len(), "saved encoding cache");
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&EncodingRecord> {
        self.records.get(key)
    }

    /// Insert a record; returns the record previously stored under `key`.
    pub fn insert(&mut self, key: impl Into<String>, record: EncodingRecord) -> Option<EncodingRecord> {
        self.records.insert(key.into(), record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EncodingRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EncodingCache {
        let mut cache = EncodingCache::new();
        cache.insert("faces/Bob/b.jpg", EncodingRecord::new(Encoding::new(vec![0.0, 1.0]), "Bob"));
        cache.insert("faces/Alice/a.jpg", EncodingRecord::new(Encoding::new(vec![1.0, 0.0]), "Alice"));
        cache
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = EncodingCache::load(&dir.path().join("nope.json")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_error_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(matches!(EncodingCache::load(&path), Err(CacheError::Parse { .. })));
        assert!(EncodingCache::load_or_empty(&path).is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = sample();
        cache.save(&path).unwrap();

        assert_eq!(EncodingCache::load(&path).unwrap(), cache);
        assert!(!dir.path().join("cache.json.tmp").exists());
    }

    #[test]
    fn test_json_layout() {
        let json = String::from_utf8(sample().to_json().unwrap()).unwrap();
        // Keys sorted, 4-space indent, legacy field names.
        assert!(json.starts_with("{\n    \"faces/Alice/a.jpg\": {\n        \"encodings\": ["));
        assert!(json.contains("\"name\": \"Bob\""));
        assert!(json.find("Alice").unwrap() < json.find("Bob").unwrap());
    }

    #[test]
    fn test_reads_files_with_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(
            &path,
            br#"{"x/Carol/c.png": {"encodings": [[0.25, 0.5]], "name": "Carol", "source": "legacy"}}"#,
        )
        .unwrap();

        let cache = EncodingCache::load(&path).unwrap();
        let record = cache.get("x/Carol/c.png").unwrap();
        assert_eq!(record.name, "Carol");
        assert_eq!(record.primary().unwrap().values, vec![0.25, 0.5]);
    }

    #[test]
    fn test_primary_skips_empty_records() {
        let record = EncodingRecord { encodings: vec![], name: "x".into() };
        assert!(record.primary().is_none());
    }
}
