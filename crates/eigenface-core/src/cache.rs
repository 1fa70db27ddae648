//! Content-addressed on-disk cache of trained face spaces.
//!
//! Entries are JSON files named by a SHA-256 digest of the training group
//! (dimensions, component count, identifiers and pixel data), so a rebuilt
//! group with identical inputs always finds its previous result.

use crate::face_space::{FaceSpace, FaceSpaceError};
use crate::types::TrainingSet;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const CACHE_FORMAT_VERSION: u32 = 1;
const CACHE_SUFFIX: &str = ".facespace.json";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache encode: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{}: {source}", path.display())]
    Incompatible {
        path: PathBuf,
        #[source]
        source: FaceSpaceError,
    },
}

/// A cache file's contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub format_version: u32,
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub face_space: FaceSpace,
}

#[derive(Serialize)]
struct CacheEntryRef<'a> {
    format_version: u32,
    key: &'a str,
    created_at: DateTime<Utc>,
    face_space: &'a FaceSpace,
}

/// Stable key for a training set: identical inputs give identical keys.
pub fn cache_key(set: &TrainingSet) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("v{CACHE_FORMAT_VERSION}:{}x{}:{}", set.width, set.height, set.components));
    for (identifier, face) in set.identifiers.iter().zip(&set.faces) {
        hasher.update([0u8]);
        hasher.update(identifier.as_bytes());
        hasher.update([0u8]);
        for pixel in face {
            hasher.update(pixel.to_le_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Directory of cached face spaces.
#[derive(Debug, Clone)]
pub struct ModelCache {
    dir: PathBuf,
}

impl ModelCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}{CACHE_SUFFIX}"))
    }

    /// Load the face space stored under `key`, or `None` if nothing is cached.
    ///
    /// An entry that exists but fails structural validation is an error,
    /// never a silent miss.
    pub fn load(&self, key: &str) -> Result<Option<FaceSpace>, CacheError> {
        let path = self.path_for(key);
        let entry = match read_entry(&path) {
            Ok(entry) => entry,
            Err(CacheError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "face space cache miss");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if entry.key != key {
            return Err(incompatible(
                &path,
                format!("entry key {} does not match {key}", entry.key),
            ));
        }

        tracing::info!(
            path = %path.display(),
            created_at = %entry.created_at,
            faces = entry.face_space.len(),
            "loaded cached face space"
        );
        Ok(Some(entry.face_space))
    }

    /// Write `space` under `key`, replacing any previous entry.
    pub fn store(&self, key: &str, space: &FaceSpace) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.tmp"));

        let entry = CacheEntryRef {
            format_version: CACHE_FORMAT_VERSION,
            key,
            created_at: Utc::now(),
            face_space: space,
        };
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &entry)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;

        tracing::info!(path = %path.display(), faces = space.len(), "stored face space");
        Ok(path)
    }

    /// Delete the entry under `key`. Returns whether one existed.
    pub fn remove(&self, key: &str) -> Result<bool, CacheError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Read a cache file without checking its key. The face space is
/// validated as it is decoded.
pub fn read_entry(path: &Path) -> Result<CacheEntry, CacheError> {
    let file = File::open(path)?;
    let entry: CacheEntry = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| incompatible(path, format!("undecodable entry: {e}")))?;

    if entry.format_version != CACHE_FORMAT_VERSION {
        return Err(incompatible(
            path,
            format!(
                "format version {} (expected {CACHE_FORMAT_VERSION})",
                entry.format_version
            ),
        ));
    }
    Ok(entry)
}

fn incompatible(path: &Path, msg: String) -> CacheError {
    CacheError::Incompatible {
        path: path.to_path_buf(),
        source: FaceSpaceError::IncompatibleCache(msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FaceSpaceBuilder;

    fn sample_set() -> TrainingSet {
        TrainingSet::new(
            vec![
                vec![10.0, 20.0, 30.0, 40.0],
                vec![40.0, 10.0, 0.0, 25.0],
                vec![5.0, 50.0, 15.0, 35.0],
            ],
            vec!["a.png".into(), "b.png".into(), "c.png".into()],
            2,
            2,
            2,
        )
    }

    #[test]
    fn test_cache_key_is_stable_and_content_derived() {
        let set = sample_set();
        assert_eq!(cache_key(&set), cache_key(&sample_set()));
        assert_eq!(cache_key(&set).len(), 64);

        let mut renamed = sample_set();
        renamed.identifiers[0] = "z.png".into();
        assert_ne!(cache_key(&set), cache_key(&renamed));

        let mut repainted = sample_set();
        repainted.faces[2][3] += 1.0;
        assert_ne!(cache_key(&set), cache_key(&repainted));

        let mut fewer = sample_set();
        fewer.components = 1;
        assert_ne!(cache_key(&set), cache_key(&fewer));
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path());
        let set = sample_set();
        let key = cache_key(&set);
        let space = FaceSpaceBuilder::new().build(set).unwrap();

        let path = cache.store(&key, &space).unwrap();
        assert!(path.exists());

        let loaded = cache.load(&key).unwrap().expect("entry present");
        assert_eq!(loaded.identifiers(), space.identifiers());
        assert_eq!(loaded.basis(), space.basis());
        assert_eq!(loaded.weights(), space.weights());
    }

    #[test]
    fn test_missing_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path());
        assert!(cache.load("deadbeef").unwrap().is_none());
        assert!(!cache.remove("deadbeef").unwrap());
    }

    #[test]
    fn test_corrupt_entry_is_incompatible() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path());
        fs::write(cache.path_for("k"), b"{ not json").unwrap();

        let err = cache.load("k").unwrap_err();
        assert!(matches!(
            err,
            CacheError::Incompatible { source: FaceSpaceError::IncompatibleCache(_), .. }
        ));
    }

    #[test]
    fn test_structurally_invalid_entry_is_incompatible() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path());
        let set = sample_set();
        let key = cache_key(&set);
        let space = FaceSpaceBuilder::new().build(set).unwrap();
        let path = cache.store(&key, &space).unwrap();

        // Drop one identifier so the weight matrix no longer lines up.
        let mut value: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        value["face_space"]["identifiers"].as_array_mut().unwrap().pop();
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        let err = cache.load(&key).unwrap_err();
        assert!(
            matches!(&err, CacheError::Incompatible { source: FaceSpaceError::IncompatibleCache(msg), .. } if msg.contains("weight matrix")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_key_mismatch_is_incompatible() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path());
        let set = sample_set();
        let key = cache_key(&set);
        let space = FaceSpaceBuilder::new().build(set).unwrap();
        let path = cache.store(&key, &space).unwrap();
        fs::rename(&path, cache.path_for("other")).unwrap();

        assert!(matches!(cache.load("other"), Err(CacheError::Incompatible { .. })));
    }

    #[test]
    fn test_remove_existing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path().join("nested"));
        let set = sample_set();
        let key = cache_key(&set);
        let space = FaceSpaceBuilder::new().build(set).unwrap();
        cache.store(&key, &space).unwrap();

        assert!(cache.remove(&key).unwrap());
        assert!(cache.load(&key).unwrap().is_none());
    }
}
