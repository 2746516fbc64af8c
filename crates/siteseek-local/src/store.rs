//! Key-value stores for the persisted site index.

use sha2::{Digest, Sha256};
use siteseek_core::{Error, KeyValueStore, Result};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Prefix of the per-origin site index record key.
pub const SITE_INDEX_KEY_PREFIX: &str = "siteseek:site-index:";

pub fn site_index_key(origin: &str) -> String {
    format!("{SITE_INDEX_KEY_PREFIX}{origin}")
}

/// One file per key under `root`, named by the SHA-256 of the key and sharded
/// by its first two hex digits.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn default_dir() -> PathBuf {
        std::env::temp_dir().join("siteseek-cache")
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut h = Sha256::new();
        h.update(b"key:");
        h.update(key.as_bytes());
        let hex = hex::encode(h.finalize());
        self.root.join(&hex[0..2]).join(format!("{hex}.json"))
    }
}

impl KeyValueStore for FsStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let p = self.path_for(key);
        match fs::read_to_string(&p) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Cache(format!("read {}: {e}", p.display()))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let p = self.path_for(key);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Cache(e.to_string()))?;
        }
        // Write to a sibling then rename, so readers never see a partial record.
        let tmp = p.with_extension(format!("json.tmp.{}", std::process::id()));
        fs::write(&tmp, value.as_bytes()).map_err(|e| Error::Cache(e.to_string()))?;
        fs::rename(&tmp, &p).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            Error::Cache(e.to_string())
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Cache(e.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let g = self
            .map
            .lock()
            .map_err(|_| Error::Cache("memory store poisoned".into()))?;
        Ok(g.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut g = self
            .map
            .lock()
            .map_err(|_| Error::Cache("memory store poisoned".into()))?;
        g.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut g = self
            .map
            .lock()
            .map_err(|_| Error::Cache("memory store poisoned".into()))?;
        g.remove(key);
        Ok(())
    }
}
