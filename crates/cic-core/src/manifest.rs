//! Sync manifest: per-project `relative_path -> fingerprint` map.
//!
//! Written atomically at the end of each sync (spec.md §3). Corruption or
//! absence is treated as an empty manifest with a warning, never a fatal
//! error (spec.md §7).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// `BTreeMap` (not `HashMap`) so that repeated syncs of an unchanged tree
/// serialize to byte-identical JSON, satisfying the sync-idempotence
/// property in spec.md §8.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub entries: BTreeMap<String, String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `manifest.json` from `storage_dir`. A missing or corrupt file
    /// is logged and treated as an empty manifest.
    pub fn load(storage_dir: &Path) -> Self {
        let path = storage_dir.join("manifest.json");
        match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "corrupt manifest, starting empty");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Write `manifest.json` into `storage_dir`, creating the directory if
    /// needed. The `BTreeMap` serialization order makes this call
    /// idempotent: writing the same entries twice yields identical bytes.
    pub fn save(&self, storage_dir: &Path) -> Result<()> {
        fs::create_dir_all(storage_dir)?;
        let path = storage_dir.join("manifest.json");
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    pub fn get(&self, relative_path: &str) -> Option<&String> {
        self.entries.get(relative_path)
    }

    pub fn set(&mut self, relative_path: String, fingerprint: String) {
        self.entries.insert(relative_path, fingerprint);
    }

    pub fn remove(&mut self, relative_path: &str) -> bool {
        self.entries.remove(relative_path).is_some()
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

/// `size-mtime` fingerprint per spec.md §3 ("size + mtime suffices").
pub fn fingerprint(metadata: &fs::Metadata) -> String {
    let size = metadata.len();
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{size}-{mtime}")
}
