//! Key Pool (C1)
//!
//! An ordered list of model-provider credentials, rotated on rate-limit
//! responses by the Model Gateway. Loaded once at startup from a JSON keys
//! file; a missing file is a warning, not a fatal error (gateway calls then
//! fail with [`crate::error::SearchError::NoKeysConfigured`]).

use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// On-disk shape of the keys file: an ordered array of model credentials plus
/// an optional secondary key for web search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeysFile {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub serper_key: Option<String>,
}

impl KeysFile {
    /// Load a keys file from `path`. Missing or corrupt files are logged and
    /// treated as an empty pool.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "corrupt keys file, starting with no keys");
                Self::default()
            }),
            Err(_) => {
                warn!(path = %path.display(), "keys file not found, web_search and generation will fail until one is provided");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Default)]
struct KeyPoolState {
    cursor: usize,
}

/// Thread-safe rotation over a fixed set of keys.
pub struct KeyPool {
    keys: Vec<String>,
    serper_key: Option<String>,
    state: Mutex<KeyPoolState>,
}

impl KeyPool {
    pub fn new(keys: Vec<String>, serper_key: Option<String>) -> Self {
        Self {
            keys,
            serper_key,
            state: Mutex::new(KeyPoolState::default()),
        }
    }

    pub fn from_file(file: KeysFile) -> Self {
        Self::new(file.keys, file.serper_key)
    }

    pub fn active_count(&self) -> usize {
        self.keys.len()
    }

    pub fn serper_key(&self) -> Option<&str> {
        self.serper_key.as_deref()
    }

    /// The key currently selected for use, or `None` if the pool is empty.
    pub fn current(&self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let cursor = self.state.lock().cursor % self.keys.len();
        Some(self.keys[cursor].as_str())
    }

    /// Advance to the next key, wrapping around.
    pub fn rotate(&self) {
        if self.keys.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        state.cursor = (state.cursor + 1) % self.keys.len();
    }

    /// Record a rate-limit hit against the current key and rotate away from it.
    pub fn report_rate_limit(&self) {
        self.rotate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pool_has_no_current_key() {
        let pool = KeyPool::new(vec![], None);
        assert_eq!(pool.active_count(), 0);
        assert!(pool.current().is_none());
    }

    #[test]
    fn rotate_wraps_around() {
        let pool = KeyPool::new(vec!["a".into(), "b".into()], None);
        assert_eq!(pool.current(), Some("a"));
        pool.rotate();
        assert_eq!(pool.current(), Some("b"));
        pool.rotate();
        assert_eq!(pool.current(), Some("a"));
    }

    #[test]
    fn report_rate_limit_rotates() {
        let pool = KeyPool::new(vec!["a".into(), "b".into()], None);
        pool.report_rate_limit();
        assert_eq!(pool.current(), Some("b"));
    }

    #[test]
    fn missing_file_loads_empty_without_panicking() {
        let file = KeysFile::load(Path::new("/nonexistent/keys.json"));
        assert!(file.keys.is_empty());
        assert!(file.serper_key.is_none());
    }
}
