//! Atomic Edit Journal (C10)
//!
//! Guards every mutation the agent loop makes to a project file: back up,
//! write, validate, and roll back on any failure so a reader never observes
//! a partially written file without a restorable backup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Suffix for the side-journal file created next to the target during
/// [`apply`]. Exposed so integration tests can assert it is cleaned up.
pub const JOURNAL_SUFFIX: &str = ".cic-journal";

pub fn journal_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(JOURNAL_SUFFIX);
    PathBuf::from(name)
}

fn validate(path: &Path, expected_len: usize) -> io::Result<()> {
    let written = fs::read(path)?;
    if written.len() != expected_len {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "size mismatch after write"));
    }
    Ok(())
}

/// Apply `new_content` to `path`. On success the file is fully replaced and
/// no journal entry remains. On failure the original file (if any) is
/// restored and the error string names the failure and confirms rollback.
pub fn apply(path: &Path, new_content: &str) -> Result<(), String> {
    let journal_path = journal_path_for(path);
    let had_original = path.exists();

    if had_original {
        if let Err(err) = fs::copy(path, &journal_path) {
            return Err(format!("could not back up '{}': {err}", path.display()));
        }
    }

    let outcome = fs::write(path, new_content).and_then(|_| validate(path, new_content.len()));

    match outcome {
        Ok(()) => {
            if had_original {
                let _ = fs::remove_file(&journal_path);
            }
            Ok(())
        }
        Err(err) => {
            if had_original {
                let _ = fs::copy(&journal_path, path);
                let _ = fs::remove_file(&journal_path);
            } else {
                let _ = fs::remove_file(path);
            }
            Err(format!("failed to write '{}': {err}. Rollback performed.", path.display()))
        }
    }
}

