use cic_agent::journal::{apply, journal_path_for};
use tempfile::tempdir;

#[test]
fn apply_replaces_existing_file_and_clears_journal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, "original").unwrap();

    apply(&path, "rewritten").unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "rewritten");
    assert!(!journal_path_for(&path).exists());
}

#[test]
fn apply_creates_new_file_when_none_existed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("new.txt");

    apply(&path, "hello").unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    assert!(!journal_path_for(&path).exists());
}

#[test]
fn backup_failure_is_reported_without_touching_the_target() {
    // A directory can never be copied as a file by `fs::copy`, so this
    // deterministically exercises the backup-failure branch (distinct from
    // the write-failure/rollback branch) without depending on filesystem
    // permission enforcement, which a root-run test process bypasses.
    let dir = tempdir().unwrap();
    let path = dir.path().join("a_directory");
    std::fs::create_dir(&path).unwrap();

    let result = apply(&path, "content");

    assert!(result.is_err());
    assert!(result.unwrap_err().contains("could not back up"));
    assert!(path.is_dir());
    assert!(!journal_path_for(&path).exists());
}

#[test]
fn repeated_apply_never_leaves_a_stray_journal_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.txt");

    for content in ["v1", "v2", "v3"] {
        apply(&path, content).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
        assert!(!journal_path_for(&path).exists());
    }
}
