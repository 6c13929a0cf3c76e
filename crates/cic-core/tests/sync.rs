//! Sync Engine behavioral tests (spec.md §4.5, §8): fresh-project sync,
//! the ignored-with-exception rule, idempotence, and incremental updates.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use cic_core::embed::NullEmbedder;
use cic_core::sync::{index_by_file_path, perform_sync, sync_single_file, SyncConfig};
use cic_core::Manifest;
use tempfile::tempdir;

fn cfg(source: &Path, storage: &Path) -> SyncConfig {
    SyncConfig {
        project_id: "p1".to_string(),
        source_dir: source.to_path_buf(),
        storage_dir: storage.to_path_buf(),
        allowed_extensions: vec!["py".to_string(), "ts".to_string()],
        ignored_paths: vec!["node_modules".to_string()],
        included_paths: vec![],
    }
}

#[tokio::test]
async fn fresh_project_sync_produces_expected_nodes() {
    let src = tempdir().unwrap();
    let storage = tempdir().unwrap();
    fs::write(src.path().join("a.py"), "def foo(): pass").unwrap();
    fs::write(src.path().join("b.ts"), "import x from './a';\nexport const y = 1;\n").unwrap();

    let c = cfg(src.path(), storage.path());
    let outcome = perform_sync(&c, &HashMap::new(), &NullEmbedder).await.unwrap();

    assert_eq!(outcome.updated_count, 2);
    assert_eq!(outcome.deleted_count, 0);

    // Two file nodes plus the `foo` and `y` block nodes (spec.md §8 Scenario 1).
    assert_eq!(outcome.nodes.len(), 4);

    let ids: HashSet<_> = outcome.nodes.iter().map(|n| n.id.as_str()).collect();
    assert!(ids.contains("a.py"));
    assert!(ids.contains("b.ts"));

    let foo_block = outcome.nodes.iter().find(|n| n.name == "foo").unwrap();
    assert_eq!(foo_block.file_path, "a.py");
    let y_block = outcome.nodes.iter().find(|n| n.name == "y").unwrap();
    assert_eq!(y_block.file_path, "b.ts");

    let b_file_node = outcome.nodes.iter().find(|n| n.id == "b.ts").unwrap();
    assert!(b_file_node.dependencies.contains("a"));

    assert!(storage.path().join("tree.txt").exists());
    let tree = fs::read_to_string(storage.path().join("tree.txt")).unwrap();
    assert!(tree.contains("a.py"));
    assert!(tree.contains("b.ts"));

    let manifest = Manifest::load(storage.path());
    assert_eq!(manifest.entries.len(), 2);
}

#[tokio::test]
async fn ignored_with_exception_scenario() {
    let src = tempdir().unwrap();
    let storage = tempdir().unwrap();
    fs::create_dir_all(src.path().join("node_modules/lib")).unwrap();
    fs::write(src.path().join("node_modules/lib/x.ts"), "export const z = 1;").unwrap();

    let mut c = cfg(src.path(), storage.path());
    c.included_paths = vec!["node_modules/lib".to_string()];
    let outcome = perform_sync(&c, &HashMap::new(), &NullEmbedder).await.unwrap();
    assert!(outcome.nodes.iter().any(|n| n.id == "node_modules/lib/x.ts"));

    let storage2 = tempdir().unwrap();
    let c2 = cfg(src.path(), storage2.path());
    let outcome2 = perform_sync(&c2, &HashMap::new(), &NullEmbedder).await.unwrap();
    assert!(!outcome2.nodes.iter().any(|n| n.id == "node_modules/lib/x.ts"));
}

#[tokio::test]
async fn second_sync_of_unchanged_tree_is_idempotent() {
    let src = tempdir().unwrap();
    let storage = tempdir().unwrap();
    fs::write(src.path().join("a.py"), "def foo(): pass").unwrap();

    let c = cfg(src.path(), storage.path());
    let first = perform_sync(&c, &HashMap::new(), &NullEmbedder).await.unwrap();
    let manifest_bytes_1 = fs::read(storage.path().join("manifest.json")).unwrap();

    let previous = index_by_file_path(&first.nodes);
    let second = perform_sync(&c, &previous, &NullEmbedder).await.unwrap();
    let manifest_bytes_2 = fs::read(storage.path().join("manifest.json")).unwrap();

    assert_eq!(second.updated_count, 0);
    assert_eq!(manifest_bytes_1, manifest_bytes_2);
    let ids1: HashSet<_> = first.nodes.iter().map(|n| n.id.clone()).collect();
    let ids2: HashSet<_> = second.nodes.iter().map(|n| n.id.clone()).collect();
    assert_eq!(ids1, ids2);
}

#[tokio::test]
async fn modifying_one_file_updates_only_that_file() {
    let src = tempdir().unwrap();
    let storage = tempdir().unwrap();
    fs::write(src.path().join("a.py"), "def foo(): pass").unwrap();
    fs::write(src.path().join("b.py"), "def bar(): pass").unwrap();

    let c = cfg(src.path(), storage.path());
    let first = perform_sync(&c, &HashMap::new(), &NullEmbedder).await.unwrap();
    let previous = index_by_file_path(&first.nodes);

    // Ensure the fingerprint (size-based) actually changes.
    fs::write(src.path().join("a.py"), "def foo(): return 1").unwrap();

    let second = perform_sync(&c, &previous, &NullEmbedder).await.unwrap();
    assert_eq!(second.updated_count, 1);
}

#[tokio::test]
async fn deleted_file_is_counted_and_dropped() {
    let src = tempdir().unwrap();
    let storage = tempdir().unwrap();
    fs::write(src.path().join("a.py"), "def foo(): pass").unwrap();
    fs::write(src.path().join("b.py"), "def bar(): pass").unwrap();

    let c = cfg(src.path(), storage.path());
    let first = perform_sync(&c, &HashMap::new(), &NullEmbedder).await.unwrap();
    let previous = index_by_file_path(&first.nodes);

    fs::remove_file(src.path().join("b.py")).unwrap();
    let second = perform_sync(&c, &previous, &NullEmbedder).await.unwrap();
    assert_eq!(second.deleted_count, 1);
    assert!(!second.nodes.iter().any(|n| n.file_path == "b.py"));
}

#[tokio::test]
async fn storage_dir_under_source_is_skipped() {
    let src = tempdir().unwrap();
    let storage_dir = src.path().join(".cic");
    fs::create_dir_all(&storage_dir).unwrap();
    fs::write(storage_dir.join("manifest.json"), "{}").unwrap();
    fs::write(src.path().join("a.py"), "def foo(): pass").unwrap();

    let c = cfg(src.path(), &storage_dir);
    let outcome = perform_sync(&c, &HashMap::new(), &NullEmbedder).await.unwrap();
    assert!(!outcome.nodes.iter().any(|n| n.file_path.starts_with(".cic")));
}

#[tokio::test]
async fn single_file_sync_upserts_mirror_and_manifest() {
    let src = tempdir().unwrap();
    let storage = tempdir().unwrap();
    fs::write(src.path().join("a.py"), "def foo(): pass").unwrap();

    let c = cfg(src.path(), storage.path());
    let nodes = sync_single_file(&c, "a.py", &NullEmbedder).await.unwrap();
    assert!(nodes.iter().any(|n| n.id == "a.py"));
    assert!(storage.path().join("converted_files/a.py.txt").exists());
    let manifest = Manifest::load(storage.path());
    assert!(manifest.get("a.py").is_some());
}
