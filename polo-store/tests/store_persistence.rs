use std::sync::Arc;
use std::thread;

use polo_store::{snapshot, LoadOutcome, SaveOutcome, Store};
use serde_json::json;
use tempfile::TempDir;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn save_then_restart_and_load_reproduces_entries() {
    init_logs();
    let dir = TempDir::new().expect("storage dir");

    let before = Store::with_storage_dir(dir.path(), 100);
    before.put("alpha", json!({"bytes": 12, "fingerprint": "abc"}));
    before.put("beta", json!([1, 2, 3]));
    before.put("gamma", json!(null));

    let outcome = before.save().expect("save");
    match outcome {
        SaveOutcome::Written { path, entries } => {
            assert_eq!(entries, 3);
            assert_eq!(path, dir.path().join(polo_store::SNAPSHOT_FILE_NAME));
        }
        other => panic!("expected a written snapshot, got {other:?}"),
    }

    // A fresh store stands in for the restarted process.
    let after = Store::with_storage_dir(dir.path(), 100);
    assert!(matches!(
        after.load().expect("load"),
        LoadOutcome::Loaded { entries: 3, evicted: 0 }
    ));
    assert_eq!(after.entries(), before.entries());
}

#[test]
fn interrupted_save_leaves_previous_snapshot_loadable() {
    init_logs();
    let dir = TempDir::new().expect("storage dir");

    let store = Store::with_storage_dir(dir.path(), 100);
    store.put("durable", json!("v1"));
    store.save().expect("first save");
    let durable = store.entries();

    // Simulate a crash halfway through the next save: the temp file holds a
    // truncated document and the rename never happened.
    store.put("durable", json!("v2"));
    store.put("extra", json!("lost"));
    std::fs::write(
        snapshot::temp_path(dir.path()),
        br#"{"saved_at":"2024-01-01T00:00:00Z","entries":[{"key":"dura"#,
    )
    .expect("write torn temp file");

    let restarted = Store::with_storage_dir(dir.path(), 100);
    restarted.load().expect("previous snapshot still loads");
    assert_eq!(restarted.entries(), durable);

    // The next successful save replaces the torn temp file.
    store.save().expect("second save");
    assert!(!snapshot::temp_path(dir.path()).exists());
    let reloaded = Store::with_storage_dir(dir.path(), 100);
    reloaded.load().expect("load after second save");
    assert_eq!(reloaded.get("durable").expect("durable").value, json!("v2"));
}

#[test]
fn unreadable_snapshot_is_kept_aside_instead_of_overwritten() {
    init_logs();
    let dir = TempDir::new().expect("storage dir");
    let broken = r#"{"saved_at":"2024-01-01T00:00:00Z","entries":[{"key":"precious","value":1,},]}"#;
    std::fs::write(snapshot::snapshot_path(dir.path()), broken).expect("seed snapshot");

    let store = Store::with_storage_dir(dir.path(), 100);
    assert!(store.load().is_err());
    assert!(store.is_empty());

    store.put("fresh", json!(true));
    assert!(matches!(
        store.save().expect("save"),
        SaveOutcome::Written { entries: 1, .. }
    ));

    let kept: Vec<_> = std::fs::read_dir(dir.path())
        .expect("list storage dir")
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.to_string_lossy().contains(".corrupt-"))
        .collect();
    assert_eq!(kept.len(), 1, "kept: {kept:?}");
    assert_eq!(std::fs::read_to_string(&kept[0]).expect("read kept"), broken);

    // Only the first save moves a file aside.
    store.save().expect("second save");
    let reloaded = Store::with_storage_dir(dir.path(), 100);
    reloaded.load().expect("new snapshot loads");
    assert!(reloaded.get("fresh").is_some());
    let corrupt_files = std::fs::read_dir(dir.path())
        .expect("list storage dir")
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
        .count();
    assert_eq!(corrupt_files, 1);
}

#[test]
fn concurrent_writers_and_pruners_keep_bound() {
    init_logs();
    let bound = 16;
    let store = Arc::new(Store::new(bound));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..250 {
                    store.put(format!("w{worker}-{i}"), json!(i));
                    if i % 10 == 0 {
                        store.prune();
                    }
                    let _ = store.get(&format!("w{worker}-{}", i / 2));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread");
    }

    store.prune();
    assert!(store.len() <= bound, "len {} exceeds {bound}", store.len());
}

#[test]
fn save_is_consistent_while_writers_run() {
    init_logs();
    let dir = TempDir::new().expect("storage dir");
    let store = Arc::new(Store::with_storage_dir(dir.path(), 10_000));

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..2_000 {
                store.put(format!("k{i}"), json!(i));
            }
        })
    };

    for _ in 0..5 {
        store.save().expect("save during writes");
        let check = Store::with_storage_dir(dir.path(), 10_000);
        check.load().expect("every snapshot is loadable");
    }
    writer.join().expect("writer thread");

    store.save().expect("final save");
    let check = Store::with_storage_dir(dir.path(), 10_000);
    check.load().expect("final load");
    assert_eq!(check.len(), 2_000);
}
