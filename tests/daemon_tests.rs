use minidrive::store::{shared, MemoryStore, MirrorStore};
use minidrive::{CancelToken, Daemon, DiskWatcher, Importer, SyncSettings};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn settings(watch: bool) -> SyncSettings {
    SyncSettings {
        poll_interval: Duration::from_millis(20),
        watch,
        watch_debounce: Duration::from_millis(100),
        ignore_patterns: Vec::new(),
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(15);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    condition()
}

fn stored_paths(memory: &MemoryStore) -> Vec<String> {
    let tree = memory.clone().load_tree().unwrap();
    let mut paths: Vec<String> = tree
        .files()
        .map(|(id, _)| tree.file_relative_path(id))
        .collect();
    paths.sort();
    paths
}

fn write(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_initial_sync_restores_then_imports() {
    let memory = MemoryStore::new();
    let peer = tempdir().unwrap();
    write(peer.path(), "from/store.txt", b"store");
    Importer::new(shared(memory.clone()))
        .import_tree(peer.path())
        .unwrap();

    let local = tempdir().unwrap();
    write(local.path(), "from/disk.txt", b"disk");

    let daemon = Daemon::new(shared(memory.clone()), local.path(), settings(false)).unwrap();
    let initial = daemon.initial_sync().unwrap();

    assert_eq!(initial.restored.files_restored, 1);
    assert_eq!(initial.imported.unwrap().files_added, 1);
    assert_eq!(fs::read(local.path().join("from/store.txt")).unwrap(), b"store".to_vec());
    assert_eq!(stored_paths(&memory), vec!["from/disk.txt", "from/store.txt"]);
}

#[test]
fn test_daemon_restores_files_added_by_a_peer() {
    let memory = MemoryStore::new();
    let local = tempdir().unwrap();
    let notifications = memory.listen().unwrap();

    let daemon = Daemon::new(shared(memory.clone()), local.path(), settings(false)).unwrap();
    let handle = daemon.start(notifications, CancelToken::new()).unwrap();

    let peer = tempdir().unwrap();
    write(peer.path(), "shared/doc.txt", b"hello");
    Importer::new(shared(memory.clone()))
        .import_tree(peer.path())
        .unwrap();

    assert!(wait_for(|| local.path().join("shared/doc.txt").is_file()));
    assert!(!handle.is_listener_finished());
    handle.shutdown();
}

#[test]
fn test_watcher_imports_new_files() {
    let memory = MemoryStore::new();
    let local = tempdir().unwrap();
    let cancel = CancelToken::new();
    let watcher = DiskWatcher::new(
        Importer::new(shared(memory.clone())),
        local.path(),
        Duration::from_millis(100),
    )
    .unwrap();
    let handle = watcher.spawn(cancel.clone()).unwrap();

    // Give the backend a moment to register the watch.
    thread::sleep(Duration::from_millis(300));
    write(local.path(), "new/file.txt", b"fresh");

    assert!(wait_for(|| stored_paths(&memory) == vec!["new/file.txt"]));
    cancel.cancel();
    handle.join().unwrap().unwrap();
}

#[test]
fn test_watcher_imports_while_another_file_keeps_changing() {
    use std::io::Write;

    let memory = MemoryStore::new();
    let local = tempdir().unwrap();
    let cancel = CancelToken::new();
    let handle = DiskWatcher::new(
        Importer::new(shared(memory.clone())),
        local.path(),
        Duration::from_millis(300),
    )
    .unwrap()
    .spawn(cancel.clone())
    .unwrap();
    thread::sleep(Duration::from_millis(300));

    let writer_cancel = CancelToken::new();
    let log_path = local.path().join("app.log");
    let writer = {
        let writer_cancel = writer_cancel.clone();
        thread::spawn(move || {
            let mut log = fs::File::create(log_path).unwrap();
            while !writer_cancel.sleep(Duration::from_millis(100)) {
                writeln!(log, "tick").unwrap();
                log.flush().unwrap();
            }
        })
    };
    thread::sleep(Duration::from_millis(200));
    write(local.path(), "new.txt", b"new");

    let imported = wait_for(|| stored_paths(&memory).contains(&"new.txt".to_string()));
    writer_cancel.cancel();
    writer.join().unwrap();
    cancel.cancel();
    handle.join().unwrap().unwrap();
    assert!(imported);
}

#[test]
fn test_shutdown_joins_both_threads() {
    let memory = MemoryStore::new();
    let local = tempdir().unwrap();
    let notifications = memory.listen().unwrap();
    let cancel = CancelToken::new();

    let daemon = Daemon::new(shared(memory.clone()), local.path(), settings(true)).unwrap();
    let handle = daemon.start(notifications, cancel.clone()).unwrap();
    assert!(!cancel.is_cancelled());

    let started = Instant::now();
    handle.shutdown();

    assert!(cancel.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_watcher_spawn_reports_unwatchable_root() {
    let parent = tempdir().unwrap();
    let root = parent.path().join("mirror");
    fs::create_dir(&root).unwrap();
    let watcher = DiskWatcher::new(
        Importer::new(shared(MemoryStore::new())),
        &root,
        Duration::from_millis(100),
    )
    .unwrap();
    fs::remove_dir(&root).unwrap();

    let result = watcher.spawn(CancelToken::new());

    assert!(matches!(result, Err(minidrive::Error::Watch(_))));
}

#[test]
fn test_daemon_requires_existing_root() {
    let missing = tempdir().unwrap().path().join("missing");
    assert!(Daemon::new(shared(MemoryStore::new()), &missing, settings(false)).is_err());
}
