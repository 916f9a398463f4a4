use minidrive::store::{shared, MemoryStore, MirrorStore};
use minidrive::{CancelToken, Error, NotificationListener};
use std::fs;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn insert_path(store: &mut MemoryStore, directories: &[&str], name: &str, content: &[u8]) -> i64 {
    let tree = store.load_tree().unwrap();
    let mut parent = match tree.directory(tree.root()).store_id() {
        Some(root) => root,
        None => store.insert_directory(None, "/").unwrap(),
    };
    for directory in directories {
        parent = store.insert_directory(Some(parent), directory).unwrap();
    }
    store
        .insert_file(parent, name, content.len() as i64, content)
        .unwrap()
}

#[test]
fn test_notified_file_is_restored_in_one_poll() {
    let memory = MemoryStore::new();
    let notifications = memory.listen().unwrap();
    let target = tempdir().unwrap();
    let mut listener =
        NotificationListener::new(shared(memory.clone()), notifications, target.path()).unwrap();

    let mut writer = memory.clone();
    insert_path(&mut writer, &["c"], "d.txt", b"from a peer");

    let report = listener.poll_once().unwrap();

    assert_eq!(report.files_restored, 1);
    assert_eq!(
        fs::read(target.path().join("c/d.txt")).unwrap(),
        b"from a peer".to_vec()
    );
    assert_eq!(listener.poll_once().unwrap().files_restored, 0);
}

#[test]
fn test_committed_import_batch_is_restored_elsewhere() {
    let memory = MemoryStore::new();
    let notifications = memory.listen().unwrap();
    let source = tempdir().unwrap();
    let mirror = tempdir().unwrap();
    fs::create_dir_all(source.path().join("x/y")).unwrap();
    fs::write(source.path().join("x/y/z.txt"), b"z").unwrap();
    fs::write(source.path().join("x/w.txt"), b"w").unwrap();

    minidrive::Importer::new(shared(memory.clone()))
        .import_tree(source.path())
        .unwrap();
    let mut listener =
        NotificationListener::new(shared(memory.clone()), notifications, mirror.path()).unwrap();
    let report = listener.poll_once().unwrap();

    assert_eq!(report.files_restored, 2);
    assert_eq!(fs::read(mirror.path().join("x/y/z.txt")).unwrap(), b"z".to_vec());
    assert_eq!(fs::read(mirror.path().join("x/w.txt")).unwrap(), b"w".to_vec());
}

#[test]
fn test_unknown_id_is_skipped() {
    let memory = MemoryStore::new();
    let notifications = memory.listen().unwrap();
    let target = tempdir().unwrap();
    let mut listener =
        NotificationListener::new(shared(memory.clone()), notifications, target.path()).unwrap();

    memory.publish("999").unwrap();
    let mut writer = memory.clone();
    insert_path(&mut writer, &[], "real.txt", b"r");

    let report = listener.poll_once().unwrap();

    assert_eq!(report.files_restored, 1);
    assert!(target.path().join("real.txt").is_file());
}

#[test]
fn test_malformed_payload_ends_the_loop() {
    let memory = MemoryStore::new();
    let notifications = memory.listen().unwrap();
    let target = tempdir().unwrap();
    let listener = NotificationListener::new(shared(memory.clone()), notifications, target.path())
        .unwrap()
        .with_poll_interval(Duration::from_millis(20));

    memory.publish("not a number").unwrap();
    let result = listener.run(&CancelToken::new());

    assert!(matches!(result, Err(Error::Notification(_))));
}

#[test]
fn test_cancel_stops_the_loop() {
    let memory = MemoryStore::new();
    let notifications = memory.listen().unwrap();
    let target = tempdir().unwrap();
    let cancel = CancelToken::new();
    let handle = NotificationListener::new(shared(memory.clone()), notifications, target.path())
        .unwrap()
        .with_poll_interval(Duration::from_millis(20))
        .spawn(cancel.clone())
        .unwrap();

    let mut writer = memory.clone();
    insert_path(&mut writer, &["late"], "file.txt", b"late");
    let deadline = Instant::now() + Duration::from_secs(10);
    while !target.path().join("late/file.txt").exists() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(target.path().join("late/file.txt").exists());

    cancel.cancel();
    handle.join().unwrap().unwrap();
}
