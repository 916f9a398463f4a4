use super::{MirrorStore, NotificationEvent, NotificationSource};
use crate::db::models::{DirectoryRecord, FileRecord};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct Tables {
    directories: BTreeMap<i64, DirectoryRecord>,
    files: BTreeMap<i64, (FileRecord, Vec<u8>)>,
    last_directory_id: i64,
    last_file_id: i64,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Tables,
    subscribers: Vec<Sender<String>>,
    failing_file_inserts: usize,
}

/// In-process store with the same contract as the PostgreSQL one: unique
/// `(parent_id, name)` per table, transactional rollback and a new-file
/// notification raised on commit.
///
/// Every clone shares the tables and acts as a separate connection with its
/// own transaction state. Rollback restores the tables as they were at
/// `begin`, so overlapping transactions from different clones are not
/// isolated from each other.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
    transaction: Option<Transaction>,
}

#[derive(Debug, Clone)]
struct Transaction {
    snapshot: Tables,
    pending_notifications: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to the new-file channel.
    pub fn listen(&self) -> Result<MemoryNotifications> {
        let (sender, receiver) = mpsc::channel();
        self.lock()?.subscribers.push(sender);
        Ok(MemoryNotifications { receiver })
    }

    /// Sends a raw payload to every subscriber, as `NOTIFY` would.
    pub fn publish(&self, payload: &str) -> Result<()> {
        let mut shared = self.lock()?;
        deliver(&mut shared, payload);
        Ok(())
    }

    /// Makes the next `count` file inserts fail.
    pub fn fail_file_inserts(&self, count: usize) -> Result<()> {
        self.lock()?.failing_file_inserts = count;
        Ok(())
    }

    pub fn directory_count(&self) -> Result<usize> {
        Ok(self.lock()?.tables.directories.len())
    }

    pub fn file_count(&self) -> Result<usize> {
        Ok(self.lock()?.tables.files.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Shared>> {
        self.shared
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".to_string()))
    }

    fn notify_or_queue(&mut self, shared: &mut Shared, payload: String) {
        match self.transaction.as_mut() {
            Some(transaction) => transaction.pending_notifications.push(payload),
            None => deliver(shared, &payload),
        }
    }
}

fn deliver(shared: &mut Shared, payload: &str) {
    // Subscribers whose receiver is gone are dropped.
    shared
        .subscribers
        .retain(|subscriber| subscriber.send(payload.to_string()).is_ok());
}

impl MirrorStore for MemoryStore {
    fn load_directories(&mut self) -> Result<Vec<DirectoryRecord>> {
        Ok(self.lock()?.tables.directories.values().cloned().collect())
    }

    fn load_files(&mut self) -> Result<Vec<FileRecord>> {
        Ok(self
            .lock()?
            .tables
            .files
            .values()
            .map(|(record, _)| record.clone())
            .collect())
    }

    fn insert_directory(&mut self, parent_id: Option<i64>, name: &str) -> Result<i64> {
        let mut shared = self.lock()?;
        let tables = &mut shared.tables;

        if let Some(parent_id) = parent_id {
            if !tables.directories.contains_key(&parent_id) {
                return Err(Error::Store(format!(
                    "directory parent {} does not exist",
                    parent_id
                )));
            }
        }
        // NULL parents never collide, matching the SQL unique constraint.
        if parent_id.is_some()
            && tables
                .directories
                .values()
                .any(|d| d.parent_id == parent_id && d.name == name)
        {
            return Err(Error::Store(format!(
                "duplicate directory '{}' under {:?}",
                name, parent_id
            )));
        }

        tables.last_directory_id += 1;
        let id = tables.last_directory_id;
        tables.directories.insert(
            id,
            DirectoryRecord {
                id,
                parent_id,
                name: name.to_string(),
            },
        );
        debug!(id, name, "Inserted directory row");
        Ok(id)
    }

    fn insert_file(&mut self, parent_id: i64, name: &str, size: i64, content: &[u8]) -> Result<i64> {
        let shared_handle = Arc::clone(&self.shared);
        let mut shared = shared_handle
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".to_string()))?;

        if shared.failing_file_inserts > 0 {
            shared.failing_file_inserts -= 1;
            return Err(Error::Store(format!("injected failure inserting '{}'", name)));
        }

        let tables = &mut shared.tables;
        if !tables.directories.contains_key(&parent_id) {
            return Err(Error::Store(format!(
                "file parent {} does not exist",
                parent_id
            )));
        }
        if tables
            .files
            .values()
            .any(|(f, _)| f.parent_id == parent_id && f.name == name)
        {
            return Err(Error::Store(format!(
                "duplicate file '{}' under {}",
                name, parent_id
            )));
        }

        tables.last_file_id += 1;
        let id = tables.last_file_id;
        tables.files.insert(
            id,
            (
                FileRecord {
                    id,
                    parent_id,
                    name: name.to_string(),
                    size,
                },
                content.to_vec(),
            ),
        );
        debug!(id, name, size, "Inserted file row");

        self.notify_or_queue(&mut shared, id.to_string());
        Ok(id)
    }

    fn find_directory(&mut self, id: i64) -> Result<Option<DirectoryRecord>> {
        Ok(self.lock()?.tables.directories.get(&id).cloned())
    }

    fn find_file(&mut self, id: i64) -> Result<Option<FileRecord>> {
        Ok(self
            .lock()?
            .tables
            .files
            .get(&id)
            .map(|(record, _)| record.clone()))
    }

    fn read_content(&mut self, file_id: i64) -> Result<Vec<u8>> {
        self.lock()?
            .tables
            .files
            .get(&file_id)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| Error::Store(format!("file {} not found", file_id)))
    }

    fn begin_transaction(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(Error::Store("transaction already in progress".to_string()));
        }
        let snapshot = self.lock()?.tables.clone();
        self.transaction = Some(Transaction {
            snapshot,
            pending_notifications: Vec::new(),
        });
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<()> {
        let transaction = self
            .transaction
            .take()
            .ok_or_else(|| Error::Store("no transaction in progress".to_string()))?;
        let mut shared = self.lock()?;
        for payload in &transaction.pending_notifications {
            deliver(&mut shared, payload);
        }
        Ok(())
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        let transaction = self
            .transaction
            .take()
            .ok_or_else(|| Error::Store("no transaction in progress".to_string()))?;
        self.lock()?.tables = transaction.snapshot;
        Ok(())
    }
}

/// Subscription handed out by [`MemoryStore::listen`].
pub struct MemoryNotifications {
    receiver: Receiver<String>,
}

impl NotificationSource for MemoryNotifications {
    fn poll(&mut self) -> Result<Vec<NotificationEvent>> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(payload) => events.push(NotificationEvent::from_payload(&payload)?),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(Error::Notification("channel closed".to_string()))
                }
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_names_per_parent() {
        let mut store = MemoryStore::new();
        let root = store.insert_directory(None, "/").unwrap();
        store.insert_directory(Some(root), "a").unwrap();
        assert!(store.insert_directory(Some(root), "a").is_err());

        store.insert_file(root, "a", 0, b"").unwrap();
        assert!(store.insert_file(root, "a", 0, b"").is_err());
    }

    #[test]
    fn test_insert_requires_existing_parent() {
        let mut store = MemoryStore::new();
        assert!(store.insert_directory(Some(42), "a").is_err());
        assert!(store.insert_file(42, "a", 0, b"").is_err());
    }

    #[test]
    fn test_notification_outside_transaction() {
        let mut store = MemoryStore::new();
        let mut notifications = store.listen().unwrap();
        let root = store.insert_directory(None, "/").unwrap();
        let id = store.insert_file(root, "x.txt", 1, b"x").unwrap();

        assert_eq!(
            notifications.poll().unwrap(),
            vec![NotificationEvent { file_id: id }]
        );
        assert!(notifications.poll().unwrap().is_empty());
    }

    #[test]
    fn test_notifications_wait_for_commit() {
        let mut store = MemoryStore::new();
        let mut notifications = store.listen().unwrap();

        store.begin_transaction().unwrap();
        let root = store.insert_directory(None, "/").unwrap();
        let id = store.insert_file(root, "x.txt", 1, b"x").unwrap();
        assert!(notifications.poll().unwrap().is_empty());
        store.commit_transaction().unwrap();

        assert_eq!(
            notifications.poll().unwrap(),
            vec![NotificationEvent { file_id: id }]
        );
    }

    #[test]
    fn test_rollback_discards_rows_and_notifications() {
        let mut store = MemoryStore::new();
        let mut notifications = store.listen().unwrap();

        let result: Result<()> = store.transaction(|store| {
            let root = store.insert_directory(None, "/")?;
            store.insert_file(root, "x.txt", 1, b"x")?;
            Err(Error::Store("boom".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(store.directory_count().unwrap(), 0);
        assert_eq!(store.file_count().unwrap(), 0);
        assert!(notifications.poll().unwrap().is_empty());
    }

    #[test]
    fn test_clones_share_tables() {
        let mut writer = MemoryStore::new();
        let mut reader = writer.clone();
        let root = writer.insert_directory(None, "/").unwrap();
        let id = writer.insert_file(root, "x.txt", 3, b"abc").unwrap();

        assert_eq!(reader.read_content(id).unwrap(), b"abc".to_vec());
        assert_eq!(reader.find_file(id).unwrap().unwrap().size, 3);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let store = MemoryStore::new();
        let mut notifications = store.listen().unwrap();
        store.publish("not-a-number").unwrap();

        assert!(matches!(notifications.poll(), Err(Error::Notification(_))));
    }

    #[test]
    fn test_injected_insert_failure() {
        let mut store = MemoryStore::new();
        let root = store.insert_directory(None, "/").unwrap();
        store.fail_file_inserts(1).unwrap();

        assert!(store.insert_file(root, "a", 0, b"").is_err());
        assert!(store.insert_file(root, "a", 0, b"").is_ok());
    }
}
