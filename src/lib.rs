pub mod browse;
pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod shutdown;
pub mod store;
pub mod sync;
pub mod tree;

pub use config::{load_configuration, AppConfig};
pub use daemon::{Daemon, DaemonHandle, InitialSync, SyncSettings};
pub use error::{Error, Result};
pub use shutdown::CancelToken;
pub use store::{MemoryStore, MirrorStore, NotificationSource, PgNotifications, PgStore};
pub use sync::{DiskWatcher, ImportResult, Importer, NotificationListener, RestoreReport, Restorer};
pub use tree::{DirectoryNode, FileNode, MirrorTree};
