use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Database connection error: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("The directory '{}' does not exist", .0.display())]
    MirrorRootMissing(PathBuf),

    #[error("Cannot scan '{}': {reason}", path.display())]
    Scan { path: PathBuf, reason: String },

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Integrity error: {0}")]
    Integrity(String),
}
