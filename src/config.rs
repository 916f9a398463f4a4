use crate::error::{Error, Result};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub db_connection: DbConnection,
    pub app: App,
}

/// Missing keys fall back to [`DbConnection::default`] one by one.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DbConnection {
    pub address: String,
    pub name: String,
    pub user: String,
    pub password: String,
}

// Keeps the password out of `print-config` and debug logs.
impl fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "" } else { "***" };
        f.debug_struct("DbConnection")
            .field("address", &self.address)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &password)
            .finish()
    }
}

impl Default for DbConnection {
    fn default() -> Self {
        DbConnection {
            address: "localhost".to_string(),
            name: "minidrive".to_string(),
            user: "minidrive".to_string(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct App {
    /// Mirrored root directory.
    pub directory: String,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,
    #[serde(default = "default_watch")]
    pub watch: bool,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_watch_debounce_ms() -> u64 {
    500
}

fn default_watch() -> bool {
    true
}

pub fn load_configuration() -> std::result::Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("MINIDRIVE").separator("__"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

impl AppConfig {
    /// `DATABASE_URL` wins over the `db_connection` table when it is set.
    pub fn database_url(&self) -> String {
        env::var("DATABASE_URL").unwrap_or_else(|_| self.db_connection.url())
    }

    pub fn mirror_root(&self) -> Result<PathBuf> {
        let root = PathBuf::from(&self.app.directory);
        if root.is_dir() {
            Ok(root)
        } else {
            Err(Error::MirrorRootMissing(root))
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.app.poll_interval_ms)
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.app.watch_debounce_ms)
    }
}

impl DbConnection {
    /// Credentials are percent-encoded so reserved characters in them
    /// cannot change the host or database the URL points at.
    pub fn url(&self) -> String {
        let user = urlencoding::encode(&self.user);
        if self.password.is_empty() {
            format!("postgres://{}@{}/{}", user, self.address, self.name)
        } else {
            format!(
                "postgres://{}:{}@{}/{}",
                user,
                urlencoding::encode(&self.password),
                self.address,
                self.name
            )
        }
    }
}
