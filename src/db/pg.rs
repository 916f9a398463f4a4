use crate::error::{Error, Result};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::{debug, info};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Channel raised by the `notify_new_file` trigger on every file insert.
pub const NEW_FILE_CHANNEL: &str = "new_file";

pub fn establish_connection(database_url: &str) -> Result<PgConnection> {
    debug!("Connecting to {}", redact(database_url));
    Ok(PgConnection::establish(database_url)?)
}

/// Creates the tables and the file-insert notification trigger if they are
/// not there yet.
pub fn run_migrations(connection: &mut PgConnection) -> Result<usize> {
    let applied = connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| Error::Migration(err.to_string()))?;
    for version in &applied {
        info!("Applied migration {}", version);
    }
    Ok(applied.len())
}

// Keeps credentials out of the logs.
fn redact(database_url: &str) -> String {
    match (database_url.find("://"), database_url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &database_url[..scheme_end], &database_url[at..])
        }
        _ => database_url.to_string(),
    }
}
