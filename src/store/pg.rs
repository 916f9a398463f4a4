use super::{MirrorStore, NotificationEvent, NotificationSource};
use crate::db::models::{DirectoryRecord, FileRecord, NewDirectory, NewFile};
use crate::db::{self, schema};
use crate::error::Result;
use diesel::connection::{AnsiTransactionManager, TransactionManager};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use tracing::{debug, info};

/// PostgreSQL-backed store client.
pub struct PgStore {
    connection: PgConnection,
}

impl PgStore {
    pub fn connect(database_url: &str) -> Result<Self> {
        let connection = db::establish_connection(database_url)?;
        Ok(PgStore { connection })
    }

    pub fn run_migrations(&mut self) -> Result<usize> {
        db::run_migrations(&mut self.connection)
    }

    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.connection
    }
}

impl MirrorStore for PgStore {
    fn load_directories(&mut self) -> Result<Vec<DirectoryRecord>> {
        use schema::directories::dsl::*;

        Ok(directories
            .select(DirectoryRecord::as_select())
            .order(id)
            .load(&mut self.connection)?)
    }

    fn load_files(&mut self) -> Result<Vec<FileRecord>> {
        use schema::files::dsl::*;

        Ok(files
            .select(FileRecord::as_select())
            .order(id)
            .load(&mut self.connection)?)
    }

    fn insert_directory(&mut self, parent_id: Option<i64>, name: &str) -> Result<i64> {
        let new_directory = NewDirectory { parent_id, name };
        Ok(diesel::insert_into(schema::directories::table)
            .values(&new_directory)
            .returning(schema::directories::id)
            .get_result(&mut self.connection)?)
    }

    fn insert_file(&mut self, parent_id: i64, name: &str, size: i64, content: &[u8]) -> Result<i64> {
        let new_file = NewFile {
            parent_id,
            name,
            size,
            content,
        };
        Ok(diesel::insert_into(schema::files::table)
            .values(&new_file)
            .returning(schema::files::id)
            .get_result(&mut self.connection)?)
    }

    fn find_directory(&mut self, directory_id: i64) -> Result<Option<DirectoryRecord>> {
        Ok(schema::directories::table
            .find(directory_id)
            .select(DirectoryRecord::as_select())
            .first(&mut self.connection)
            .optional()?)
    }

    fn find_file(&mut self, file_id: i64) -> Result<Option<FileRecord>> {
        Ok(schema::files::table
            .find(file_id)
            .select(FileRecord::as_select())
            .first(&mut self.connection)
            .optional()?)
    }

    fn read_content(&mut self, file_id: i64) -> Result<Vec<u8>> {
        Ok(schema::files::table
            .find(file_id)
            .select(schema::files::content)
            .first::<Vec<u8>>(&mut self.connection)?)
    }

    fn begin_transaction(&mut self) -> Result<()> {
        Ok(AnsiTransactionManager::begin_transaction(&mut self.connection)?)
    }

    fn commit_transaction(&mut self) -> Result<()> {
        Ok(AnsiTransactionManager::commit_transaction(&mut self.connection)?)
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        Ok(AnsiTransactionManager::rollback_transaction(&mut self.connection)?)
    }
}

/// Dedicated connection subscribed to the new-file channel.
pub struct PgNotifications {
    connection: PgConnection,
}

impl PgNotifications {
    pub fn listen(database_url: &str, channel: &str) -> Result<Self> {
        let mut connection = db::establish_connection(database_url)?;
        diesel::sql_query(format!("LISTEN {}", channel)).execute(&mut connection)?;
        info!("Listening on channel '{}'", channel);
        Ok(PgNotifications { connection })
    }
}

impl NotificationSource for PgNotifications {
    fn poll(&mut self) -> Result<Vec<NotificationEvent>> {
        let mut events = Vec::new();
        for notification in self.connection.notifications_iter() {
            let notification = notification?;
            debug!(
                channel = %notification.channel,
                payload = %notification.payload,
                "Received notification"
            );
            events.push(NotificationEvent::from_payload(&notification.payload)?);
        }
        Ok(events)
    }
}
