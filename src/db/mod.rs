pub mod models;
mod pg;
pub mod schema;

pub use pg::{establish_connection, run_migrations, MIGRATIONS, NEW_FILE_CHANNEL};
