use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::{DbError, Result};

pub const CATALOG_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/catalog");

pub fn apply_migrations(conn: &mut SqliteConnection) -> Result<()> {
    conn.run_pending_migrations(CATALOG_MIGRATIONS)
        .map_err(|err| DbError::Migration(err.to_string()))?;
    Ok(())
}
