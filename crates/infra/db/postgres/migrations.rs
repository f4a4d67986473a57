use anyhow::{Result, anyhow};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

use super::postgres_connection::PgPoolSquad;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/");

/// Applies every embedded migration not yet recorded in `__diesel_schema_migrations`.
/// Already-applied versions are skipped, so running this on every start is safe.
pub fn run_pending_migrations(pool: &PgPoolSquad) -> Result<Vec<String>> {
    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| anyhow!("failed to run database migrations: {err}"))?;

    let versions: Vec<String> = applied.iter().map(|version| version.to_string()).collect();
    if versions.is_empty() {
        info!("migrations: schema is up to date");
    } else {
        info!(applied = ?versions, "migrations: applied pending migrations");
    }

    Ok(versions)
}
