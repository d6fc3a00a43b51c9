use std::path::Path;

use sqlx_core::migrate::{MigrateError, Migrator};

/// Workspace-root layout first, then running from inside `server/`.
const MIGRATION_DIRS: [&str; 2] = ["server/migrations", "./migrations"];

fn migrations_path() -> &'static Path {
    MIGRATION_DIRS
        .iter()
        .map(Path::new)
        .find(|dir| dir.exists())
        .unwrap_or_else(|| Path::new(MIGRATION_DIRS[1]))
}

pub async fn run(pool: &sqlx::PgPool) -> Result<(), MigrateError> {
    let migrator = Migrator::new(migrations_path()).await?;
    tracing::info!(migrations = migrator.iter().count(), "applying migrations");
    migrator.run(pool).await
}
