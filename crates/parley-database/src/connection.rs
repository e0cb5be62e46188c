//! PostgreSQL pool setup for the `postgres` store provider.
//!
//! Opening the pool also brings the schema up to date when
//! `database.run_migrations` is set, so the repositories never see an
//! unmigrated database.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use parley_core::config::DatabaseConfig;
use parley_core::error::{AppError, ErrorKind};
use parley_core::result::AppResult;

/// Pool options derived from the database section.
///
/// `min_connections` never exceeds `max_connections`, and an idle timeout
/// of zero keeps idle connections forever.
pub fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    let max = config.max_connections.max(1);
    let idle = (config.idle_timeout_seconds > 0)
        .then(|| Duration::from_secs(config.idle_timeout_seconds));

    PgPoolOptions::new()
        .max_connections(max)
        .min_connections(config.min_connections.min(max))
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .idle_timeout(idle)
}

/// Open the pool and apply embedded migrations if configured.
pub async fn open_pool(config: &DatabaseConfig) -> AppResult<PgPool> {
    info!(
        target_db = %database_target(&config.url),
        max_connections = config.max_connections,
        run_migrations = config.run_migrations,
        "Opening PostgreSQL pool"
    );

    let pool = pool_options(config)
        .connect(&config.url)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to open PostgreSQL pool", e))?;

    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Schema migration failed", e))?;
        info!("Chat schema is up to date");
    }

    Ok(pool)
}

/// Host, port, and database of a connection URL, with any credentials
/// and query parameters dropped.
fn database_target(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let rest = rest.rsplit_once('@').map_or(rest, |(_, host)| host);
    rest.split_once('?').map_or(rest, |(target, _)| target)
}
