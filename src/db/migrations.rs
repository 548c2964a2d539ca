//! Position Store initialization: versioned schema and SQLite pragmas.
//!
//! The applied schema version lives in `PRAGMA user_version`; each entry of
//! `MIGRATIONS` above that version runs once, in order, inside a transaction.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};

/// Ordered schema steps. Statements are separated by `;`.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("schema.sql"))];

/// Open (creating if needed) the store at `db_path` and bring its schema up to date.
///
/// # Errors
/// Returns an error if the directory cannot be created, the database cannot
/// be opened, or a migration fails.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .after_connect(|conn, _meta| Box::pin(async move { apply_pragmas(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    let version = run_migrations(&pool).await?;
    info!(path = db_path, schema_version = version, "Position store ready");
    Ok(pool)
}

/// Apply pending migrations and return the resulting schema version.
async fn run_migrations(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let from = schema_version(pool).await?;
    let mut current = from;

    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > from) {
        let mut tx = pool.begin().await?;
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        // PRAGMA does not take bind parameters.
        sqlx::query(&format!("PRAGMA user_version = {}", version))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(from = current, to = version, "Applied schema migration");
        current = *version;
    }

    Ok(current)
}

async fn schema_version(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("PRAGMA user_version").fetch_one(pool).await?;
    Ok(row.get(0))
}

async fn apply_pragmas(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    // journal_mode answers with the mode actually in effect.
    let row = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?;
    let journal_mode: String = row.get(0);

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;

    debug!(journal_mode = %journal_mode, "SQLite connection configured");
    Ok(())
}
