//! Schema migrations for the cache database.
//!
//! Applied versions are recorded in `cache_schema`. Each pending migration
//! runs in its own transaction together with its version row.

use super::Error;
use tokio_rusqlite::{Connection, params};

/// (version, SQL), ascending.
const MIGRATIONS: &[(u32, &str)] = &[(1, include_str!("../../migrations/001_cache_stores.sql"))];

/// Apply pending migrations; returns how many ran.
pub async fn run(conn: &Connection) -> Result<usize, Error> {
    conn.call(|conn| -> Result<usize, Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_schema (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: u32 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM cache_schema", [], |row| row.get(0))?;

        let mut applied = 0;
        for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
            tracing::debug!(version, "applying cache migration");
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
            tx.execute(
                "INSERT INTO cache_schema (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            applied += 1;
        }

        Ok(applied)
    })
    .await
    .map_err(Error::from)
}
