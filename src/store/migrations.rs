//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.
//! On first run against a database created by the earlier ingestion scripts
//! (tables exist, no `_migrations` table), it seeds V1 without re-creating
//! tables.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
///
/// Column names in V1 match databases already in the field, including
/// `hear_rate_threshold_flag`.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS health (
                user_id TEXT,
                timestamp TEXT,
                heart_rate INT,
                hear_rate_threshold_flag TEXT,
                bp TEXT,
                bp_threshold_flag TEXT,
                glucose INT,
                glucose_threshold_flag TEXT,
                oxygen INT,
                oxygen_threshold_flag TEXT,
                alert_triggered TEXT,
                caregiver_notified TEXT
            );

            CREATE TABLE IF NOT EXISTS safety (
                user_id TEXT,
                timestamp TEXT,
                activity TEXT,
                fall_detected TEXT,
                impact_force_level TEXT,
                post_fall_inactivity_duration INT,
                location TEXT,
                alert_triggered TEXT,
                caregiver_notified TEXT
            );

            CREATE TABLE IF NOT EXISTS reminders (
                user_id TEXT,
                timestamp TEXT,
                reminder_type TEXT,
                scheduled_time TEXT,
                sent TEXT,
                acknowledged TEXT
            );

            CREATE TABLE IF NOT EXISTS agent_communications (
                sender TEXT,
                user_id TEXT,
                message TEXT,
                response TEXT,
                timestamp TEXT
            );
        "#,
    },
    Migration {
        version: 2,
        name: "evaluated_records",
        sql: r#"
            CREATE TABLE IF NOT EXISTS evaluated_records (
                domain TEXT NOT NULL,
                user_id TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                payload TEXT NOT NULL,
                persisted_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_evaluated_records_domain ON evaluated_records(domain);
            CREATE INDEX IF NOT EXISTS idx_agent_communications_sender
                ON agent_communications(sender);
        "#,
    },
];

/// Bring the schema up to the latest version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let mut current_version = get_current_version(conn).await?;

    // Pre-existing database: the V1 tables are already there.
    if current_version == 0 && legacy_tables_exist(conn).await? {
        seed_version(conn, 1, "initial_schema").await?;
        current_version = 1;
        tracing::info!("Existing database detected, seeded migration V1");
    }

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    tracing::debug!(
        version = get_current_version(conn).await?,
        "Database migrations complete"
    );
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get::<i64>(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

/// Check whether the communication log table already exists.
async fn legacy_tables_exist(conn: &Connection) -> Result<bool, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='agent_communications'",
            (),
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to check existing tables: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to read existing-table check: {e}")))?;

    match row {
        Some(row) => Ok(row.get::<i64>(0).unwrap_or(0) > 0),
        None => Ok(false),
    }
}

async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name.to_string()],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
