//! Database migrations for rooms, users and relations
//!
//! Each migration runs in its own transaction and is recorded in the
//! `room_schema_version` table.

use super::super::error::RoomError;
use super::super::types::Timestamp;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

/// Current schema version for core_room
pub const CURRENT_ROOM_SCHEMA_VERSION: i32 = 2;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial rooms, users and relations schema",
            up_sql: r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    created_at INTEGER NOT NULL
                );

                -- AUTOINCREMENT keeps ids of deleted rooms retired
                CREATE TABLE IF NOT EXISTS rooms (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    hashed_password BLOB NOT NULL DEFAULT x'',
                    creator_id INTEGER NOT NULL,
                    setting TEXT NOT NULL DEFAULT '{}',     -- RoomSetting as JSON
                    created_at INTEGER NOT NULL,
                    FOREIGN KEY (creator_id) REFERENCES users(id)
                );

                CREATE TABLE IF NOT EXISTS room_user_relations (
                    room_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    role TEXT NOT NULL CHECK(role IN ('Creator', 'Admin', 'Member')),
                    permissions INTEGER NOT NULL,
                    PRIMARY KEY (room_id, user_id),
                    FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE,
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_relations_user ON room_user_relations(user_id);

                -- At most one Creator per room
                CREATE UNIQUE INDEX IF NOT EXISTS idx_relations_single_creator
                    ON room_user_relations(room_id) WHERE role = 'Creator';
            "#,
        },
        Migration {
            version: 2,
            description: "Index rooms by creator",
            up_sql: r#"
                CREATE INDEX IF NOT EXISTS idx_rooms_creator ON rooms(creator_id);
            "#,
        },
    ]
}

fn ensure_version_table(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS room_schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Get current schema version from database
fn current_version(conn: &Connection) -> Result<i32, rusqlite::Error> {
    ensure_version_table(conn)?;

    let version: Option<i32> = conn
        .query_row(
            "SELECT version FROM room_schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(version.unwrap_or(0))
}

fn apply_pending(conn: &Connection) -> Result<(), rusqlite::Error> {
    let current = current_version(conn)?;

    for migration in get_migrations().into_iter().filter(|m| m.version > current) {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO room_schema_version (version, applied_at) VALUES (?, ?)",
            params![migration.version, Timestamp::now().as_millis()],
        )?;
        tx.commit()?;

        info!(
            version = migration.version,
            description = migration.description,
            "Applied room schema migration"
        );
    }

    Ok(())
}

/// Run all pending migrations
pub fn migrate(pool: &Pool<SqliteConnectionManager>) -> Result<(), RoomError> {
    let conn = pool
        .get()
        .map_err(|e| RoomError::internal(format!("failed to get connection: {}", e)))?;

    apply_pending(&conn).map_err(|e| RoomError::internal(format!("migration failed: {}", e)))
}

/// Schema version recorded in the database
pub fn schema_version(pool: &Pool<SqliteConnectionManager>) -> Result<i32, RoomError> {
    let conn = pool
        .get()
        .map_err(|e| RoomError::internal(format!("failed to get connection: {}", e)))?;

    current_version(&conn).map_err(|e| RoomError::internal(e.to_string()))
}

/// Get the latest migration version available
pub fn get_latest_version() -> i32 {
    get_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}
