//! Database schema migrations for bastion.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::{debug, warn};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (fresh database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    debug!(version, "schema migrated");
    Ok(())
}

/// Migration v1: roster, flags and the attack ledger.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS teams (
            id    INTEGER PRIMARY KEY,
            name  TEXT NOT NULL,
            token TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS idx_teams_token ON teams(token);

        CREATE TABLE IF NOT EXISTS challenges (
            id                INTEGER PRIMARY KEY,
            title             TEXT NOT NULL,
            auto_refresh_flag INTEGER NOT NULL DEFAULT 0,
            command           TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS game_boxes (
            id           INTEGER PRIMARY KEY,
            team_id      INTEGER NOT NULL,
            challenge_id INTEGER NOT NULL,
            address      TEXT NOT NULL DEFAULT '',
            port         INTEGER NOT NULL DEFAULT 0,
            visible      INTEGER NOT NULL DEFAULT 1,
            is_attacked  INTEGER NOT NULL DEFAULT 0,
            is_down      INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_game_boxes_challenge ON game_boxes(challenge_id);

        CREATE TABLE IF NOT EXISTS flags (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            team_id      INTEGER NOT NULL,
            game_box_id  INTEGER NOT NULL,
            challenge_id INTEGER NOT NULL,
            round        INTEGER NOT NULL,
            value        TEXT NOT NULL,
            UNIQUE(game_box_id, round)
        );
        CREATE INDEX IF NOT EXISTS idx_flags_value ON flags(value);
        CREATE INDEX IF NOT EXISTS idx_flags_challenge ON flags(challenge_id);

        CREATE TABLE IF NOT EXISTS attack_actions (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            victim_team_id   INTEGER NOT NULL,
            game_box_id      INTEGER NOT NULL,
            attacker_team_id INTEGER NOT NULL,
            challenge_id     INTEGER NOT NULL,
            round            INTEGER NOT NULL,
            created_at       TEXT NOT NULL,
            UNIQUE(game_box_id, attacker_team_id, round)
        );
        CREATE INDEX IF NOT EXISTS idx_attack_actions_round ON attack_actions(round);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: settled rounds and the audit log.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS scores (
            round      INTEGER PRIMARY KEY,
            settled_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS logs (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            level      TEXT NOT NULL,
            kind       TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_logs_level ON logs(level);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()
}
