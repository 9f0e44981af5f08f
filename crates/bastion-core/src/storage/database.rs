//! SQLite-backed competition storage.
//!
//! Provides persistent storage for:
//! - The roster (teams, challenges, game boxes and their per-round status)
//! - Generated flags
//! - The attack ledger
//! - Settled rounds and the audit log
//!
//! The store trait implementations live in [`super::stores`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{data_dir, migrations};
use crate::error::{DatabaseError, Result};
use crate::game::{Challenge, GameBox, Team};

/// How long a writer waits on a locked database file before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub level: String,
    pub kind: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// SQLite database shared by every store seam.
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open the database at `path`, creating the file, its directory and the
    /// schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self::from_connection(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "database opened");
        Ok(db)
    }

    /// Open `bastion.db` in the data directory.
    ///
    /// # Errors
    /// Returns an error if the data directory or the database is unusable.
    pub fn open_default() -> Result<Self> {
        Self::open(data_dir()?.join("bastion.db"))
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| DatabaseError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(DatabaseError::from)?;
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// File backing this database, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with exclusive use of the connection.
    ///
    /// # Errors
    /// Returns [`DatabaseError::Locked`] if a previous holder panicked, and
    /// the query error otherwise.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn.lock().map_err(|_| DatabaseError::Locked)?;
        Ok(f(&conn).map_err(DatabaseError::from)?)
    }

    /// Upsert the configured roster. Existing boxes keep their per-round
    /// `is_attacked` / `is_down` status; rows no longer configured are removed.
    ///
    /// # Errors
    /// Returns an error if any write fails; nothing is applied in that case.
    pub fn sync_roster(
        &self,
        teams: &[Team],
        challenges: &[Challenge],
        boxes: &[GameBox],
    ) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO teams (id, name, token) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET name = excluded.name, token = excluded.token",
                )?;
                for team in teams {
                    stmt.execute(params![team.id, team.name, team.token])?;
                }
                prune(&tx, "teams", teams.iter().map(|t| t.id))?;

                let mut stmt = tx.prepare(
                    "INSERT INTO challenges (id, title, auto_refresh_flag, command)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        title = excluded.title,
                        auto_refresh_flag = excluded.auto_refresh_flag,
                        command = excluded.command",
                )?;
                for challenge in challenges {
                    stmt.execute(params![
                        challenge.id,
                        challenge.title,
                        challenge.auto_refresh_flag,
                        challenge.command
                    ])?;
                }
                prune(&tx, "challenges", challenges.iter().map(|c| c.id))?;

                let mut stmt = tx.prepare(
                    "INSERT INTO game_boxes (id, team_id, challenge_id, address, port, visible)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                        team_id = excluded.team_id,
                        challenge_id = excluded.challenge_id,
                        address = excluded.address,
                        port = excluded.port,
                        visible = excluded.visible",
                )?;
                for game_box in boxes {
                    stmt.execute(params![
                        game_box.id,
                        game_box.team_id,
                        game_box.challenge_id,
                        game_box.address,
                        game_box.port,
                        game_box.visible
                    ])?;
                }
                prune(&tx, "game_boxes", boxes.iter().map(|b| b.id))?;
            }

            tx.commit()
        })?;

        info!(
            teams = teams.len(),
            challenges = challenges.len(),
            game_boxes = boxes.len(),
            "roster synced"
        );
        Ok(())
    }

    /// Most recent audit entries, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn audit_entries(&self, limit: u32) -> Result<Vec<AuditEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, level, kind, content, created_at FROM logs
                 ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    level: row.get(1)?,
                    kind: row.get(2)?,
                    content: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?;
            rows.collect()
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish_non_exhaustive()
    }
}

/// Delete rows of `table` whose id is not in `keep`.
fn prune(conn: &Connection, table: &str, keep: impl Iterator<Item = u32>) -> rusqlite::Result<()> {
    let keep: HashSet<u32> = keep.collect();
    let existing: Vec<u32> = {
        let mut stmt = conn.prepare(&format!("SELECT id FROM {table}"))?;
        let rows = stmt.query_map([], |row| row.get::<_, u32>(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    let mut delete = conn.prepare(&format!("DELETE FROM {table} WHERE id = ?1"))?;
    for id in existing.into_iter().filter(|id| !keep.contains(id)) {
        delete.execute(params![id])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Roster;

    fn roster() -> (Vec<Team>, Vec<Challenge>, Vec<GameBox>) {
        let teams = ["red", "blue"]
            .into_iter()
            .zip(1..)
            .map(|(name, id)| Team {
                id,
                name: name.into(),
                token: format!("tok-{name}"),
            })
            .collect();
        let challenges = vec![Challenge {
            id: 1,
            title: "web".into(),
            auto_refresh_flag: true,
            command: "echo {{FLAG}}".into(),
        }];
        let boxes = (1..=2)
            .map(|id| GameBox {
                id,
                team_id: id,
                challenge_id: 1,
                address: format!("10.0.{id}.2"),
                port: 80,
                visible: true,
                is_attacked: false,
                is_down: false,
            })
            .collect();
        (teams, challenges, boxes)
    }

    #[test]
    fn sync_preserves_box_status() {
        let db = Database::open_memory().unwrap();
        let (teams, challenges, mut boxes) = roster();
        db.sync_roster(&teams, &challenges, &boxes).unwrap();
        db.mark_attacked(2).unwrap();

        boxes[1].address = "10.0.2.9".into();
        db.sync_roster(&teams, &challenges, &boxes).unwrap();

        let synced = db.game_box(2).unwrap().unwrap();
        assert!(synced.is_attacked);
        assert_eq!(synced.address, "10.0.2.9");
    }

    #[test]
    fn sync_prunes_removed_rows() {
        let db = Database::open_memory().unwrap();
        let (teams, challenges, boxes) = roster();
        db.sync_roster(&teams, &challenges, &boxes).unwrap();
        db.sync_roster(&teams, &challenges, &boxes[..1]).unwrap();
        assert_eq!(db.game_boxes().unwrap().len(), 1);
    }

    #[test]
    fn open_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bastion.db");
        let db = Database::open(&path).unwrap();
        assert_eq!(db.path(), Some(path.as_path()));
        assert!(path.exists());
    }
}
