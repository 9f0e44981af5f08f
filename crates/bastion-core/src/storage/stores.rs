//! Seam implementations for [`Database`].

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::Database;
use crate::error::Result;
use crate::flag::{FlagQuery, FlagRecord, FlagStore};
use crate::game::{Challenge, ChallengeId, GameBox, GameBoxId, Roster, Team};
use crate::ledger::{Append, AttackKey, AttackLedger, AttackRecord};
use crate::ports::{AuditLevel, AuditPort, ScorePort};

const FLAG_COLUMNS: &str = "team_id, game_box_id, challenge_id, round, value";
const BOX_COLUMNS: &str =
    "id, team_id, challenge_id, address, port, visible, is_attacked, is_down";

fn flag_from_row(row: &Row<'_>) -> rusqlite::Result<FlagRecord> {
    Ok(FlagRecord {
        team_id: row.get(0)?,
        game_box_id: row.get(1)?,
        challenge_id: row.get(2)?,
        round: row.get(3)?,
        value: row.get(4)?,
    })
}

fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
        token: row.get(2)?,
    })
}

fn box_from_row(row: &Row<'_>) -> rusqlite::Result<GameBox> {
    Ok(GameBox {
        id: row.get(0)?,
        team_id: row.get(1)?,
        challenge_id: row.get(2)?,
        address: row.get(3)?,
        port: row.get(4)?,
        visible: row.get(5)?,
        is_attacked: row.get(6)?,
        is_down: row.get(7)?,
    })
}

impl FlagStore for Database {
    fn replace_all(&self, flags: &[FlagRecord]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM flags", [])?;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO flags ({FLAG_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"
                ))?;
                for flag in flags {
                    stmt.execute(params![
                        flag.team_id,
                        flag.game_box_id,
                        flag.challenge_id,
                        flag.round,
                        flag.value
                    ])?;
                }
            }
            tx.commit()
        })
    }

    fn load_all(&self) -> Result<Vec<FlagRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FLAG_COLUMNS} FROM flags ORDER BY round, game_box_id"
            ))?;
            let rows = stmt.query_map([], flag_from_row)?;
            rows.collect()
        })
    }

    fn query(&self, query: &FlagQuery) -> Result<(Vec<FlagRecord>, u64)> {
        query.validate()?;
        const FILTER: &str = "(?1 IS NULL OR team_id = ?1)
            AND (?2 IS NULL OR challenge_id = ?2)
            AND (?3 IS NULL OR game_box_id = ?3)
            AND (?4 IS NULL OR round = ?4)";

        self.with_conn(|conn| {
            let total: u64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM flags WHERE {FILTER}"),
                params![query.team_id, query.challenge_id, query.game_box_id, query.round],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {FLAG_COLUMNS} FROM flags WHERE {FILTER}
                 ORDER BY round, game_box_id LIMIT ?5 OFFSET ?6"
            ))?;
            let rows = stmt.query_map(
                params![
                    query.team_id,
                    query.challenge_id,
                    query.game_box_id,
                    query.round,
                    query.per_page,
                    query.offset() as i64
                ],
                flag_from_row,
            )?;
            let page = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((page, total))
        })
    }

    fn by_challenge(&self, challenge_id: ChallengeId) -> Result<Vec<FlagRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FLAG_COLUMNS} FROM flags WHERE challenge_id = ?1
                 ORDER BY round, game_box_id"
            ))?;
            let rows = stmt.query_map(params![challenge_id], flag_from_row)?;
            rows.collect()
        })
    }
}

impl AttackLedger for Database {
    fn exists(&self, key: &AttackKey) -> Result<bool> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM attack_actions
                 WHERE game_box_id = ?1 AND attacker_team_id = ?2 AND round = ?3)",
                params![key.game_box_id, key.attacker_team_id, key.round],
                |row| row.get(0),
            )
        })
    }

    fn append(&self, record: &AttackRecord) -> Result<Append> {
        let inserted = self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO attack_actions
                    (victim_team_id, game_box_id, attacker_team_id, challenge_id, round, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.victim_team_id,
                    record.game_box_id,
                    record.attacker_team_id,
                    record.challenge_id,
                    record.round,
                    Utc::now()
                ],
            )
        })?;
        Ok(if inserted == 1 {
            Append::Inserted
        } else {
            Append::AlreadyPresent
        })
    }
}

impl Roster for Database {
    fn team_by_token(&self, token: &str) -> Result<Option<Team>> {
        if token.is_empty() {
            return Ok(None);
        }
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, token FROM teams WHERE token = ?1",
                params![token],
                team_from_row,
            )
            .optional()
        })
    }

    fn challenges(&self) -> Result<Vec<Challenge>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, auto_refresh_flag, command FROM challenges ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Challenge {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    auto_refresh_flag: row.get(2)?,
                    command: row.get(3)?,
                })
            })?;
            rows.collect()
        })
    }

    fn game_boxes(&self) -> Result<Vec<GameBox>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {BOX_COLUMNS} FROM game_boxes ORDER BY id"))?;
            let rows = stmt.query_map([], box_from_row)?;
            rows.collect()
        })
    }

    fn game_box(&self, id: GameBoxId) -> Result<Option<GameBox>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {BOX_COLUMNS} FROM game_boxes WHERE id = ?1"),
                params![id],
                box_from_row,
            )
            .optional()
        })
    }

    fn mark_attacked(&self, id: GameBoxId) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE game_boxes SET is_attacked = 1 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
    }

    fn reset_status(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE game_boxes SET is_attacked = 0, is_down = 0", [])?;
            Ok(())
        })
    }

    fn game_boxes_of(&self, challenge_id: ChallengeId) -> Result<Vec<GameBox>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {BOX_COLUMNS} FROM game_boxes WHERE challenge_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![challenge_id], box_from_row)?;
            rows.collect()
        })
    }
}

impl ScorePort for Database {
    /// Marks the round settled. The score formula belongs to the deployment;
    /// this records that the round was handed over, once.
    fn calculate_round_score(&self, round: u32) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO scores (round, settled_at) VALUES (?1, ?2)",
                params![round, Utc::now()],
            )?;
            Ok(())
        })
    }

    fn latest_scored_round(&self) -> Result<Option<u32>> {
        self.with_conn(|conn| conn.query_row("SELECT MAX(round) FROM scores", [], |row| row.get(0)))
    }
}

impl AuditPort for Database {
    fn record(&self, level: AuditLevel, kind: &str, content: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO logs (level, kind, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![level.as_str(), kind, content, Utc::now()],
            )?;
            Ok(())
        })
    }
}
