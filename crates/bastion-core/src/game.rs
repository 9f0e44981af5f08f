//! Teams, challenges and game boxes.
//!
//! Managing the roster is not this crate's job. The core only needs the narrow
//! [`Roster`] view: resolve an attacker, find a box, flip the per-round status
//! flags.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub type TeamId = u32;
pub type ChallengeId = u32;
pub type GameBoxId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    /// Submission credential.
    #[serde(skip_serializing, default)]
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: ChallengeId,
    pub title: String,
    /// Plant a fresh flag on every box of this challenge each round.
    #[serde(default)]
    pub auto_refresh_flag: bool,
    /// Re-plant command template; see [`crate::flag::renew`].
    #[serde(default)]
    pub command: String,
}

/// One team's instance of one challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameBox {
    pub id: GameBoxId,
    pub team_id: TeamId,
    pub challenge_id: ChallengeId,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub is_attacked: bool,
    #[serde(default)]
    pub is_down: bool,
}

fn default_visible() -> bool {
    true
}

/// The roster as seen by the clock and the flag vault.
pub trait Roster: Send + Sync {
    fn team_by_token(&self, token: &str) -> Result<Option<Team>>;

    fn challenges(&self) -> Result<Vec<Challenge>>;

    fn game_boxes(&self) -> Result<Vec<GameBox>>;

    fn game_box(&self, id: GameBoxId) -> Result<Option<GameBox>>;

    /// Set `is_attacked` on a box. Setting it twice is harmless.
    fn mark_attacked(&self, id: GameBoxId) -> Result<()>;

    /// Clear `is_attacked` and `is_down` on every box for a new round.
    fn reset_status(&self) -> Result<()>;

    fn game_boxes_of(&self, challenge_id: ChallengeId) -> Result<Vec<GameBox>> {
        Ok(self
            .game_boxes()?
            .into_iter()
            .filter(|b| b.challenge_id == challenge_id)
            .collect())
    }
}

#[derive(Debug, Default)]
struct RosterTables {
    teams: BTreeMap<TeamId, Team>,
    challenges: BTreeMap<ChallengeId, Challenge>,
    boxes: BTreeMap<GameBoxId, GameBox>,
}

/// In-process roster, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryRoster {
    tables: Mutex<RosterTables>,
}

impl MemoryRoster {
    pub fn new(teams: Vec<Team>, challenges: Vec<Challenge>, boxes: Vec<GameBox>) -> Self {
        let tables = RosterTables {
            teams: teams.into_iter().map(|t| (t.id, t)).collect(),
            challenges: challenges.into_iter().map(|c| (c.id, c)).collect(),
            boxes: boxes.into_iter().map(|b| (b.id, b)).collect(),
        };
        Self {
            tables: Mutex::new(tables),
        }
    }

    pub fn set_visible(&self, id: GameBoxId, visible: bool) {
        if let Some(game_box) = self.lock().boxes.get_mut(&id) {
            game_box.visible = visible;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RosterTables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Roster for MemoryRoster {
    fn team_by_token(&self, token: &str) -> Result<Option<Team>> {
        if token.is_empty() {
            return Ok(None);
        }
        let inner = self.lock();
        Ok(inner.teams.values().find(|t| t.token == token).cloned())
    }

    fn challenges(&self) -> Result<Vec<Challenge>> {
        Ok(self.lock().challenges.values().cloned().collect())
    }

    fn game_boxes(&self) -> Result<Vec<GameBox>> {
        Ok(self.lock().boxes.values().cloned().collect())
    }

    fn game_box(&self, id: GameBoxId) -> Result<Option<GameBox>> {
        Ok(self.lock().boxes.get(&id).cloned())
    }

    fn mark_attacked(&self, id: GameBoxId) -> Result<()> {
        if let Some(game_box) = self.lock().boxes.get_mut(&id) {
            game_box.is_attacked = true;
        }
        Ok(())
    }

    fn reset_status(&self) -> Result<()> {
        for game_box in self.lock().boxes.values_mut() {
            game_box.is_attacked = false;
            game_box.is_down = false;
        }
        Ok(())
    }
}
