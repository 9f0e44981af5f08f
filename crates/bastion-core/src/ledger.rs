//! Attack ledger: the replay guard.
//!
//! One record per `(game box, attacker, round)`. The only write is an atomic
//! insert-if-absent, so two racing submissions for the same key can never both
//! be credited. There is no deletion path.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::game::{ChallengeId, GameBoxId, TeamId};

/// Uniqueness key of an attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttackKey {
    pub game_box_id: GameBoxId,
    pub attacker_team_id: TeamId,
    pub round: u32,
}

/// A credited flag submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackRecord {
    pub victim_team_id: TeamId,
    pub game_box_id: GameBoxId,
    pub attacker_team_id: TeamId,
    pub challenge_id: ChallengeId,
    pub round: u32,
}

impl AttackRecord {
    pub fn key(&self) -> AttackKey {
        AttackKey {
            game_box_id: self.game_box_id,
            attacker_team_id: self.attacker_team_id,
            round: self.round,
        }
    }
}

/// Result of [`AttackLedger::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Append {
    Inserted,
    /// A record with the same key already existed; nothing was written.
    AlreadyPresent,
}

pub trait AttackLedger: Send + Sync {
    fn exists(&self, key: &AttackKey) -> Result<bool>;

    /// Insert the record unless its key is already present. The check and the
    /// insert are one atomic step.
    fn append(&self, record: &AttackRecord) -> Result<Append>;
}

/// In-process ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<HashMap<AttackKey, AttackRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn records(&self) -> Vec<AttackRecord> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AttackKey, AttackRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AttackLedger for MemoryLedger {
    fn exists(&self, key: &AttackKey) -> Result<bool> {
        Ok(self.lock().contains_key(key))
    }

    fn append(&self, record: &AttackRecord) -> Result<Append> {
        use std::collections::hash_map::Entry;

        match self.lock().entry(record.key()) {
            Entry::Occupied(_) => Ok(Append::AlreadyPresent),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(Append::Inserted)
            }
        }
    }
}
