//! Flag persistence seam.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::FlagRecord;
use crate::error::{CoreError, Result};
use crate::game::{ChallengeId, GameBoxId, TeamId};

/// Listing filter and paging for the manager view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default)]
    pub team_id: Option<TeamId>,
    #[serde(default)]
    pub challenge_id: Option<ChallengeId>,
    #[serde(default)]
    pub game_box_id: Option<GameBoxId>,
    #[serde(default)]
    pub round: Option<u32>,
}

fn default_page() -> u32 {
    1
}
fn default_per_page() -> u32 {
    15
}

/// Upper bound (exclusive) on `per_page`.
pub const MAX_PER_PAGE: u32 = 100;

impl Default for FlagQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
            team_id: None,
            challenge_id: None,
            game_box_id: None,
            round: None,
        }
    }
}

impl FlagQuery {
    /// # Errors
    /// `page` must be at least 1 and `per_page` in `1..100`.
    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(CoreError::InvalidQuery("page starts at 1".into()));
        }
        if self.per_page == 0 || self.per_page >= MAX_PER_PAGE {
            return Err(CoreError::InvalidQuery(format!(
                "per_page must be between 1 and {}",
                MAX_PER_PAGE - 1
            )));
        }
        Ok(())
    }

    pub fn matches(&self, flag: &FlagRecord) -> bool {
        self.team_id.map_or(true, |id| flag.team_id == id)
            && self.challenge_id.map_or(true, |id| flag.challenge_id == id)
            && self.game_box_id.map_or(true, |id| flag.game_box_id == id)
            && self.round.map_or(true, |r| flag.round == r)
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.per_page as usize
    }
}

pub trait FlagStore: Send + Sync {
    /// Discard every stored flag and write `flags` in one transaction.
    fn replace_all(&self, flags: &[FlagRecord]) -> Result<()>;

    fn load_all(&self) -> Result<Vec<FlagRecord>>;

    /// One page of matching flags plus the total match count.
    fn query(&self, query: &FlagQuery) -> Result<(Vec<FlagRecord>, u64)>;

    fn by_challenge(&self, challenge_id: ChallengeId) -> Result<Vec<FlagRecord>>;
}

/// In-process flag store.
#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    flags: RwLock<Vec<FlagRecord>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<FlagRecord>> {
        self.flags.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl FlagStore for MemoryFlagStore {
    fn replace_all(&self, flags: &[FlagRecord]) -> Result<()> {
        *self.flags.write().unwrap_or_else(|e| e.into_inner()) = flags.to_vec();
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<FlagRecord>> {
        Ok(self.read().clone())
    }

    fn query(&self, query: &FlagQuery) -> Result<(Vec<FlagRecord>, u64)> {
        query.validate()?;
        let flags = self.read();
        let matching: Vec<&FlagRecord> = flags.iter().filter(|f| query.matches(f)).collect();
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.offset())
            .take(query.per_page as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    fn by_challenge(&self, challenge_id: ChallengeId) -> Result<Vec<FlagRecord>> {
        Ok(self
            .read()
            .iter()
            .filter(|f| f.challenge_id == challenge_id)
            .cloned()
            .collect())
    }
}
