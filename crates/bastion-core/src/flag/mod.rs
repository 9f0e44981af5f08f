//! Flag lifecycle: generation, storage, submission and re-planting.

mod generator;
pub mod renew;
mod store;
mod vault;

pub use generator::FlagGenerator;
pub use store::{FlagQuery, FlagStore, MemoryFlagStore};
pub use vault::{FlagVault, GenerationSummary, SubmitOutcome};

use serde::{Deserialize, Serialize};

use crate::game::{ChallengeId, GameBoxId, TeamId};

/// The flag planted on one game box for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRecord {
    /// Owner of the vulnerable box.
    pub team_id: TeamId,
    pub game_box_id: GameBoxId,
    pub challenge_id: ChallengeId,
    pub round: u32,
    pub value: String,
}
