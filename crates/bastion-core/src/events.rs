use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::{ChallengeId, GameBoxId, TeamId};

/// Every notification the core hands to a [`NotifyPort`](crate::ports::NotifyPort).
/// Webhook, visualisation and live-log sinks all consume the same events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    CompetitionBegan {
        at: DateTime<Utc>,
    },
    RoundBegan {
        round: u32,
        at: DateTime<Utc>,
    },
    CompetitionPaused {
        at: DateTime<Utc>,
    },
    CompetitionEnded {
        total_rounds: u32,
        at: DateTime<Utc>,
    },
    FlagSubmitted {
        round: u32,
        attacker_team_id: TeamId,
        victim_team_id: TeamId,
        game_box_id: GameBoxId,
        challenge_id: ChallengeId,
        at: DateTime<Utc>,
    },
    FlagsGenerated {
        count: usize,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::CompetitionBegan { .. } => "competition_began",
            Event::RoundBegan { .. } => "round_began",
            Event::CompetitionPaused { .. } => "competition_paused",
            Event::CompetitionEnded { .. } => "competition_ended",
            Event::FlagSubmitted { .. } => "flag_submitted",
            Event::FlagsGenerated { .. } => "flags_generated",
        }
    }
}
