//! Outbound collaborators of the clock and the flag vault.
//!
//! The core depends on these traits only; concrete implementations are handed
//! in through [`Ports`] when the process is composed. Implementations are
//! called from blocking worker threads and must bound their own latency: the
//! clock imposes no timeout.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::Result;
use crate::events::Event;
use crate::game::{ChallengeId, GameBoxId, Roster, TeamId};

pub trait ScorePort: Send + Sync {
    /// Recompute and persist every team's score for a finished round.
    /// Calling it twice for the same round must be harmless.
    fn calculate_round_score(&self, round: u32) -> Result<()>;

    /// Most recent round whose scores are persisted, if any.
    fn latest_scored_round(&self) -> Result<Option<u32>>;
}

pub trait RankPort: Send + Sync {
    fn refresh_title(&self) -> Result<()>;

    fn refresh_list(&self) -> Result<()>;
}

/// Everything a planter needs to put one round's flag on one box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantRequest {
    pub team_id: TeamId,
    pub game_box_id: GameBoxId,
    pub challenge_id: ChallengeId,
    pub round: u32,
    pub flag: String,
    /// Challenge command with placeholders already substituted.
    pub command: String,
}

pub trait FlagPlantPort: Send + Sync {
    fn plant(&self, request: &PlantRequest) -> Result<()>;
}

/// Fire-and-forget fan-out. Delivery is at most once.
pub trait NotifyPort: Send + Sync {
    fn notify(&self, event: &Event);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Normal,
    Warning,
    Important,
}

impl AuditLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditLevel::Normal => "normal",
            AuditLevel::Warning => "warning",
            AuditLevel::Important => "important",
        }
    }
}

pub trait AuditPort: Send + Sync {
    fn record(&self, level: AuditLevel, kind: &str, content: &str) -> Result<()>;
}

/// The full set of collaborators, cheap to clone into background tasks.
#[derive(Clone)]
pub struct Ports {
    pub roster: Arc<dyn Roster>,
    pub score: Arc<dyn ScorePort>,
    pub rank: Arc<dyn RankPort>,
    pub planter: Arc<dyn FlagPlantPort>,
    pub notifier: Arc<dyn NotifyPort>,
    pub audit: Arc<dyn AuditPort>,
}

impl Ports {
    /// Write an audit entry; a failing audit sink is logged, never raised.
    pub fn audit(&self, level: AuditLevel, kind: &str, content: &str) {
        if let Err(e) = self.audit.record(level, kind, content) {
            error!(error = %e, kind, "failed to write audit entry");
        }
    }
}

/// Writes events as structured log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotifyPort for LogNotifier {
    fn notify(&self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(payload) => info!(kind = event.kind(), %payload, "event"),
            Err(e) => error!(kind = event.kind(), error = %e, "failed to encode event"),
        }
    }
}

/// Delivers each event to every inner notifier.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn NotifyPort>>,
}

impl FanoutNotifier {
    pub fn new(sinks: Vec<Arc<dyn NotifyPort>>) -> Self {
        Self { sinks }
    }
}

impl NotifyPort for FanoutNotifier {
    fn notify(&self, event: &Event) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }
}

/// Rank display stand-in for deployments without a ranking frontend.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRank;

impl RankPort for LogRank {
    fn refresh_title(&self) -> Result<()> {
        info!("rank list title refreshed");
        Ok(())
    }

    fn refresh_list(&self) -> Result<()> {
        info!("rank list refreshed");
        Ok(())
    }
}

/// Audit sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAudit;

impl AuditPort for LogAudit {
    fn record(&self, level: AuditLevel, kind: &str, content: &str) -> Result<()> {
        info!(level = level.as_str(), kind, content, "audit");
        Ok(())
    }
}

/// Settled-round marker kept in memory. Only remembers which rounds were
/// scored; the scoring itself lives with the deployment.
#[derive(Debug, Default)]
pub struct MemoryScoreBook {
    rounds: Mutex<BTreeSet<u32>>,
}

impl MemoryScoreBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scored_rounds(&self) -> Vec<u32> {
        self.rounds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }
}

impl ScorePort for MemoryScoreBook {
    fn calculate_round_score(&self, round: u32) -> Result<()> {
        let mut rounds = self.rounds.lock().unwrap_or_else(|e| e.into_inner());
        if rounds.insert(round) {
            info!(round, "round scored");
        }
        Ok(())
    }

    fn latest_scored_round(&self) -> Result<Option<u32>> {
        Ok(self
            .rounds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .copied())
    }
}
