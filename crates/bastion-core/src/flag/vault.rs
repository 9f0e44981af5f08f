//! Flag vault: the in-memory flag index and the submission pipeline.
//!
//! ## Submission order
//!
//! ```text
//! clock on? -> known value? -> adjacent round? -> current round? -> own flag?
//!           -> box visible? -> ledger insert-if-absent -> credit
//! ```
//!
//! The index is swapped as a whole on regeneration: a submission sees either
//! the complete old set or the complete new one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info};

use super::{FlagGenerator, FlagRecord, FlagStore};
use crate::error::Result;
use crate::events::Event;
use crate::game::{GameBoxId, TeamId};
use crate::ledger::{Append, AttackLedger, AttackRecord};
use crate::ports::{AuditLevel, Ports};
use crate::timer::ClockHandle;

/// Outcome of a flag submission. Every rejection is its own variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted(AttackRecord),
    /// The competition is not in the `on` state.
    NotRunning,
    /// The attacker credential matched no team.
    InvalidToken,
    /// The flag belongs to the previous or the next round.
    WrongRound,
    /// The flag is unknown, or from a round further away.
    WrongFlag,
    /// The attacker owns the box the flag came from.
    SelfSubmission,
    /// The box is hidden and cannot be attacked.
    HiddenTarget,
    /// Already credited for this box in this round.
    Repeat,
}

impl SubmitOutcome {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            SubmitOutcome::Accepted(_) => "accepted",
            SubmitOutcome::NotRunning => "not_running",
            SubmitOutcome::InvalidToken => "invalid_token",
            SubmitOutcome::WrongRound => "wrong_round",
            SubmitOutcome::WrongFlag => "wrong_flag",
            SubmitOutcome::SelfSubmission => "self_submission",
            SubmitOutcome::HiddenTarget => "hidden_target",
            SubmitOutcome::Repeat => "repeat",
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationSummary {
    pub count: usize,
    pub total_rounds: u32,
    pub game_boxes: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
struct FlagIndex {
    by_value: HashMap<String, FlagRecord>,
    by_slot: HashMap<(GameBoxId, u32), String>,
}

impl FlagIndex {
    fn build(flags: Vec<FlagRecord>) -> Self {
        let mut index = Self {
            by_value: HashMap::with_capacity(flags.len()),
            by_slot: HashMap::with_capacity(flags.len()),
        };
        for flag in flags {
            index
                .by_slot
                .insert((flag.game_box_id, flag.round), flag.value.clone());
            index.by_value.insert(flag.value.clone(), flag);
        }
        index
    }
}

pub struct FlagVault {
    clock: ClockHandle,
    generator: FlagGenerator,
    total_rounds: u32,
    store: Arc<dyn FlagStore>,
    ledger: Arc<dyn AttackLedger>,
    ports: Ports,
    index: RwLock<Arc<FlagIndex>>,
    regenerating: Mutex<()>,
}

impl FlagVault {
    /// Build a vault with an empty index. Call [`reload`](Self::reload) to
    /// pick up flags already in the store.
    pub fn new(
        clock: ClockHandle,
        generator: FlagGenerator,
        total_rounds: u32,
        store: Arc<dyn FlagStore>,
        ledger: Arc<dyn AttackLedger>,
        ports: Ports,
    ) -> Self {
        Self {
            clock,
            generator,
            total_rounds,
            store,
            ledger,
            ports,
            index: RwLock::new(Arc::new(FlagIndex::default())),
            regenerating: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn FlagStore> {
        &self.store
    }

    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    /// Number of flags currently indexed.
    pub fn len(&self) -> usize {
        self.current().by_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the index with the store's contents.
    ///
    /// # Errors
    /// Propagates store failures; the previous index stays in place.
    pub fn reload(&self) -> Result<usize> {
        let _exclusive = self.regenerating.lock().unwrap_or_else(|e| e.into_inner());
        let flags = self.store.load_all()?;
        let count = flags.len();
        self.swap(FlagIndex::build(flags));
        debug!(count, "flag index loaded");
        Ok(count)
    }

    /// Discard every flag and generate the full set for all boxes and rounds.
    ///
    /// # Errors
    /// Fails if the roster cannot be read or the store rejects the write. On
    /// failure neither the store nor the index changes.
    pub fn regenerate(&self) -> Result<GenerationSummary> {
        let _exclusive = self.regenerating.lock().unwrap_or_else(|e| e.into_inner());
        let started = Instant::now();

        let boxes = self.ports.roster.game_boxes()?;
        let flags = self.generator.generate(&boxes, self.total_rounds);
        self.store.replace_all(&flags)?;

        let summary = GenerationSummary {
            count: flags.len(),
            total_rounds: self.total_rounds,
            game_boxes: boxes.len(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        self.swap(FlagIndex::build(flags));

        info!(
            count = summary.count,
            rounds = summary.total_rounds,
            game_boxes = summary.game_boxes,
            elapsed_ms = summary.elapsed_ms,
            "flags regenerated"
        );
        self.ports.audit(
            AuditLevel::Warning,
            "system",
            &format!(
                "generated {} flags in {:.3}s",
                summary.count,
                summary.elapsed_ms as f64 / 1000.0
            ),
        );
        self.ports.notifier.notify(&Event::FlagsGenerated {
            count: summary.count,
            elapsed_ms: summary.elapsed_ms,
            at: Utc::now(),
        });

        Ok(summary)
    }

    /// The flag of one box for one round.
    pub fn flag_for(&self, game_box_id: GameBoxId, round: u32) -> Option<FlagRecord> {
        let index = self.current();
        let value = index.by_slot.get(&(game_box_id, round))?;
        index.by_value.get(value).cloned()
    }

    /// Resolve the attacker by credential, then [`submit`](Self::submit).
    ///
    /// # Errors
    /// Only storage or roster failures; rejections are `Ok`.
    pub fn submit_with_token(&self, token: &str, raw: &str) -> Result<SubmitOutcome> {
        if self.running_round().is_none() {
            return Ok(SubmitOutcome::NotRunning);
        }
        let token = token.trim();
        if token.is_empty() {
            return Ok(SubmitOutcome::InvalidToken);
        }
        match self.ports.roster.team_by_token(token)? {
            Some(team) => self.submit(team.id, raw),
            None => Ok(SubmitOutcome::InvalidToken),
        }
    }

    /// Validate a flag from `attacker` and credit the attack.
    ///
    /// # Errors
    /// Only storage or roster failures; rejections are `Ok`.
    pub fn submit(&self, attacker: TeamId, raw: &str) -> Result<SubmitOutcome> {
        let Some(now_round) = self.running_round() else {
            return Ok(SubmitOutcome::NotRunning);
        };

        let value = raw.trim();
        let index = self.current();
        let Some(flag) = index.by_value.get(value) else {
            debug!(attacker, round = now_round, "unknown flag");
            return Ok(SubmitOutcome::WrongFlag);
        };

        if flag.round + 1 == now_round || flag.round == now_round + 1 {
            debug!(
                attacker,
                round = now_round,
                flag_round = flag.round,
                "flag from adjacent round"
            );
            return Ok(SubmitOutcome::WrongRound);
        }
        if flag.round != now_round {
            return Ok(SubmitOutcome::WrongFlag);
        }
        if flag.team_id == attacker {
            info!(attacker, game_box = flag.game_box_id, "self submission rejected");
            return Ok(SubmitOutcome::SelfSubmission);
        }

        match self.ports.roster.game_box(flag.game_box_id)? {
            Some(game_box) if game_box.visible => {}
            _ => return Ok(SubmitOutcome::HiddenTarget),
        }

        let record = AttackRecord {
            victim_team_id: flag.team_id,
            game_box_id: flag.game_box_id,
            attacker_team_id: attacker,
            challenge_id: flag.challenge_id,
            round: flag.round,
        };
        if self.ledger.append(&record)? == Append::AlreadyPresent {
            debug!(
                attacker,
                game_box = record.game_box_id,
                round = record.round,
                "repeat submission"
            );
            return Ok(SubmitOutcome::Repeat);
        }

        self.credit(&record);
        Ok(SubmitOutcome::Accepted(record))
    }

    /// Effects of an accepted attack. The ledger entry is already written, so
    /// failures here are logged only.
    fn credit(&self, record: &AttackRecord) {
        if let Err(e) = self.ports.roster.mark_attacked(record.game_box_id) {
            error!(
                error = %e,
                game_box = record.game_box_id,
                round = record.round,
                "failed to mark game box attacked"
            );
        }
        if let Err(e) = self.ports.rank.refresh_list() {
            error!(error = %e, round = record.round, "failed to refresh rank list");
        }

        self.ports.notifier.notify(&Event::FlagSubmitted {
            round: record.round,
            attacker_team_id: record.attacker_team_id,
            victim_team_id: record.victim_team_id,
            game_box_id: record.game_box_id,
            challenge_id: record.challenge_id,
            at: Utc::now(),
        });
        info!(
            attacker = record.attacker_team_id,
            victim = record.victim_team_id,
            game_box = record.game_box_id,
            challenge = record.challenge_id,
            round = record.round,
            "flag accepted"
        );
    }

    fn running_round(&self) -> Option<u32> {
        let state = self.clock.snapshot();
        if state.is_running() {
            state.now_round
        } else {
            None
        }
    }

    fn current(&self) -> Arc<FlagIndex> {
        Arc::clone(&self.index.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn swap(&self, index: FlagIndex) {
        *self.index.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(index);
    }
}

impl std::fmt::Debug for FlagVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagVault")
            .field("total_rounds", &self.total_rounds)
            .field("flags", &self.len())
            .finish_non_exhaustive()
    }
}
