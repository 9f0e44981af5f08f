//! Competition clock state machine.
//!
//! The engine turns a wall-clock sample into a [`ClockState`]. It does not use
//! internal threads: the tick loop in [`runner`](super::runner) calls
//! [`ClockEngine::observe`] once per tick and dispatches the returned
//! transitions.
//!
//! ## State Transitions
//!
//! ```text
//! Wait -> On <-> Pause -> End
//! ```
//!
//! Every observation is recomputed from the sample alone. The only state kept
//! between ticks is the highest round seen, the previous status and the
//! end latch.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::schedule::{CompetitionSchedule, Position, RunIntervals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockStatus {
    Wait,
    On,
    Pause,
    End,
}

/// One consistent reading of the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockState {
    pub status: ClockStatus,
    /// `None` until the first round begins.
    pub now_round: Option<u32>,
    /// Seconds left in the current round; only set while `On`.
    pub round_remain_secs: Option<i64>,
}

impl ClockState {
    pub const fn initial() -> Self {
        Self {
            status: ClockStatus::Wait,
            now_round: None,
            round_remain_secs: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ClockStatus::On
    }
}

impl Default for ClockState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Side effects owed by a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First observation of the process, or the competition opening.
    Opened,
    /// Entered a pause.
    Paused,
    /// The round counter increased.
    RoundBegan { round: u32 },
    /// The competition is over. Emitted once per engine.
    Ended { total_rounds: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub state: ClockState,
    pub transitions: Vec<Transition>,
}

/// Shared read handle on the published clock state.
///
/// The engine is the only writer. Readers always get the whole state in one
/// read, so a round number is never paired with a stale status.
#[derive(Debug, Clone, Default)]
pub struct ClockHandle {
    inner: Arc<RwLock<ClockState>>,
}

impl ClockHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ClockState {
        *self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, state: ClockState) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

/// Time query payload. Absent values use the `-1` sentinel on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeReport {
    pub begin_time: i64,
    pub end_time: i64,
    /// Round duration in minutes.
    pub duration: i64,
    pub total_rounds: u32,
    pub now_round: i64,
    pub now_time: i64,
    pub round_remain_time: i64,
    pub status: ClockStatus,
}

/// Core clock engine.
#[derive(Debug)]
pub struct ClockEngine {
    intervals: Arc<RunIntervals>,
    handle: ClockHandle,
    last_status: Option<ClockStatus>,
    now_round: Option<u32>,
    end_latched: bool,
}

impl ClockEngine {
    pub fn new(schedule: &CompetitionSchedule) -> Self {
        Self::from_intervals(Arc::new(RunIntervals::derive(schedule)))
    }

    pub fn from_intervals(intervals: Arc<RunIntervals>) -> Self {
        Self {
            intervals,
            handle: ClockHandle::new(),
            last_status: None,
            now_round: None,
            end_latched: false,
        }
    }

    pub fn handle(&self) -> ClockHandle {
        self.handle.clone()
    }

    pub fn intervals(&self) -> &Arc<RunIntervals> {
        &self.intervals
    }

    pub fn total_rounds(&self) -> u32 {
        self.intervals.total_rounds()
    }

    /// Evaluate one wall-clock sample, publish the resulting state and return
    /// the transitions it crossed.
    pub fn observe(&mut self, now: DateTime<Utc>) -> Observation {
        let mut transitions = Vec::new();

        let state = match self.intervals.locate(now) {
            Position::Before => ClockState {
                status: ClockStatus::Wait,
                now_round: self.now_round,
                round_remain_secs: None,
            },
            Position::Paused => {
                if self.last_status != Some(ClockStatus::Pause) {
                    transitions.push(Transition::Paused);
                }
                ClockState {
                    status: ClockStatus::Pause,
                    now_round: self.now_round,
                    round_remain_secs: None,
                }
            }
            Position::Running { elapsed_secs } => {
                let round_secs = self.intervals.round_secs();
                let round = round_at(elapsed_secs, round_secs);
                if self.now_round.map_or(true, |seen| round > seen) {
                    self.now_round = Some(round);
                    transitions.push(Transition::RoundBegan { round });
                }
                let current = self.now_round.unwrap_or(round);
                ClockState {
                    status: ClockStatus::On,
                    now_round: Some(current),
                    round_remain_secs: Some(i64::from(current) * round_secs - elapsed_secs),
                }
            }
            Position::After => {
                if !self.end_latched {
                    self.end_latched = true;
                    transitions.push(Transition::Ended {
                        total_rounds: self.intervals.total_rounds(),
                    });
                }
                ClockState {
                    status: ClockStatus::End,
                    now_round: self.now_round,
                    round_remain_secs: None,
                }
            }
        };

        let opened = match self.last_status {
            None => true,
            Some(ClockStatus::Wait) => state.status == ClockStatus::On,
            Some(_) => false,
        };
        if opened {
            transitions.insert(0, Transition::Opened);
        }

        self.last_status = Some(state.status);
        self.handle.publish(state);

        Observation { state, transitions }
    }

    /// Time query built from the published state.
    pub fn report(&self, now: DateTime<Utc>) -> TimeReport {
        let state = self.handle.snapshot();
        TimeReport {
            begin_time: self.intervals.begin_at().timestamp(),
            end_time: self.intervals.end_at().timestamp(),
            duration: self.intervals.round_secs() / 60,
            total_rounds: self.intervals.total_rounds(),
            now_round: state.now_round.map_or(-1, i64::from),
            now_time: now.timestamp(),
            round_remain_time: state.round_remain_secs.unwrap_or(-1),
            status: state.status,
        }
    }
}

/// Ceiling of run time over round length. The first instant of the
/// competition already belongs to round 1.
fn round_at(elapsed_secs: i64, round_secs: i64) -> u32 {
    if round_secs <= 0 {
        return 1;
    }
    let round = (elapsed_secs.max(0) + round_secs - 1) / round_secs;
    u32::try_from(round.max(1)).unwrap_or(u32::MAX)
}
