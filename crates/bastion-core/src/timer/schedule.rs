//! Competition schedule and run-interval derivation.
//!
//! A schedule is the competition window plus the configured pauses. From it we
//! derive the run intervals: the half-open spans `[start, end)` during which
//! the competition clock advances. Rounds are counted over run time only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// A span of wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl Period {
    pub fn new(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self { start_at, end_at }
    }

    /// Length in whole seconds.
    pub fn duration_secs(&self) -> i64 {
        self.end_at.timestamp() - self.start_at.timestamp()
    }

    /// Half-open membership: `start_at <= at < end_at`.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start_at <= at && at < self.end_at
    }
}

/// Validated competition schedule. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompetitionSchedule {
    begin_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    round_duration_min: u32,
    pauses: Vec<Period>,
}

impl CompetitionSchedule {
    /// Validate and build a schedule.
    ///
    /// # Errors
    /// Returns the first problem found: an inverted window, a zero round
    /// duration, or a pause that is inverted, not strictly inside the window,
    /// or out of start-time order.
    pub fn new(
        begin_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        round_duration_min: u32,
        pauses: Vec<Period>,
    ) -> Result<Self, ScheduleError> {
        if begin_at >= end_at {
            return Err(ScheduleError::InvertedWindow {
                begin: begin_at,
                end: end_at,
            });
        }
        if round_duration_min == 0 {
            return Err(ScheduleError::ZeroRoundDuration);
        }

        for (index, pause) in pauses.iter().enumerate() {
            if pause.start_at >= pause.end_at {
                return Err(ScheduleError::InvertedPause {
                    start: pause.start_at,
                    end: pause.end_at,
                });
            }
            if pause.start_at <= begin_at || pause.end_at >= end_at {
                return Err(ScheduleError::PauseOutsideWindow {
                    start: pause.start_at,
                    end: pause.end_at,
                });
            }
            if index > 0 && pause.start_at <= pauses[index - 1].start_at {
                return Err(ScheduleError::PauseOutOfOrder {
                    start: pause.start_at,
                    end: pause.end_at,
                });
            }
        }

        Ok(Self {
            begin_at,
            end_at,
            round_duration_min,
            pauses,
        })
    }

    pub fn begin_at(&self) -> DateTime<Utc> {
        self.begin_at
    }

    pub fn end_at(&self) -> DateTime<Utc> {
        self.end_at
    }

    pub fn round_duration_min(&self) -> u32 {
        self.round_duration_min
    }

    /// Round length in seconds.
    pub fn round_secs(&self) -> i64 {
        i64::from(self.round_duration_min) * 60
    }

    /// Pauses as configured, before merging.
    pub fn pauses(&self) -> &[Period] {
        &self.pauses
    }
}

/// Merge overlapping or touching pauses into disjoint, increasing spans.
///
/// Running the merge on its own output returns the output unchanged.
pub fn merge_pauses(pauses: &[Period]) -> Vec<Period> {
    let mut sorted = pauses.to_vec();
    sorted.sort_by_key(|p| p.start_at);

    let mut merged: Vec<Period> = Vec::with_capacity(sorted.len());
    for pause in sorted {
        match merged.last_mut() {
            Some(last) if last.end_at >= pause.start_at => {
                last.end_at = last.end_at.max(pause.end_at);
            }
            _ => merged.push(pause),
        }
    }
    merged
}

/// Where an instant falls relative to the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Before the competition window.
    Before,
    /// Inside a run interval; `elapsed_secs` is run time accumulated so far.
    Running { elapsed_secs: i64 },
    /// Inside the window but in no run interval.
    Paused,
    /// At or past the end of the window.
    After,
}

/// Run intervals derived once from a [`CompetitionSchedule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunIntervals {
    begin_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    round_secs: i64,
    pauses: Vec<Period>,
    runs: Vec<Period>,
}

impl RunIntervals {
    pub fn derive(schedule: &CompetitionSchedule) -> Self {
        Self::from_parts(
            schedule.begin_at(),
            schedule.end_at(),
            schedule.round_secs(),
            schedule.pauses(),
        )
    }

    /// Derive from raw parts. Pauses are merged first; the caller is
    /// responsible for keeping them inside `(begin_at, end_at)`.
    pub fn from_parts(
        begin_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        round_secs: i64,
        pauses: &[Period],
    ) -> Self {
        let pauses = merge_pauses(pauses);

        let mut runs = Vec::with_capacity(pauses.len() + 1);
        let mut cursor = begin_at;
        for pause in &pauses {
            runs.push(Period::new(cursor, pause.start_at));
            cursor = pause.end_at;
        }
        runs.push(Period::new(cursor, end_at));

        Self {
            begin_at,
            end_at,
            round_secs,
            pauses,
            runs,
        }
    }

    pub fn begin_at(&self) -> DateTime<Utc> {
        self.begin_at
    }

    pub fn end_at(&self) -> DateTime<Utc> {
        self.end_at
    }

    pub fn round_secs(&self) -> i64 {
        self.round_secs
    }

    pub fn runs(&self) -> &[Period] {
        &self.runs
    }

    /// Merged pauses.
    pub fn pauses(&self) -> &[Period] {
        &self.pauses
    }

    pub fn total_run_secs(&self) -> i64 {
        self.runs.iter().map(Period::duration_secs).sum()
    }

    /// Number of complete rounds that fit in the run time.
    pub fn total_rounds(&self) -> u32 {
        if self.round_secs <= 0 {
            return 0;
        }
        u32::try_from(self.total_run_secs() / self.round_secs).unwrap_or(u32::MAX)
    }

    pub fn locate(&self, at: DateTime<Utc>) -> Position {
        if at < self.begin_at {
            return Position::Before;
        }
        if at >= self.end_at {
            return Position::After;
        }

        let mut elapsed_secs = 0;
        for run in &self.runs {
            if run.contains(at) {
                elapsed_secs += at.timestamp() - run.start_at.timestamp();
                return Position::Running { elapsed_secs };
            }
            if run.end_at <= at {
                elapsed_secs += run.duration_secs();
            } else {
                break;
            }
        }
        Position::Paused
    }
}
