mod clock;
mod engine;
mod runner;
mod schedule;

pub use clock::{ManualClock, SystemClock, WallClock};
pub use engine::{
    ClockEngine, ClockHandle, ClockState, ClockStatus, Observation, TimeReport, Transition,
};
pub use runner::{ClockRunner, TICK_PERIOD};
pub use schedule::{merge_pauses, CompetitionSchedule, Period, Position, RunIntervals};
