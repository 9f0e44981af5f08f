//! # Bastion Core Library
//!
//! Competition clock and flag lifecycle for attack-defense CTF platforms.
//! The CLI binary is a thin layer over this library.
//!
//! ## Architecture
//!
//! - **Clock**: run intervals derived once from the schedule; a tick loop
//!   samples the wall clock, publishes state and dispatches transition effects
//! - **Flags**: HMAC flag generation, an in-memory index swapped on
//!   regeneration, and the submission pipeline
//! - **Ledger**: atomic insert-if-absent record of credited attacks
//! - **Storage**: SQLite persistence and TOML configuration
//! - **Ports**: the outbound collaborators (scoring, ranking, planting,
//!   notification, audit)
//!
//! ## Key Components
//!
//! - [`ClockEngine`]: clock state machine
//! - [`ClockRunner`]: tick loop and effect dispatch
//! - [`FlagVault`]: flag index and submission
//! - [`Database`]: SQLite-backed stores
//! - [`Config`]: competition configuration

pub mod error;
pub mod events;
pub mod flag;
pub mod game;
pub mod ledger;
pub mod ports;
pub mod storage;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError, ScheduleError};
pub use events::Event;
pub use flag::{FlagGenerator, FlagQuery, FlagRecord, FlagStore, FlagVault, SubmitOutcome};
pub use game::{Challenge, GameBox, Roster, Team};
pub use ledger::{AttackLedger, AttackRecord};
pub use ports::Ports;
pub use storage::{Config, Database};
pub use timer::{
    ClockEngine, ClockHandle, ClockRunner, ClockState, ClockStatus, CompetitionSchedule,
    TimeReport,
};
