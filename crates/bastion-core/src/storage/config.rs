//! TOML-based competition configuration.
//!
//! Holds:
//! - Application settings (salt, database location)
//! - The competition window, round length, pauses and flag format
//! - The static roster of teams, challenges and game boxes
//! - The flag planter choice
//!
//! Configuration is read from `bastion.toml` unless another path is given.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::{ConfigError, CoreError, Result};
use crate::flag::FlagGenerator;
use crate::game::{Challenge, GameBox, Team};
use crate::timer::{CompetitionSchedule, Period};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Secret for flag derivation. Required.
    #[serde(default)]
    pub security_salt: String,
    /// SQLite file; defaults to `bastion.db` in the data directory.
    #[serde(default)]
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseConfig {
    pub start_at: String,
    pub end_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// RFC 3339 instant.
    pub start_at: String,
    /// RFC 3339 instant.
    pub end_at: String,
    /// Minutes per round.
    #[serde(default = "default_round_duration")]
    pub round_duration: u32,
    #[serde(default = "default_flag_prefix")]
    pub flag_prefix: String,
    #[serde(default = "default_flag_suffix")]
    pub flag_suffix: String,
    #[serde(default)]
    pub pause_time: Vec<PauseConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanterKind {
    #[default]
    Log,
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanterConfig {
    #[serde(default)]
    pub kind: PlanterKind,
    /// Shell used by the command planter.
    #[serde(default = "default_shell")]
    pub shell: String,
}

/// Competition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub game: GameConfig,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
    #[serde(default)]
    pub game_boxes: Vec<GameBox>,
    #[serde(default)]
    pub planter: PlanterConfig,
}

fn default_name() -> String {
    "Bastion".into()
}
fn default_round_duration() -> u32 {
    5
}
fn default_flag_prefix() -> String {
    "flag{".into()
}
fn default_flag_suffix() -> String {
    "}".into()
}
fn default_shell() -> String {
    "sh".into()
}

impl Default for PlanterConfig {
    fn default() -> Self {
        Self {
            kind: PlanterKind::default(),
            shell: default_shell(),
        }
    }
}

impl Config {
    /// Read, parse and validate the file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid TOML for
    /// this layout, or fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// # Errors
    /// Returns an error if the text does not parse or validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let cfg: Config =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check everything that does not need the schedule rules.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.security_salt.is_empty() {
            return Err(ConfigError::MissingKey("app.security_salt".into()));
        }
        if self.game.round_duration == 0 {
            return Err(invalid("game.round_duration", "must be at least 1 minute"));
        }

        let mut team_ids = HashSet::new();
        let mut tokens = HashSet::new();
        for team in &self.teams {
            if !team_ids.insert(team.id) {
                return Err(invalid("teams", format!("duplicate team id {}", team.id)));
            }
            if !team.token.is_empty() && !tokens.insert(team.token.as_str()) {
                return Err(invalid("teams", format!("team {} reuses a token", team.id)));
            }
        }

        let mut challenge_ids = HashSet::new();
        for challenge in &self.challenges {
            if !challenge_ids.insert(challenge.id) {
                return Err(invalid(
                    "challenges",
                    format!("duplicate challenge id {}", challenge.id),
                ));
            }
        }

        let mut box_ids = HashSet::new();
        let mut owned: HashMap<(u32, u32), u32> = HashMap::new();
        for game_box in &self.game_boxes {
            if !box_ids.insert(game_box.id) {
                return Err(invalid(
                    "game_boxes",
                    format!("duplicate game box id {}", game_box.id),
                ));
            }
            if !team_ids.contains(&game_box.team_id) {
                return Err(invalid(
                    "game_boxes",
                    format!(
                        "game box {} references unknown team {}",
                        game_box.id, game_box.team_id
                    ),
                ));
            }
            if !challenge_ids.contains(&game_box.challenge_id) {
                return Err(invalid(
                    "game_boxes",
                    format!(
                        "game box {} references unknown challenge {}",
                        game_box.id, game_box.challenge_id
                    ),
                ));
            }
            let slot = (game_box.team_id, game_box.challenge_id);
            if let Some(other) = owned.insert(slot, game_box.id) {
                return Err(invalid(
                    "game_boxes",
                    format!(
                        "team {} has two game boxes ({other} and {}) for challenge {}",
                        game_box.team_id, game_box.id, game_box.challenge_id
                    ),
                ));
            }
        }

        Ok(())
    }

    /// The validated competition schedule.
    ///
    /// # Errors
    /// Fails on unparseable instants or any schedule rule violation.
    pub fn schedule(&self) -> Result<CompetitionSchedule> {
        let begin = parse_instant("game.start_at", &self.game.start_at)?;
        let end = parse_instant("game.end_at", &self.game.end_at)?;
        let pauses = self
            .game
            .pause_time
            .iter()
            .enumerate()
            .map(|(i, p)| {
                Ok(Period::new(
                    parse_instant(&format!("game.pause_time[{i}].start_at"), &p.start_at)?,
                    parse_instant(&format!("game.pause_time[{i}].end_at"), &p.end_at)?,
                ))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(CompetitionSchedule::new(begin, end, self.game.round_duration, pauses)?)
    }

    pub fn generator(&self) -> FlagGenerator {
        FlagGenerator::new(
            &self.app.security_salt,
            self.game.flag_prefix.clone(),
            self.game.flag_suffix.clone(),
        )
    }

    /// Configured database path, or `bastion.db` in the data directory.
    ///
    /// # Errors
    /// Fails only when the data directory cannot be created.
    pub fn database_path(&self) -> Result<PathBuf, CoreError> {
        match &self.app.database {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("bastion.db")),
        }
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        message: message.into(),
    }
}

fn parse_instant(key: &str, value: &str) -> Result<DateTime<Utc>, ConfigError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| invalid(key, format!("'{value}' is not an RFC 3339 instant: {e}")))
}
