//! Per-round flag re-planting.
//!
//! Challenges with `auto_refresh_flag` get the current round's flag pushed to
//! every box at the start of each round. The challenge `command` is a template:
//!
//! | placeholder | replaced with        |
//! |-------------|----------------------|
//! | `{{FLAG}}`  | the round's flag     |
//! | `{{IP}}`    | the box address      |
//! | `{{PORT}}`  | the box service port |
//!
//! Each box is planted on its own blocking worker. One box failing never stops
//! the others.

use std::process::Command;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::FlagVault;
use crate::error::{CoreError, Result};
use crate::game::GameBox;
use crate::ports::{AuditLevel, FlagPlantPort, PlantRequest, Ports};

pub const FLAG_PLACEHOLDER: &str = "{{FLAG}}";
pub const IP_PLACEHOLDER: &str = "{{IP}}";
pub const PORT_PLACEHOLDER: &str = "{{PORT}}";

pub fn render_command(template: &str, flag: &str, game_box: &GameBox) -> String {
    template
        .replace(FLAG_PLACEHOLDER, flag)
        .replace(IP_PLACEHOLDER, &game_box.address)
        .replace(PORT_PLACEHOLDER, &game_box.port.to_string())
}

/// Planter that only logs the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPlanter;

impl FlagPlantPort for LogPlanter {
    fn plant(&self, request: &PlantRequest) -> Result<()> {
        info!(
            team = request.team_id,
            game_box = request.game_box_id,
            challenge = request.challenge_id,
            round = request.round,
            command = %request.command,
            "flag planted"
        );
        Ok(())
    }
}

/// Runs the rendered command through a shell. A non-zero exit is a failure.
#[derive(Debug, Clone)]
pub struct CommandPlanter {
    shell: String,
}

impl Default for CommandPlanter {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl CommandPlanter {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl FlagPlantPort for CommandPlanter {
    fn plant(&self, request: &PlantRequest) -> Result<()> {
        if request.command.trim().is_empty() {
            debug!(game_box = request.game_box_id, "empty plant command, skipped");
            return Ok(());
        }

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(&request.command)
            .output()
            .map_err(|e| {
                CoreError::port("planter", format!("failed to spawn {}: {e}", self.shell))
            })?;

        if output.status.success() {
            debug!(
                game_box = request.game_box_id,
                round = request.round,
                "plant command succeeded"
            );
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(CoreError::port(
                "planter",
                format!("command exited with {}: {}", output.status, stderr.trim()),
            ))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenewReport {
    pub planted: usize,
    pub failed: usize,
    /// Boxes with no flag for the round.
    pub skipped: usize,
}

/// Plant requests for every box of every auto-refresh challenge.
///
/// # Errors
/// Fails if the roster cannot be read.
pub fn plan_round(
    ports: &Ports,
    vault: &FlagVault,
    round: u32,
) -> Result<(Vec<PlantRequest>, usize)> {
    let mut requests = Vec::new();
    let mut skipped = 0;

    for challenge in ports.roster.challenges()? {
        if !challenge.auto_refresh_flag {
            continue;
        }
        for game_box in ports.roster.game_boxes_of(challenge.id)? {
            let Some(flag) = vault.flag_for(game_box.id, round) else {
                warn!(
                    game_box = game_box.id,
                    challenge = challenge.id,
                    round,
                    "no flag for game box, skipping plant"
                );
                skipped += 1;
                continue;
            };
            requests.push(PlantRequest {
                team_id: game_box.team_id,
                game_box_id: game_box.id,
                challenge_id: challenge.id,
                round,
                command: render_command(&challenge.command, &flag.value, &game_box),
                flag: flag.value,
            });
        }
    }

    Ok((requests, skipped))
}

/// Plant `round`'s flags on every auto-refresh box, one worker per box.
///
/// # Errors
/// Only if planning fails; individual plant failures are counted, logged and
/// audited.
pub async fn renew_round(ports: Ports, vault: Arc<FlagVault>, round: u32) -> Result<RenewReport> {
    let planner = ports.clone();
    let (requests, skipped) =
        tokio::task::spawn_blocking(move || plan_round(&planner, &vault, round))
            .await
            .map_err(|e| CoreError::port("planter", format!("planning task failed: {e}")))??;

    let mut workers = JoinSet::new();
    for request in requests {
        let ports = ports.clone();
        workers.spawn_blocking(move || plant_one(&ports, &request));
    }

    let mut report = RenewReport {
        skipped,
        ..RenewReport::default()
    };
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(true) => report.planted += 1,
            Ok(false) => report.failed += 1,
            Err(e) => {
                error!(error = %e, round, "plant worker panicked");
                report.failed += 1;
            }
        }
    }

    info!(
        round,
        planted = report.planted,
        failed = report.failed,
        skipped = report.skipped,
        "flags renewed"
    );
    Ok(report)
}

fn plant_one(ports: &Ports, request: &PlantRequest) -> bool {
    match ports.planter.plant(request) {
        Ok(()) => true,
        Err(e) => {
            error!(
                error = %e,
                team = request.team_id,
                game_box = request.game_box_id,
                challenge = request.challenge_id,
                round = request.round,
                "failed to plant flag"
            );
            ports.audit(
                AuditLevel::Important,
                "system",
                &format!(
                    "failed to plant flag on game box {} (team {}, challenge {}) for round {}: {e}",
                    request.game_box_id, request.team_id, request.challenge_id, request.round
                ),
            );
            false
        }
    }
}
