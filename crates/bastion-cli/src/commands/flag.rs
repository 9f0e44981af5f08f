use std::path::Path;

use bastion_core::flag::{FlagQuery, FlagStore, SubmitOutcome};
use chrono::Utc;
use clap::Subcommand;
use serde_json::json;

#[derive(Subcommand)]
pub enum FlagAction {
    /// Discard all flags and generate every box's flag for every round
    Generate,
    /// List stored flags
    List {
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "15")]
        per_page: u32,
        /// Owner team
        #[arg(long)]
        team: Option<u32>,
        #[arg(long)]
        challenge: Option<u32>,
        #[arg(long)]
        game_box: Option<u32>,
        #[arg(long)]
        round: Option<u32>,
    },
    /// Export every flag of one challenge
    Export {
        #[arg(long)]
        challenge: u32,
    },
    /// Submit a flag as the team owning `token`
    Submit {
        #[arg(long)]
        token: String,
        #[arg(long)]
        flag: String,
    },
}

pub fn run(config: &Path, action: FlagAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut ctx = super::open(config)?;

    match action {
        FlagAction::Generate => {
            let summary = ctx.vault.regenerate()?;
            super::print_json(&summary)?;
        }
        FlagAction::List {
            page,
            per_page,
            team,
            challenge,
            game_box,
            round,
        } => {
            let query = FlagQuery {
                page,
                per_page,
                team_id: team,
                challenge_id: challenge,
                game_box_id: game_box,
                round,
            };
            let (flags, total) = ctx.db.query(&query)?;
            super::print_json(&json!({
                "page": page,
                "per_page": per_page,
                "total": total,
                "flags": flags,
            }))?;
        }
        FlagAction::Export { challenge } => {
            let flags = ctx.db.by_challenge(challenge)?;
            super::print_json(&flags)?;
        }
        FlagAction::Submit { token, flag } => {
            ctx.engine.observe(Utc::now());
            let outcome = ctx.vault.submit_with_token(&token, &flag)?;
            let record = match &outcome {
                SubmitOutcome::Accepted(record) => Some(record),
                _ => None,
            };
            super::print_json(&json!({
                "outcome": outcome.code(),
                "accepted": outcome.is_accepted(),
                "attack": record,
            }))?;
            if !outcome.is_accepted() {
                return Err(format!("submission rejected: {}", outcome.code()).into());
            }
        }
    }
    Ok(())
}
