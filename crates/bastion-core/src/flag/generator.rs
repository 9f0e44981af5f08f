//! Deterministic flag values.
//!
//! `value = prefix + hex(HMAC-SHA1(key = hex(SHA1(salt)), "team|box|round")) + suffix`
//!
//! The same salt and the same `(team, box, round)` always yield the same
//! value, so a regeneration with an unchanged roster is byte-identical.

use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};

use super::FlagRecord;
use crate::game::{GameBox, GameBoxId, TeamId};

type HmacSha1 = Hmac<Sha1>;

#[derive(Clone)]
pub struct FlagGenerator {
    prefix: String,
    suffix: String,
    key: Vec<u8>,
}

impl std::fmt::Debug for FlagGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagGenerator")
            .field("prefix", &self.prefix)
            .field("suffix", &self.suffix)
            .finish_non_exhaustive()
    }
}

impl FlagGenerator {
    pub fn new(salt: &str, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            key: derive_key(salt),
        }
    }

    pub fn value(&self, team_id: TeamId, game_box_id: GameBoxId, round: u32) -> String {
        let mut mac = HmacSha1::new_from_slice(&self.key).expect("HMAC can take keys of any size");
        mac.update(format!("{team_id}|{game_box_id}|{round}").as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());
        format!("{}{}{}", self.prefix, digest, self.suffix)
    }

    /// Every `(box, round)` pair for rounds `1..=total_rounds`.
    pub fn generate(&self, boxes: &[GameBox], total_rounds: u32) -> Vec<FlagRecord> {
        let mut flags = Vec::with_capacity(boxes.len() * total_rounds as usize);
        for round in 1..=total_rounds {
            for game_box in boxes {
                flags.push(FlagRecord {
                    team_id: game_box.team_id,
                    game_box_id: game_box.id,
                    challenge_id: game_box.challenge_id,
                    round,
                    value: self.value(game_box.team_id, game_box.id, round),
                });
            }
        }
        flags
    }
}

/// Hex SHA-1 of the salt, used as the HMAC key bytes.
fn derive_key(salt: &str) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize()).into_bytes()
}
