//! Shared fixtures: a small roster, a schedule with one pause, and recording
//! fakes for every port.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bastion_core::error::{CoreError, Result};
use bastion_core::events::Event;
use bastion_core::flag::{FlagVault, MemoryFlagStore};
use bastion_core::game::{Challenge, GameBox, GameBoxId, MemoryRoster, Team};
use bastion_core::ledger::MemoryLedger;
use bastion_core::ports::{
    AuditLevel, AuditPort, FlagPlantPort, NotifyPort, PlantRequest, Ports, RankPort, ScorePort,
};
use bastion_core::{ClockEngine, CompetitionSchedule, FlagGenerator};
use chrono::{DateTime, Duration, TimeZone, Utc};

pub const SALT: &str = "integration-salt";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 18, 9, 0, 0).unwrap()
}

pub fn at(min: i64, sec: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(min) + Duration::seconds(sec)
}

/// 09:00 to 10:00, 10-minute rounds, paused 09:20 to 09:30. Five rounds.
pub fn schedule() -> CompetitionSchedule {
    CompetitionSchedule::new(
        t0(),
        at(60, 0),
        10,
        vec![bastion_core::timer::Period::new(at(20, 0), at(30, 0))],
    )
    .unwrap()
}

/// Box id of team `team` for challenge `challenge`.
pub fn box_id(team: u32, challenge: u32) -> GameBoxId {
    team * 10 + challenge
}

/// Three teams, two challenges (1 refreshes its flag every round), one box
/// per team per challenge.
pub fn roster() -> MemoryRoster {
    let teams = (1..=3)
        .map(|id| Team {
            id,
            name: format!("team-{id}"),
            token: format!("token-{id}"),
        })
        .collect();
    let challenges = vec![
        Challenge {
            id: 1,
            title: "pwn".into(),
            auto_refresh_flag: true,
            command: "plant {{FLAG}} {{IP}}:{{PORT}}".into(),
        },
        Challenge {
            id: 2,
            title: "web".into(),
            auto_refresh_flag: false,
            command: String::new(),
        },
    ];
    let boxes = (1..=3)
        .flat_map(|team| {
            (1..=2).map(move |challenge| GameBox {
                id: box_id(team, challenge),
                team_id: team,
                challenge_id: challenge,
                address: format!("10.0.{team}.{challenge}"),
                port: 9000 + challenge as u16,
                visible: true,
                is_attacked: false,
                is_down: false,
            })
        })
        .collect();
    MemoryRoster::new(teams, challenges, boxes)
}

// ============================================================================
// Recording ports
// ============================================================================

#[derive(Default)]
pub struct RecordingScore {
    latest: Mutex<Option<u32>>,
    scored: Mutex<Vec<u32>>,
}

impl RecordingScore {
    pub fn with_latest(latest: Option<u32>) -> Self {
        Self {
            latest: Mutex::new(latest),
            scored: Mutex::new(Vec::new()),
        }
    }

    pub fn scored(&self) -> Vec<u32> {
        self.scored.lock().unwrap().clone()
    }
}

impl ScorePort for RecordingScore {
    fn calculate_round_score(&self, round: u32) -> Result<()> {
        self.scored.lock().unwrap().push(round);
        let mut latest = self.latest.lock().unwrap();
        *latest = Some(latest.map_or(round, |r| r.max(round)));
        Ok(())
    }

    fn latest_scored_round(&self) -> Result<Option<u32>> {
        Ok(*self.latest.lock().unwrap())
    }
}

#[derive(Default)]
pub struct RecordingRank {
    pub titles: AtomicUsize,
    pub lists: AtomicUsize,
}

impl RecordingRank {
    pub fn titles(&self) -> usize {
        self.titles.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }
}

impl RankPort for RecordingRank {
    fn refresh_title(&self) -> Result<()> {
        self.titles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn refresh_list(&self) -> Result<()> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPlanter {
    planted: Mutex<Vec<PlantRequest>>,
    failing: HashSet<GameBoxId>,
}

impl RecordingPlanter {
    pub fn failing_on(boxes: impl IntoIterator<Item = GameBoxId>) -> Self {
        Self {
            planted: Mutex::new(Vec::new()),
            failing: boxes.into_iter().collect(),
        }
    }

    pub fn planted(&self) -> Vec<PlantRequest> {
        let mut planted = self.planted.lock().unwrap().clone();
        planted.sort_by_key(|r| (r.round, r.game_box_id));
        planted
    }
}

impl FlagPlantPort for RecordingPlanter {
    fn plant(&self, request: &PlantRequest) -> Result<()> {
        if self.failing.contains(&request.game_box_id) {
            return Err(CoreError::port("planter", "connection refused"));
        }
        self.planted.lock().unwrap().push(request.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }
}

impl NotifyPort for RecordingNotifier {
    fn notify(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[derive(Default)]
pub struct RecordingAudit {
    entries: Mutex<Vec<(AuditLevel, String, String)>>,
}

impl RecordingAudit {
    pub fn entries(&self) -> Vec<(AuditLevel, String, String)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn at_level(&self, level: AuditLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(l, _, _)| *l == level)
            .map(|(_, _, content)| content)
            .collect()
    }
}

impl AuditPort for RecordingAudit {
    fn record(&self, level: AuditLevel, kind: &str, content: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .push((level, kind.to_string(), content.to_string()));
        Ok(())
    }
}

// ============================================================================
// Fixture
// ============================================================================

pub struct Fixture {
    pub roster: Arc<MemoryRoster>,
    pub score: Arc<RecordingScore>,
    pub rank: Arc<RecordingRank>,
    pub planter: Arc<RecordingPlanter>,
    pub notifier: Arc<RecordingNotifier>,
    pub audit: Arc<RecordingAudit>,
    pub ledger: Arc<MemoryLedger>,
    pub store: Arc<MemoryFlagStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_parts(None, RecordingPlanter::default())
    }

    pub fn with_parts(latest_scored: Option<u32>, planter: RecordingPlanter) -> Self {
        Self {
            roster: Arc::new(roster()),
            score: Arc::new(RecordingScore::with_latest(latest_scored)),
            rank: Arc::new(RecordingRank::default()),
            planter: Arc::new(planter),
            notifier: Arc::new(RecordingNotifier::default()),
            audit: Arc::new(RecordingAudit::default()),
            ledger: Arc::new(MemoryLedger::new()),
            store: Arc::new(MemoryFlagStore::new()),
        }
    }

    pub fn ports(&self) -> Ports {
        Ports {
            roster: self.roster.clone(),
            score: self.score.clone(),
            rank: self.rank.clone(),
            planter: self.planter.clone(),
            notifier: self.notifier.clone(),
            audit: self.audit.clone(),
        }
    }

    /// A vault bound to `engine`'s clock with every flag generated.
    pub fn vault(&self, engine: &ClockEngine) -> Arc<FlagVault> {
        let vault = FlagVault::new(
            engine.handle(),
            FlagGenerator::new(SALT, "flag{", "}"),
            engine.total_rounds(),
            self.store.clone(),
            self.ledger.clone(),
            self.ports(),
        );
        vault.regenerate().unwrap();
        Arc::new(vault)
    }
}
