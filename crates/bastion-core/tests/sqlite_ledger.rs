//! File-backed SQLite: replay guard across connections, restart recovery and
//! flags generated by another process.

mod common;

use std::sync::{Arc, Barrier};

use bastion_core::flag::renew::LogPlanter;
use bastion_core::flag::{FlagVault, SubmitOutcome};
use bastion_core::game::{Challenge, GameBox, Team};
use bastion_core::ledger::{Append, AttackLedger, AttackRecord};
use bastion_core::ports::{AuditLevel, FlagPlantPort, LogNotifier, LogRank, Ports};
use bastion_core::timer::ManualClock;
use bastion_core::{ClockEngine, ClockRunner, Database, FlagGenerator, Roster};
use common::{at, schedule, RecordingPlanter, SALT};

fn record(attacker: u32) -> AttackRecord {
    AttackRecord {
        victim_team_id: 1,
        game_box_id: 11,
        attacker_team_id: attacker,
        challenge_id: 1,
        round: 3,
    }
}

#[test]
fn test_replay_guard_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bastion.db");
    let handles: Vec<Database> = (0..4).map(|_| Database::open(&path).unwrap()).collect();
    let barrier = Barrier::new(handles.len() * 2);

    let results: Vec<Append> = std::thread::scope(|s| {
        let workers: Vec<_> = handles
            .iter()
            .flat_map(|db| [db, db])
            .map(|db| {
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    db.append(&record(2)).unwrap()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| **r == Append::Inserted).count(), 1);
    assert!(handles[3].exists(&record(2).key()).unwrap());
    assert!(!handles[0].exists(&record(3).key()).unwrap());
}

fn roster() -> (Vec<Team>, Vec<Challenge>, Vec<GameBox>) {
    let teams = vec![
        Team {
            id: 1,
            name: "red".into(),
            token: "tok-red".into(),
        },
        Team {
            id: 2,
            name: "blue".into(),
            token: "tok-blue".into(),
        },
    ];
    let challenges = vec![Challenge {
        id: 1,
        title: "pwn".into(),
        auto_refresh_flag: false,
        command: String::new(),
    }];
    let boxes = [(11, 1), (21, 2)]
        .into_iter()
        .map(|(id, team_id)| GameBox {
            id,
            team_id,
            challenge_id: 1,
            address: format!("10.0.{team_id}.1"),
            port: 9001,
            visible: true,
            is_attacked: false,
            is_down: false,
        })
        .collect();
    (teams, challenges, boxes)
}

fn ports_over(db: &Arc<Database>, planter: Arc<dyn FlagPlantPort>) -> Ports {
    Ports {
        roster: db.clone(),
        score: db.clone(),
        rank: Arc::new(LogRank),
        planter,
        notifier: Arc::new(LogNotifier),
        audit: db.clone(),
    }
}

fn vault_with(db: &Arc<Database>, engine: &ClockEngine, ports: Ports) -> FlagVault {
    FlagVault::new(
        engine.handle(),
        FlagGenerator::new(SALT, "flag{", "}"),
        engine.total_rounds(),
        db.clone(),
        db.clone(),
        ports,
    )
}

fn vault_over(db: &Arc<Database>, engine: &ClockEngine) -> FlagVault {
    vault_with(db, engine, ports_over(db, Arc::new(LogPlanter)))
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bastion.db");
    let (teams, challenges, boxes) = roster();

    let value = {
        let db = Arc::new(Database::open(&path).unwrap());
        db.sync_roster(&teams, &challenges, &boxes).unwrap();
        let mut engine = ClockEngine::new(&schedule());
        let vault = vault_over(&db, &engine);
        assert_eq!(vault.regenerate().unwrap().count, 2 * 5);

        engine.observe(at(5, 0));
        let value = vault.flag_for(21, 1).unwrap().value;
        assert!(vault.submit_with_token("tok-red", &value).unwrap().is_accepted());
        value
    };

    let db = Arc::new(Database::open(&path).unwrap());
    let mut engine = ClockEngine::new(&schedule());
    let vault = vault_over(&db, &engine);
    assert!(vault.is_empty());
    assert_eq!(vault.reload().unwrap(), 10);
    assert_eq!(vault.flag_for(21, 1).unwrap().value, value);

    engine.observe(at(6, 0));
    assert_eq!(
        vault.submit_with_token("tok-red", &value).unwrap(),
        SubmitOutcome::Repeat
    );
    assert!(db.game_box(21).unwrap().unwrap().is_attacked);

    let audit = db.audit_entries(5).unwrap();
    assert!(audit.iter().any(|e| e.level == AuditLevel::Warning.as_str()));
}

#[tokio::test]
async fn test_round_renews_flags_generated_by_another_handle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bastion.db");
    let (teams, mut challenges, boxes) = roster();
    challenges[0].auto_refresh_flag = true;
    challenges[0].command = "plant {{FLAG}}".into();

    // The serving process starts before any flag exists.
    let serve_db = Arc::new(Database::open(&path).unwrap());
    serve_db.sync_roster(&teams, &challenges, &boxes).unwrap();
    let planter = Arc::new(RecordingPlanter::default());
    let engine = ClockEngine::new(&schedule());
    let serve_vault = Arc::new(vault_with(
        &serve_db,
        &engine,
        ports_over(&serve_db, planter.clone()),
    ));
    assert_eq!(serve_vault.reload().unwrap(), 0);

    // An operator generates them from a second connection.
    let operator_db = Arc::new(Database::open(&path).unwrap());
    let operator_engine = ClockEngine::new(&schedule());
    let operator = vault_over(&operator_db, &operator_engine);
    assert_eq!(operator.regenerate().unwrap().count, 2 * 5);
    let expected = operator.flag_for(21, 1).unwrap().value;

    let clock = Arc::new(ManualClock::new(at(5, 0)));
    let mut runner = ClockRunner::new(
        engine,
        clock,
        serve_vault.clone(),
        ports_over(&serve_db, planter.clone()),
    );
    runner.tick();
    runner.drain().await;

    let planted = planter.planted();
    assert_eq!(planted.len(), 2);
    assert_eq!(planted[1].game_box_id, 21);
    assert_eq!(planted[1].flag, expected);
    assert_eq!(planted[1].command, format!("plant {expected}"));
    assert_eq!(serve_vault.len(), 10);
}
