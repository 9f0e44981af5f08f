//! Tick loop tests driven by a manual clock.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bastion_core::events::Event;
use bastion_core::ports::AuditLevel;
use bastion_core::timer::{ClockStatus, ManualClock};
use bastion_core::{ClockEngine, ClockRunner, Roster};
use common::{at, box_id, schedule, Fixture, RecordingPlanter};
use tokio::sync::watch;

fn runner(fixture: &Fixture, clock: &Arc<ManualClock>) -> ClockRunner {
    let engine = ClockEngine::new(&schedule());
    let vault = fixture.vault(&engine);
    ClockRunner::new(engine, clock.clone(), vault, fixture.ports())
}

#[tokio::test]
async fn test_first_round_effects() {
    let fixture = Fixture::new();
    let clock = Arc::new(ManualClock::new(at(-1, 0)));
    let mut runner = runner(&fixture, &clock);

    let waiting = runner.tick();
    assert_eq!(waiting.state.status, ClockStatus::Wait);
    runner.drain().await;
    assert_eq!(fixture.rank.titles(), 1);

    clock.set(at(0, 0));
    let opened = runner.tick();
    assert_eq!(opened.state.status, ClockStatus::On);
    assert_eq!(opened.state.now_round, Some(1));
    runner.drain().await;

    let kinds: Vec<&str> = fixture.notifier.events().iter().map(Event::kind).collect();
    assert!(kinds.contains(&"competition_began"));
    assert!(kinds.contains(&"round_began"));
    assert_eq!(fixture.rank.titles(), 2);
    assert!(fixture.score.scored().is_empty());

    let planted = fixture.planter.planted();
    assert_eq!(planted.len(), 3);
    assert!(planted.iter().all(|r| r.challenge_id == 1 && r.round == 1));
    let first = &planted[0];
    assert_eq!(first.game_box_id, box_id(1, 1));
    assert_eq!(first.command, format!("plant {} 10.0.1.1:9001", first.flag));
}

#[tokio::test]
async fn test_round_start_resets_box_status() {
    let fixture = Fixture::new();
    let clock = Arc::new(ManualClock::new(at(5, 0)));
    let mut runner = runner(&fixture, &clock);

    runner.tick();
    runner.drain().await;
    fixture.roster.mark_attacked(box_id(2, 1)).unwrap();

    clock.set(at(12, 0));
    runner.tick();
    runner.drain().await;

    assert!(!fixture.roster.game_box(box_id(2, 1)).unwrap().unwrap().is_attacked);
    assert_eq!(fixture.score.scored(), vec![1]);
}

#[tokio::test]
async fn test_recovery_scores_missed_rounds() {
    // Restart at 09:45 (round 4) with only round 1 settled.
    let fixture = Fixture::with_parts(Some(1), RecordingPlanter::default());
    let clock = Arc::new(ManualClock::new(at(45, 0)));
    let mut runner = runner(&fixture, &clock);

    let observation = runner.tick();
    assert_eq!(observation.state.now_round, Some(4));
    runner.drain().await;

    assert_eq!(fixture.score.scored(), vec![2, 3]);
    assert_eq!(fixture.notifier.count("competition_began"), 0);
    assert_eq!(fixture.notifier.count("round_began"), 1);
}

#[tokio::test]
async fn test_pause_notified_once() {
    let fixture = Fixture::new();
    let clock = Arc::new(ManualClock::new(at(15, 0)));
    let mut runner = runner(&fixture, &clock);

    runner.tick();
    for second in [0, 1, 30] {
        clock.set(at(22, second));
        assert_eq!(runner.tick().state.status, ClockStatus::Pause);
    }
    runner.drain().await;
    assert_eq!(fixture.notifier.count("competition_paused"), 1);

    clock.set(at(30, 0));
    let resumed = runner.tick();
    assert_eq!(resumed.state.status, ClockStatus::On);
    assert_eq!(resumed.state.now_round, Some(2));
    runner.drain().await;
    assert_eq!(fixture.notifier.count("round_began"), 1);
}

#[tokio::test]
async fn test_end_settles_final_round_once() {
    let fixture = Fixture::new();
    let clock = Arc::new(ManualClock::new(at(55, 0)));
    let mut runner = runner(&fixture, &clock);

    runner.tick();
    runner.drain().await;

    clock.set(at(60, 0));
    assert_eq!(runner.tick().state.status, ClockStatus::End);
    clock.set(at(61, 0));
    assert!(runner.tick().transitions.is_empty());
    runner.drain().await;

    assert_eq!(fixture.score.scored(), vec![1, 2, 3, 4, 5]);
    assert_eq!(fixture.notifier.count("competition_ended"), 1);
    let important = fixture.audit.at_level(AuditLevel::Important);
    assert_eq!(important, vec!["competition ended".to_string()]);
    match fixture.notifier.events().last() {
        Some(Event::CompetitionEnded { total_rounds, .. }) => assert_eq!(*total_rounds, 5),
        other => panic!("expected end event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_plant_failure_is_isolated() {
    let fixture = Fixture::with_parts(None, RecordingPlanter::failing_on([box_id(2, 1)]));
    let clock = Arc::new(ManualClock::new(at(1, 0)));
    let mut runner = runner(&fixture, &clock);

    runner.tick();
    runner.drain().await;

    let planted: Vec<u32> = fixture
        .planter
        .planted()
        .iter()
        .map(|r| r.game_box_id)
        .collect();
    assert_eq!(planted, vec![box_id(1, 1), box_id(3, 1)]);
    let important = fixture.audit.at_level(AuditLevel::Important);
    assert_eq!(important.len(), 1);
    assert!(important[0].contains(&format!("game box {}", box_id(2, 1))));
    assert!(important[0].contains("round 1"));
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let fixture = Fixture::new();
    let clock = Arc::new(ManualClock::new(at(5, 0)));
    let runner = runner(&fixture, &clock).with_period(Duration::from_millis(10));
    let handle = runner.handle();

    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(runner.run(rx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("runner did not stop")
        .unwrap();

    let state = handle.snapshot();
    assert_eq!(state.status, ClockStatus::On);
    assert_eq!(state.now_round, Some(1));
    assert_eq!(fixture.notifier.count("round_began"), 1);
    assert_eq!(fixture.planter.planted().len(), 3);
}
