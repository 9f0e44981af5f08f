//! Property tests for run interval derivation and round numbering.

use bastion_core::timer::{merge_pauses, Period, Position, RunIntervals};
use bastion_core::{ClockEngine, CompetitionSchedule};
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 18, 9, 0, 0).unwrap()
}

/// A window of `window_secs` with pauses strictly inside it, in strictly
/// increasing start order. Pauses may overlap.
fn schedule_strategy() -> impl Strategy<Value = CompetitionSchedule> {
    (600i64..86_400, 1u32..30)
        .prop_flat_map(|(window_secs, round_min)| {
            let pause = (1..window_secs - 1, 1i64..7_200);
            (
                Just(window_secs),
                Just(round_min),
                prop::collection::vec(pause, 0..6),
            )
        })
        .prop_map(|(window_secs, round_min, raw)| {
            let mut starts: Vec<(i64, i64)> = raw
                .into_iter()
                .map(|(start, len)| (start, (start + len).min(window_secs - 1)))
                .filter(|(start, end)| start < end)
                .collect();
            starts.sort_by_key(|(start, _)| *start);
            starts.dedup_by_key(|(start, _)| *start);
            let pauses = starts
                .into_iter()
                .map(|(s, e)| Period::new(t0() + Duration::seconds(s), t0() + Duration::seconds(e)))
                .collect();
            CompetitionSchedule::new(t0(), t0() + Duration::seconds(window_secs), round_min, pauses)
                .unwrap()
        })
}

proptest! {
    #[test]
    fn runs_and_pauses_partition_the_window(schedule in schedule_strategy()) {
        let intervals = RunIntervals::derive(&schedule);
        let window = (schedule.end_at() - schedule.begin_at()).num_seconds();
        let paused: i64 = intervals.pauses().iter().map(Period::duration_secs).sum();

        prop_assert_eq!(intervals.total_run_secs() + paused, window);
        for pair in intervals.runs().windows(2) {
            prop_assert!(pair[0].end_at <= pair[1].start_at);
        }
        for run in intervals.runs() {
            prop_assert!(run.start_at < run.end_at);
        }
    }

    #[test]
    fn merge_is_idempotent(schedule in schedule_strategy()) {
        let once = merge_pauses(schedule.pauses());
        let twice = merge_pauses(&once);
        prop_assert_eq!(&once, &twice);
        for pair in once.windows(2) {
            prop_assert!(pair[0].end_at < pair[1].start_at);
        }
    }

    #[test]
    fn rounds_never_decrease(schedule in schedule_strategy(), step in 30i64..900) {
        let mut engine = ClockEngine::new(&schedule);
        let total = engine.total_rounds();
        let mut last = 0;
        let mut now = schedule.begin_at() - Duration::seconds(step);
        while now <= schedule.end_at() {
            let observation = engine.observe(now);
            if let Some(round) = observation.state.now_round {
                prop_assert!(round >= last);
                prop_assert!(round <= total + 1);
                last = round;
            }
            now += Duration::seconds(step);
        }
    }

    #[test]
    fn locate_agrees_with_runs(schedule in schedule_strategy(), offset in 0i64..86_400) {
        let intervals = RunIntervals::derive(&schedule);
        let at = schedule.begin_at() + Duration::seconds(offset);
        let in_run = intervals.runs().iter().any(|r| r.contains(at));
        match intervals.locate(at) {
            Position::Running { elapsed_secs } => {
                prop_assert!(in_run);
                prop_assert!(elapsed_secs < intervals.total_run_secs());
            }
            Position::Paused => prop_assert!(!in_run),
            Position::After => prop_assert!(at >= schedule.end_at()),
            Position::Before => prop_assert!(false, "offset is never negative"),
        }
    }
}
