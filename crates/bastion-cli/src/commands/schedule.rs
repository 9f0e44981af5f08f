use std::path::Path;

use bastion_core::timer::RunIntervals;
use serde_json::json;

pub fn run(config: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, schedule) = super::load_config(config)?;
    let intervals = RunIntervals::derive(&schedule);

    super::print_json(&json!({
        "begin_at": intervals.begin_at(),
        "end_at": intervals.end_at(),
        "round_duration": schedule.round_duration_min(),
        "total_rounds": intervals.total_rounds(),
        "total_run_secs": intervals.total_run_secs(),
        "runs": intervals.runs(),
        "pauses": intervals.pauses(),
    }))
}
