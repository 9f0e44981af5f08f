use std::path::Path;

use bastion_core::ClockEngine;
use chrono::Utc;

pub fn run(config: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, schedule) = super::load_config(config)?;
    let mut engine = ClockEngine::new(&schedule);
    let now = Utc::now();
    engine.observe(now);
    super::print_json(&engine.report(now))
}
