use std::path::Path;
use std::sync::Arc;

use bastion_core::timer::SystemClock;
use bastion_core::ClockRunner;
use tokio::sync::watch;
use tracing::{info, warn};

pub fn run(config: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = super::open(config)?;
    if ctx.vault.is_empty() {
        warn!("no flags stored; run `bastion flag generate` before the first round");
    }
    info!(
        name = %ctx.config.app.name,
        begin = %ctx.schedule.begin_at(),
        end = %ctx.schedule.end_at(),
        total_rounds = ctx.engine.total_rounds(),
        flags = ctx.vault.len(),
        "serving competition"
    );

    let runner = ClockRunner::new(ctx.engine, Arc::new(SystemClock), ctx.vault, ctx.ports);
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async move {
        let (shutdown, rx) = watch::channel(false);
        let clock = tokio::spawn(runner.run(rx));

        tokio::signal::ctrl_c().await?;
        info!("shutdown requested, waiting for in-flight effects");
        let _ = shutdown.send(true);
        clock.await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    info!("stopped");
    Ok(())
}
