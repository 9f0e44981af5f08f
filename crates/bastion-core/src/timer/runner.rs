//! Tick loop driving the [`ClockEngine`].
//!
//! Each tick samples the wall clock once, publishes the new state and spawns
//! the side effects of every transition it crossed. Effects run on the task
//! set and never hold up the next tick; port calls go to blocking workers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::clock::WallClock;
use super::engine::{ClockEngine, ClockHandle, Observation, Transition};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::flag::{renew, FlagVault};
use crate::ports::{AuditLevel, Ports};

/// Default tick period.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

pub struct ClockRunner {
    engine: ClockEngine,
    clock: Arc<dyn WallClock>,
    effects: Effects,
    period: Duration,
    tasks: JoinSet<()>,
}

impl ClockRunner {
    pub fn new(
        engine: ClockEngine,
        clock: Arc<dyn WallClock>,
        vault: Arc<FlagVault>,
        ports: Ports,
    ) -> Self {
        let effects = Effects { ports, vault };
        Self {
            engine,
            clock,
            effects,
            period: TICK_PERIOD,
            tasks: JoinSet::new(),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn handle(&self) -> ClockHandle {
        self.engine.handle()
    }

    /// Run one tick. Must be called from within a Tokio runtime.
    pub fn tick(&mut self) -> Observation {
        self.reap();

        let now = self.clock.now();
        let observation = self.engine.observe(now);
        for transition in &observation.transitions {
            debug!(?transition, status = ?observation.state.status, "clock transition");
            let effects = self.effects.clone();
            self.tasks.spawn(effects.apply(*transition, now));
        }
        observation
    }

    /// Wait for every spawned effect to finish.
    pub async fn drain(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "clock effect task failed");
            }
        }
    }

    /// Tick every period until `shutdown` flips to `true` or its sender is
    /// dropped, then wait for in-flight effects.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            total_rounds = self.engine.total_rounds(),
            period_ms = self.period.as_millis() as u64,
            "clock started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("clock stopping");
        self.drain().await;
    }

    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "clock effect task failed");
            }
        }
    }
}

#[derive(Clone)]
struct Effects {
    ports: Ports,
    vault: Arc<FlagVault>,
}

impl Effects {
    async fn apply(self, transition: Transition, at: DateTime<Utc>) {
        match transition {
            Transition::Opened => self.opened().await,
            Transition::Paused => self.paused(at).await,
            Transition::RoundBegan { round } => self.round_began(round, at).await,
            Transition::Ended { total_rounds } => self.ended(total_rounds, at).await,
        }
    }

    async fn opened(self) {
        let ports = self.ports;
        blocking("refresh rank", move || {
            ports.rank.refresh_title()?;
            ports.rank.refresh_list()
        })
        .await;
    }

    async fn paused(self, at: DateTime<Utc>) {
        info!("competition paused");
        let ports = self.ports;
        blocking("notify pause", move || {
            ports.notifier.notify(&Event::CompetitionPaused { at });
            Ok(())
        })
        .await;
    }

    async fn round_began(self, round: u32, at: DateTime<Utc>) {
        info!(round, "round began");
        let ports = self.ports.clone();
        let vault = self.vault.clone();
        blocking("begin round", move || {
            if round == 1 {
                ports.notifier.notify(&Event::CompetitionBegan { at });
            }
            ports.notifier.notify(&Event::RoundBegan { round, at });
            if let Err(e) = ports.roster.reset_status() {
                error!(error = %e, round, "failed to reset game box status");
            }
            if let Err(e) = ports.rank.refresh_list() {
                error!(error = %e, round, "failed to refresh rank list");
            }
            settle_before(&ports, round);
            // Flags may have been regenerated by another process.
            if let Err(e) = vault.reload() {
                warn!(error = %e, round, "failed to reload flags, keeping the previous index");
            }
            Ok(())
        })
        .await;

        if let Err(e) = renew::renew_round(self.ports, self.vault, round).await {
            error!(error = %e, round, "failed to renew flags");
        }
    }

    async fn ended(self, total_rounds: u32, at: DateTime<Utc>) {
        info!(total_rounds, "competition ended");
        let ports = self.ports;
        blocking("end competition", move || {
            settle_before(&ports, total_rounds);
            if total_rounds > 0 {
                if let Err(e) = ports.score.calculate_round_score(total_rounds) {
                    error!(error = %e, round = total_rounds, "failed to score final round");
                }
            }
            ports.notifier.notify(&Event::CompetitionEnded { total_rounds, at });
            ports.audit(AuditLevel::Important, "system", "competition ended");
            Ok(())
        })
        .await;
    }
}

/// Score every finished round before `round` that has no persisted score,
/// oldest first. A failing round is logged and the next one still runs.
fn settle_before(ports: &Ports, round: u32) {
    let latest = match ports.score.latest_scored_round() {
        Ok(latest) => latest,
        Err(e) => {
            error!(error = %e, round, "failed to read latest scored round");
            return;
        }
    };
    let first = latest.map_or(1, |r| r.saturating_add(1));
    if first >= round {
        return;
    }
    if round - first > 1 {
        warn!(from = first, to = round - 1, "scoring missed rounds");
    }
    for missed in first..round {
        match ports.score.calculate_round_score(missed) {
            Ok(()) => debug!(round = missed, "round scored"),
            Err(e) => error!(error = %e, round = missed, "failed to score round"),
        }
    }
}

/// Run a blocking port call off the async workers and log its failure.
async fn blocking<F>(what: &'static str, f: F)
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    let outcome = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CoreError::port("worker", e.to_string()));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) | Err(e) => error!(error = %e, what, "clock effect failed"),
    }
}
