pub mod flag;
pub mod schedule;
pub mod serve;
pub mod time;

use std::path::Path;
use std::sync::Arc;

use bastion_core::flag::renew::{CommandPlanter, LogPlanter};
use bastion_core::ports::{FanoutNotifier, FlagPlantPort, LogNotifier, LogRank, Ports};
use bastion_core::storage::PlanterKind;
use bastion_core::{ClockEngine, CompetitionSchedule, Config, Database, FlagVault};
use tracing::debug;

/// Everything a command needs, composed from one configuration file.
pub(crate) struct Context {
    pub config: Config,
    pub schedule: CompetitionSchedule,
    pub db: Arc<Database>,
    pub engine: ClockEngine,
    pub ports: Ports,
    pub vault: Arc<FlagVault>,
}

/// Load the configuration only.
pub(crate) fn load_config(
    path: &Path,
) -> Result<(Config, CompetitionSchedule), Box<dyn std::error::Error>> {
    let config = Config::load(path)?;
    let schedule = config.schedule()?;
    Ok((config, schedule))
}

/// Load the configuration, open storage, sync the roster and load flags.
pub(crate) fn open(path: &Path) -> Result<Context, Box<dyn std::error::Error>> {
    let (config, schedule) = load_config(path)?;

    let db = Arc::new(Database::open(config.database_path()?)?);
    db.sync_roster(&config.teams, &config.challenges, &config.game_boxes)?;

    let planter: Arc<dyn FlagPlantPort> = match config.planter.kind {
        PlanterKind::Log => Arc::new(LogPlanter),
        PlanterKind::Command => Arc::new(CommandPlanter::new(config.planter.shell.clone())),
    };
    let ports = Ports {
        roster: db.clone(),
        score: db.clone(),
        rank: Arc::new(LogRank),
        planter,
        notifier: Arc::new(FanoutNotifier::new(vec![Arc::new(LogNotifier)])),
        audit: db.clone(),
    };

    let engine = ClockEngine::new(&schedule);
    let vault = FlagVault::new(
        engine.handle(),
        config.generator(),
        engine.total_rounds(),
        db.clone(),
        db.clone(),
        ports.clone(),
    );
    let loaded = vault.reload()?;
    debug!(flags = loaded, "context ready");

    Ok(Context {
        config,
        schedule,
        db,
        engine,
        ports,
        vault: Arc::new(vault),
    })
}

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
