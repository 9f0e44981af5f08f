use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "bastion", version, about = "Bastion competition clock and flag service")]
struct Cli {
    /// Competition configuration file
    #[arg(long, global = true, default_value = "bastion.toml")]
    config: PathBuf,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the competition clock until Ctrl-C
    Serve,
    /// Print the current competition time as JSON
    Time,
    /// Print run intervals, merged pauses and round count
    Schedule,
    /// Flag management and submission
    Flag {
        #[command(subcommand)]
        action: commands::flag::FlagAction,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Serve => commands::serve::run(&cli.config),
        Commands::Time => commands::time::run(&cli.config),
        Commands::Schedule => commands::schedule::run(&cli.config),
        Commands::Flag { action } => commands::flag::run(&cli.config, action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
