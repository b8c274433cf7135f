use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "studyroom-cli", version, about = "Studyroom CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Room timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerCmd,
    },
    /// Room membership management
    Room {
        #[command(subcommand)]
        action: commands::room::RoomCmd,
    },
    /// Study statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsCmd,
    },
    /// Timer event timeline
    Events {
        #[command(subcommand)]
        action: commands::events::EventsCmd,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigCmd,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action),
        Commands::Room { action } => commands::room::run(action),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Events { action } => commands::events::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
