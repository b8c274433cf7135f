use clap::Subcommand;
use studyroom_core::SessionLedger;

use super::open_store;

#[derive(Subcommand)]
pub enum StatsCmd {
    /// Total closed study time per user, descending
    Leaderboard,
    /// Session history for one user, newest first
    User { user: String },
}

pub fn run(cmd: StatsCmd) -> Result<(), Box<dyn std::error::Error>> {
    let (db, _store, _cfg) = open_store()?;
    let ledger = SessionLedger::new(db);

    match cmd {
        StatsCmd::Leaderboard => {
            println!(
                "{}",
                serde_json::to_string_pretty(&ledger.totals_by_user()?)?
            );
        }
        StatsCmd::User { user } => {
            println!(
                "{}",
                serde_json::to_string_pretty(&ledger.sessions_for_user(&user)?)?
            );
        }
    }

    Ok(())
}
