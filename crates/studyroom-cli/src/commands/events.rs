use clap::Subcommand;
use studyroom_core::EventLog;

use super::open_store;

#[derive(Subcommand)]
pub enum EventsCmd {
    /// Recent timer transitions for a room ("alice started the timer")
    List {
        #[arg(long)]
        room: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(cmd: EventsCmd) -> Result<(), Box<dyn std::error::Error>> {
    let (db, _store, _cfg) = open_store()?;
    let log = EventLog::new(db);

    match cmd {
        EventsCmd::List { room, limit } => {
            let events = log.timeline(&room, limit)?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
    }

    Ok(())
}
