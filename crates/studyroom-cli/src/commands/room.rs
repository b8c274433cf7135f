use clap::Subcommand;
use studyroom_core::RoomDirectory;

use super::{open_store, resolve_user};

#[derive(Subcommand)]
pub enum RoomCmd {
    /// Create a room (the creator joins automatically)
    Create {
        name: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Join a room
    Join {
        #[arg(long)]
        room: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Leave a room
    Leave {
        #[arg(long)]
        room: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// List room members
    Members {
        #[arg(long)]
        room: String,
    },
    /// List members currently studying
    Studying {
        #[arg(long)]
        room: String,
    },
}

pub fn run(cmd: RoomCmd) -> Result<(), Box<dyn std::error::Error>> {
    let (db, _store, cfg) = open_store()?;
    let rooms = RoomDirectory::new(db);

    match cmd {
        RoomCmd::Create { name, user } => {
            let user = resolve_user(user, &cfg)?;
            let room = rooms.create(&name, &user)?;
            println!("{}", serde_json::to_string_pretty(&room)?);
        }
        RoomCmd::Join { room, user } => {
            let user = resolve_user(user, &cfg)?;
            rooms.join(&room, &user)?;
            println!("{}", serde_json::to_string_pretty(&rooms.members(&room)?)?);
        }
        RoomCmd::Leave { room, user } => {
            let user = resolve_user(user, &cfg)?;
            rooms.leave(&room, &user)?;
            println!("{}", serde_json::json!({ "left": room }));
        }
        RoomCmd::Members { room } => {
            println!("{}", serde_json::to_string_pretty(&rooms.members(&room)?)?);
        }
        RoomCmd::Studying { room } => {
            println!(
                "{}",
                serde_json::to_string_pretty(&rooms.studying_now(&room)?)?
            );
        }
    }

    Ok(())
}
