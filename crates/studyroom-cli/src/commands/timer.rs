use std::sync::Arc;
use std::time::Duration;

use clap::Subcommand;
use studyroom_core::{FixedIdentity, RoomTimerController};

use super::{open_store, resolve_user};

#[derive(Subcommand)]
pub enum TimerCmd {
    /// Start the room timer and open a study session
    Start {
        #[arg(long)]
        room: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Pause the room timer, closing the active session
    Pause {
        #[arg(long)]
        room: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Resume a paused room timer
    Resume {
        #[arg(long)]
        room: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Reset the room timer to idle
    Reset {
        #[arg(long)]
        room: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Print the current timer state as JSON
    Status {
        #[arg(long)]
        room: String,
    },
    /// Follow the room timer, printing display snapshots
    Watch {
        #[arg(long)]
        room: String,
        #[arg(long)]
        user: Option<String>,
    },
}

pub fn run(cmd: TimerCmd) -> Result<(), Box<dyn std::error::Error>> {
    let (_db, store, cfg) = open_store()?;

    match cmd {
        TimerCmd::Start { room, user } => {
            let user = resolve_user(user, &cfg)?;
            let state = store.start(&room, &user)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        TimerCmd::Pause { room, user } => {
            let user = resolve_user(user, &cfg)?;
            let state = store.pause(&room, &user)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        TimerCmd::Resume { room, user } => {
            let user = resolve_user(user, &cfg)?;
            let state = store.resume(&room, &user)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        TimerCmd::Reset { room, user } => {
            let user = resolve_user(user, &cfg)?;
            let state = store.reset(&room, &user)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        TimerCmd::Status { room } => {
            let state = store.get_state(&room)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        TimerCmd::Watch { room, user } => {
            let user = resolve_user(user, &cfg)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(watch(store, room, user, &cfg))?;
        }
    }

    Ok(())
}

/// Attach a controller and print every display change. Other processes commit
/// to the same database file without reaching our in-process notifier, so a
/// periodic forced resync picks their transitions up.
async fn watch(
    store: studyroom_core::TimerStore,
    room: String,
    user: String,
    cfg: &studyroom_core::StudyroomConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let controller = RoomTimerController::attach(
        store,
        Arc::new(FixedIdentity::new(user)),
        room,
        Duration::from_millis(cfg.display.tick_interval_ms),
    )
    .await?;

    let mut display = controller.display();
    let mut poll = tokio::time::interval(Duration::from_secs(cfg.watch.poll_interval_secs));
    poll.tick().await; // First tick fires immediately.

    println!("{}", serde_json::to_string(&*display.borrow())?);
    loop {
        tokio::select! {
            changed = display.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", serde_json::to_string(&*display.borrow())?);
            }
            _ = poll.tick() => {
                if let Err(e) = controller.resync().await {
                    log::warn!("resync failed: {e}");
                }
            }
        }
    }

    controller.detach().await;
    Ok(())
}
