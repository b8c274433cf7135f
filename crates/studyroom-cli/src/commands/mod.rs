pub mod config;
pub mod events;
pub mod room;
pub mod stats;
pub mod timer;

use studyroom_core::{
    ChangeNotifier, Database, StudyroomConfig, TimerError, TimerStore, UserId,
};

/// Open the shared database and a store tuned from the config file.
pub fn open_store() -> Result<(Database, TimerStore, StudyroomConfig), Box<dyn std::error::Error>> {
    let cfg = StudyroomConfig::load()?;
    let db = Database::open()?;
    let store = TimerStore::new(db.clone(), ChangeNotifier::new(cfg.notifier.channel_capacity))
        .with_read_retry_backoff(std::time::Duration::from_millis(cfg.read_retry_backoff_ms));
    Ok((db, store, cfg))
}

/// Resolve the acting user: explicit --user beats the configured default.
pub fn resolve_user(
    explicit: Option<String>,
    cfg: &StudyroomConfig,
) -> Result<UserId, Box<dyn std::error::Error>> {
    explicit
        .or_else(|| cfg.default_user.clone())
        .ok_or_else(|| TimerError::Unauthenticated.into())
}
