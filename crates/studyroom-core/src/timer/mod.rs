pub mod clock;
pub mod controller;
pub mod state;
pub mod store;

pub use clock::elapsed;
pub use controller::{DisplaySnapshot, RoomTimerController};
pub use state::{TimerAction, TimerPhase, TimerState};
pub use store::TimerStore;
