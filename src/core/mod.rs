//! Core modules for Brick Hospital

pub mod sequence;
pub mod ledger;
pub mod summary;
pub mod clock;
pub mod engine;
pub mod runner;
pub mod api;

pub use sequence::{Advance, TargetSequence};
pub use ledger::ScoreLedger;
pub use summary::{accuracy_percent, summarize};
pub use clock::TrialClock;
pub use engine::GameSession;
pub use runner::{EventSender, SessionHandle, SessionRunner};
pub use api::{create_router, run_server, AppState, DeviceFactory};
