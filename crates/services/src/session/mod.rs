//! The per-quiz study session: orchestration and render snapshots.

mod controller;
mod view;

pub use controller::{SessionConfig, SessionController, SessionEvent};
pub use view::{SessionPhase, SessionView};
