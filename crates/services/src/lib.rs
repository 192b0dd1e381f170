#![forbid(unsafe_code)]

pub mod api;
pub mod continuity;
pub mod error;
pub mod progress_store;
pub mod session;

pub use quiz_core::time::Clock;

pub use api::{ApiClient, ApiConfig, AuthTokens, QuizBackend, TokenManager};
pub use continuity::{
    ContinuityConfig, ContinuityEvent, ContinuityHandle, ContinuityRole, ContinuityStatus,
    DeviceInfo, DeviceKind, MemoryTransport, PeerMessage, RendezvousId, Transport,
};
pub use error::{ApiError, SessionLoadError};
pub use progress_store::{ProgressStore, VersionCheck};
pub use session::{SessionController, SessionConfig, SessionEvent, SessionPhase, SessionView};
