//! Streaming session lifecycle
//!
//! [`StreamingSession`] owns one capture → gain → send pipeline;
//! [`SessionController`] makes sure at most one of them is active.

pub mod cancel;
pub mod config;
pub mod controller;
pub mod state;
pub mod stats;
pub mod streaming;

pub use cancel::CancellationToken;
pub use config::SessionConfig;
pub use controller::{SessionController, SessionEvent, SessionStatus};
pub use state::{CloseReason, SessionState};
pub use stats::{SessionStats, SessionStatsSnapshot};
pub use streaming::{ClosedSession, StreamingSession};
