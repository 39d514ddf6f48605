//! Record/playback sessions
//!
//! - [`SessionState`]: the per-connection state machine and the engine handles it owns
//! - [`SessionHandle`]: the worker task that serializes requests and engine events
//! - [`SessionRegistry`]: connection id to session lookup

pub mod registry;
pub mod state;
pub mod worker;

pub use registry::SessionRegistry;
pub use state::{SessionOptions, SessionPhase, SessionState};
pub use worker::{SessionHandle, SessionRequest};
