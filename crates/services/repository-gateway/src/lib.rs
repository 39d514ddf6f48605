//! Repository recording gateway
//!
//! A signaling gateway that lets a browser record a WebRTC stream into a media
//! repository and play it back later. Media never flows through the gateway:
//! capture, recording and playback happen inside an external media server
//! (Kurento), and recordings are stored as items allocated by a repository
//! service. The gateway brokers the control plane for each client connection.
//!
//! # Features
//!
//! - **Per-connection state machine**: record once, then play back any number of times
//! - **Offer/answer + trickle ICE** negotiation driven against the media server
//! - **JSON control protocol** over WebSocket (`start`, `stop`, `play`, `stopPlay`, `onIceCandidate`)
//! - **Deterministic cleanup**: every termination path releases all media server objects
//! - **Offline fallback**: recordings go to local files when the repository is down
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Browser                                                 │
//! │  ↓ (JSON over WebSocket)                                 │
//! │  WebSocketServer ── one handler + writer task per socket │
//! │  ↓                                                       │
//! │  SignalingRouter (decode, dispatch, error/cleanup path)  │
//! │  ↓                                                       │
//! │  SessionRegistry (DashMap: connection id → session)      │
//! │  ↓                                                       │
//! │  SessionHandle ── worker task owning SessionState        │
//! │  ├─ MediaEngine / EngineConnection (Kurento JSON-RPC)    │
//! │  └─ StorageCatalog (repository REST, local fallback)     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use remotemedia_repository_gateway::Config;
//!
//! let config = Config::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.server.path, "/repository");
//! ```

#![warn(clippy::all)]

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod session;
pub mod signaling;

pub use catalog::{HttpRepositoryCatalog, OfflineCatalog, StorageCatalog};
#[cfg(any(test, feature = "test-util"))]
pub use catalog::MemoryCatalog;
pub use config::Config;
pub use engine::kurento::KurentoEngine;
pub use engine::{EngineEvent, IceCandidate, MediaEngine, MediaProfile};
pub use error::{Error, Result};
pub use session::{SessionPhase, SessionRegistry};
pub use signaling::{ClientMessage, ServerMessage, SignalingRouter, WebSocketServer};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
