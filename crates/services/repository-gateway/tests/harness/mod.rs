//! Gateway integration test harness
//!
//! Wires a [`SignalingRouter`] to the scripted [`MockMediaEngine`] and an
//! in-memory catalog, and provides two kinds of clients:
//!
//! - [`RouterClient`]: talks to the router directly, no sockets involved
//! - [`WsTestClient`]: a real WebSocket client for a [`TestServer`]
//!
//! Basic usage pattern:
//!
//! 1. Create a `GatewayHarness` (optionally with a preconfigured engine)
//! 2. Open clients with `harness.client("c1")`
//! 3. Send protocol messages and read replies with `next()`
//! 4. Assert on the engine's calls and live objects

#![allow(dead_code)]

pub mod test_client;
pub mod test_server;

use remotemedia_repository_gateway::catalog::MemoryCatalog;
use remotemedia_repository_gateway::engine::mock::MockMediaEngine;
use remotemedia_repository_gateway::session::SessionOptions;
use remotemedia_repository_gateway::{SessionRegistry, SignalingRouter};
use std::sync::Arc;
use std::time::Duration;

pub use test_client::{RouterClient, WsTestClient};
pub use test_server::TestServer;

/// How long clients wait for an expected message
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// How long clients wait before concluding nothing was sent
pub const QUIET_PERIOD: Duration = Duration::from_millis(100);

/// Result type for test harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error type for test harness operations
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),
}

/// Router plus mock collaborators
pub struct GatewayHarness {
    pub engine: MockMediaEngine,
    pub catalog: MemoryCatalog,
    pub router: Arc<SignalingRouter>,
}

impl GatewayHarness {
    pub fn new() -> Self {
        Self::with_engine(MockMediaEngine::new(), 100)
    }

    /// Build around a preconfigured engine and session limit
    pub fn with_engine(engine: MockMediaEngine, max_sessions: usize) -> Self {
        let catalog = MemoryCatalog::new();
        let router = Arc::new(SignalingRouter::new(
            Arc::new(SessionRegistry::new(max_sessions)),
            Arc::new(engine.clone()),
            Arc::new(catalog.clone()),
            SessionOptions::default(),
        ));
        Self {
            engine,
            catalog,
            router,
        }
    }

    /// Open an in-process client connection
    pub fn client(&self, connection_id: &str) -> RouterClient {
        RouterClient::open(Arc::clone(&self.router), connection_id)
    }

    pub fn session_count(&self) -> usize {
        self.router.registry().len()
    }

    /// Assert no media server object or connection is left behind
    pub fn assert_no_leaks(&self) {
        assert!(
            self.engine.live_objects().is_empty(),
            "live engine objects: {:?}",
            self.engine.live_objects()
        );
        assert_eq!(self.engine.open_connections(), 0, "engine connections left open");
    }
}

/// Initialize test logging (safe to call from every test)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,remotemedia_repository_gateway=debug")
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
