//! Embedded gateway server for WebSocket tests

use super::{GatewayHarness, HarnessError, HarnessResult};
use remotemedia_repository_gateway::config::ServerConfig;
use remotemedia_repository_gateway::engine::mock::MockMediaEngine;
use remotemedia_repository_gateway::signaling::{WebSocketServer, WebSocketServerHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Gateway bound to a random local port
pub struct TestServer {
    pub harness: GatewayHarness,
    handle: WebSocketServerHandle,
    path: String,
}

impl TestServer {
    pub async fn start() -> HarnessResult<Self> {
        Self::start_with(MockMediaEngine::new()).await
    }

    pub async fn start_with(engine: MockMediaEngine) -> HarnessResult<Self> {
        let harness = GatewayHarness::with_engine(engine, 100);
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        };
        let path = config.path.clone();

        let handle = WebSocketServer::new(config, Arc::clone(&harness.router))
            .start()
            .await
            .map_err(|e| HarnessError::ServerError(e.to_string()))?;
        info!("Test server listening on {}", handle.local_addr());

        Ok(Self {
            harness,
            handle,
            path,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    /// URL of the signaling endpoint
    pub fn url(&self) -> String {
        format!("ws://{}{}", self.addr(), self.path)
    }

    pub async fn shutdown(self) {
        self.handle.shutdown().await;
        self.harness.router.shutdown().await;
    }
}
