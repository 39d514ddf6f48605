//! WebSocket signaling server

use super::handler::handle_connection;
use crate::config::ServerConfig;
use crate::signaling::SignalingRouter;
use crate::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// WebSocket signaling server
pub struct WebSocketServer {
    config: Arc<ServerConfig>,
    router: Arc<SignalingRouter>,
}

impl WebSocketServer {
    pub fn new(config: ServerConfig, router: Arc<SignalingRouter>) -> Self {
        Self {
            config: Arc::new(config),
            router,
        }
    }

    /// Bind the listener and spawn the accept loop
    pub async fn start(self) -> Result<WebSocketServerHandle> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        info!(
            "WebSocket signaling server listening on ws://{}{}",
            local_addr, self.config.path
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut shutdown_rx = shutdown_tx.subscribe();
        let connection_shutdown = shutdown_tx.clone();
        let config = self.config;
        let router = self.router;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                debug!("Accepted TCP connection from {}", peer_addr);
                                let router = Arc::clone(&router);
                                let config = Arc::clone(&config);
                                let shutdown = connection_shutdown.subscribe();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, router, config, shutdown).await {
                                        error!("WebSocket connection error from {}: {}", peer_addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept WebSocket connection: {}", e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("WebSocket signaling server received shutdown signal");
                        break;
                    }
                }
            }
            info!("WebSocket signaling server accept loop exited");
        });

        Ok(WebSocketServerHandle {
            local_addr,
            shutdown_tx,
            task,
        })
    }
}

/// Handle to a running server
pub struct WebSocketServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl WebSocketServerHandle {
    /// Address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and close open connections
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            error!("WebSocket server task failed: {}", e);
        }
    }
}
