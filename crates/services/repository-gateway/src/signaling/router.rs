//! Message routing between client connections and sessions

use super::peer::PeerSender;
use super::protocol::{ClientMessage, ServerMessage};
use crate::catalog::StorageCatalog;
use crate::engine::MediaEngine;
use crate::session::{
    SessionHandle, SessionOptions, SessionRegistry, SessionRequest, SessionState,
};
use crate::{Error, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Decodes client messages, drives sessions and applies the uniform
/// error/cleanup path
///
/// The transport registers each connection's [`PeerSender`] with
/// [`on_open`](Self::on_open), feeds its text frames to
/// [`on_message`](Self::on_message) in arrival order and calls
/// [`on_close`](Self::on_close) when the socket goes away.
pub struct SignalingRouter {
    registry: Arc<SessionRegistry>,
    engine: Arc<dyn MediaEngine>,
    catalog: Arc<dyn StorageCatalog>,
    options: SessionOptions,
    peers: DashMap<String, PeerSender>,
}

impl SignalingRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        engine: Arc<dyn MediaEngine>,
        catalog: Arc<dyn StorageCatalog>,
        options: SessionOptions,
    ) -> Self {
        Self {
            registry,
            engine,
            catalog,
            options,
            peers: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Number of open client connections
    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// Register a new client connection
    pub fn on_open(&self, peer: PeerSender) {
        debug!(session_id = %peer.connection_id(), "Connection registered");
        self.peers.insert(peer.connection_id().to_string(), peer);
    }

    /// Handle one inbound text frame
    pub async fn on_message(&self, connection_id: &str, text: &str) {
        let message = match ClientMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                self.fail(connection_id, e).await;
                return;
            }
        };

        debug!(session_id = %connection_id, kind = message.kind(), "Incoming message");
        if let Err(e) = self.dispatch(connection_id, message).await {
            self.fail(connection_id, e).await;
        }
    }

    /// Handle the transport going away
    pub async fn on_close(&self, connection_id: &str) {
        self.peers.remove(connection_id);
        if self.release(connection_id).await {
            info!(session_id = %connection_id, "Connection closed, session released");
        } else {
            debug!(session_id = %connection_id, "Connection closed without a session");
        }
    }

    /// Close every session
    pub async fn shutdown(&self) {
        info!(sessions = self.registry.len(), "Closing all sessions");
        self.registry.close_all().await;
        self.peers.clear();
    }

    async fn dispatch(&self, connection_id: &str, message: ClientMessage) -> Result<()> {
        let request = match message {
            ClientMessage::Start { sdp_offer } => {
                let handle = self.open_session(connection_id).await?;
                return handle.request(SessionRequest::Start { sdp_offer }).await;
            }
            ClientMessage::Stop => SessionRequest::Stop,
            ClientMessage::Play { sdp_offer } => SessionRequest::Play { sdp_offer },
            ClientMessage::StopPlay => SessionRequest::StopPlay,
            ClientMessage::OnIceCandidate { candidate } => SessionRequest::AddIceCandidate(candidate),
        };

        match self.registry.get(connection_id) {
            Some(handle) => handle.request(request).await,
            None => {
                debug!(session_id = %connection_id, kind = request.kind(), "No session, ignoring");
                Ok(())
            }
        }
    }

    async fn open_session(&self, connection_id: &str) -> Result<SessionHandle> {
        let peer = self
            .peers
            .get(connection_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| Error::SessionClosed(format!("connection {} is not open", connection_id)))?;

        self.registry
            .create(connection_id, || async {
                let (events_tx, events_rx) = mpsc::unbounded_channel();
                let connection = self.engine.connect(events_tx).await?;
                let state = SessionState::new(
                    connection_id,
                    connection,
                    Arc::clone(&self.catalog),
                    peer,
                    self.options.clone(),
                );
                Ok(SessionHandle::spawn(state, events_rx))
            })
            .await
    }

    /// Report `err` to the client and release its session
    async fn fail(&self, connection_id: &str, err: Error) {
        let message = if err.is_resource_exhausted() {
            warn!(session_id = %connection_id, "Not enough resources: {}", err);
            ServerMessage::NotEnoughResources
        } else {
            if err.is_protocol_error() {
                warn!(session_id = %connection_id, category = err.category(), "Protocol error: {}", err);
            } else {
                error!(session_id = %connection_id, category = err.category(), "Session failed: {}", err);
            }
            ServerMessage::error(&err)
        };

        let peer = self.peers.get(connection_id).map(|p| p.value().clone());
        match peer {
            Some(peer) => {
                if let Err(e) = peer.send(&message).await {
                    warn!(session_id = %connection_id, "Failed to send {}: {}", message.kind(), e);
                }
            }
            None => debug!(session_id = %connection_id, "Connection gone, dropping {}", message.kind()),
        }

        self.release(connection_id).await;
    }

    /// Remove and close the connection's session; `false` if there was none
    async fn release(&self, connection_id: &str) -> bool {
        match self.registry.remove(connection_id) {
            Some(handle) => {
                handle.close().await;
                true
            }
            None => false,
        }
    }
}
