//! Outbound half of a client connection

use super::protocol::ServerMessage;
use crate::{Error, Result};
use tokio::sync::mpsc;
use tracing::trace;

/// Queue feeding a connection's writer task
///
/// All outbound traffic for one connection goes through this bounded queue, so
/// writes are serialized and keep their send order.
#[derive(Debug, Clone)]
pub struct PeerSender {
    connection_id: String,
    tx: mpsc::Sender<String>,
}

impl PeerSender {
    pub fn new(connection_id: impl Into<String>, tx: mpsc::Sender<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            tx,
        }
    }

    /// Create a sender together with the receiving end of its queue
    pub fn channel(connection_id: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(connection_id, tx), rx)
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue a message for the client
    pub async fn send(&self, message: &ServerMessage) -> Result<()> {
        let text = message.to_json()?;
        trace!(connection_id = %self.connection_id, kind = message.kind(), "Queueing outbound message");
        self.tx
            .send(text)
            .await
            .map_err(|_| Error::WebSocket(format!("connection {} is closed", self.connection_id)))
    }
}
