//! Test clients speaking the gateway protocol

use super::{HarnessError, HarnessResult, QUIET_PERIOD, RECV_TIMEOUT};
use futures_util::{SinkExt, StreamExt};
use remotemedia_repository_gateway::signaling::PeerSender;
use remotemedia_repository_gateway::{IceCandidate, ServerMessage, SignalingRouter};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

fn decode(text: &str) -> HarnessResult<ServerMessage> {
    serde_json::from_str(text)
        .map_err(|e| HarnessError::ProtocolError(format!("undecodable reply {}: {}", text, e)))
}

/// Client driving the router in-process
pub struct RouterClient {
    connection_id: String,
    router: Arc<SignalingRouter>,
    rx: mpsc::Receiver<String>,
}

impl RouterClient {
    pub fn open(router: Arc<SignalingRouter>, connection_id: &str) -> Self {
        let (peer, rx) = PeerSender::channel(connection_id, 64);
        router.on_open(peer);
        Self {
            connection_id: connection_id.to_string(),
            router,
            rx,
        }
    }

    pub fn id(&self) -> &str {
        &self.connection_id
    }

    /// Send a raw text frame; returns once the router has handled it
    pub async fn send_raw(&self, text: &str) {
        self.router.on_message(&self.connection_id, text).await;
    }

    pub async fn send(&self, message: Value) {
        self.send_raw(&message.to_string()).await;
    }

    pub async fn start(&self, sdp_offer: &str) {
        self.send(json!({ "id": "start", "sdpOffer": sdp_offer })).await;
    }

    pub async fn stop(&self) {
        self.send(json!({ "id": "stop" })).await;
    }

    pub async fn play(&self, sdp_offer: &str) {
        self.send(json!({ "id": "play", "sdpOffer": sdp_offer })).await;
    }

    pub async fn stop_play(&self) {
        self.send(json!({ "id": "stopPlay" })).await;
    }

    pub async fn ice_candidate(&self, candidate: &IceCandidate) {
        self.send(json!({ "id": "onIceCandidate", "candidate": candidate }))
            .await;
    }

    /// Simulate the transport closing
    pub async fn close(&self) {
        self.router.on_close(&self.connection_id).await;
    }

    /// Wait for the next outbound message
    pub async fn next(&mut self) -> HarnessResult<ServerMessage> {
        match tokio::time::timeout(RECV_TIMEOUT, self.rx.recv()).await {
            Ok(Some(text)) => decode(&text),
            Ok(None) => Err(HarnessError::ConnectionError("outbound queue closed".to_string())),
            Err(_) => Err(HarnessError::Timeout(format!(
                "no message for {} within {:?}",
                self.connection_id, RECV_TIMEOUT
            ))),
        }
    }

    /// Collect everything sent until the connection stays quiet
    pub async fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(Some(text)) = tokio::time::timeout(QUIET_PERIOD, self.rx.recv()).await {
            if let Ok(message) = decode(&text) {
                messages.push(message);
            }
        }
        messages
    }
}

/// WebSocket client for a running [`super::TestServer`]
pub struct WsTestClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTestClient {
    pub async fn connect(url: &str) -> HarnessResult<Self> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| HarnessError::ConnectionError(format!("{}: {}", url, e)))?;
        Ok(Self { stream })
    }

    pub async fn send(&mut self, message: Value) -> HarnessResult<()> {
        self.stream
            .send(Message::Text(message.to_string()))
            .await
            .map_err(|e| HarnessError::ConnectionError(e.to_string()))
    }

    /// Wait for the next protocol message, skipping control frames
    pub async fn next(&mut self) -> HarnessResult<ServerMessage> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .map_err(|_| HarnessError::Timeout(format!("no frame within {:?}", RECV_TIMEOUT)))?;
            match frame {
                Some(Ok(Message::Text(text))) => return decode(&text),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(HarnessError::ConnectionError("closed by server".to_string()))
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(HarnessError::ConnectionError(e.to_string())),
            }
        }
    }

    pub async fn close(mut self) -> HarnessResult<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| HarnessError::ConnectionError(e.to_string()))
    }
}
