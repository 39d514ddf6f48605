//! Per-connection WebSocket handling

use crate::config::ServerConfig;
use crate::signaling::{PeerSender, SignalingRouter};
use crate::Result;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Time the writer gets to flush queued messages after the read side ends
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle a single WebSocket connection
///
/// Assigns the connection a fresh id, registers it with the router, and
/// feeds every text frame to the router in arrival order. Outbound messages go
/// through a dedicated writer task so sends never interleave.
pub async fn handle_connection(
    stream: TcpStream,
    router: Arc<SignalingRouter>,
    config: Arc<ServerConfig>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = stream.peer_addr()?;

    let expected_path = config.path.clone();
    let check_path = move |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        if request.uri().path() == expected_path {
            Ok(response)
        } else {
            debug!(path = %request.uri().path(), "Rejecting WebSocket upgrade for unknown path");
            let mut reject = ErrorResponse::new(Some("Not Found".to_string()));
            *reject.status_mut() = StatusCode::NOT_FOUND;
            Err(reject)
        }
    };
    let ws_stream = accept_hdr_async(stream, check_path).await?;

    let connection_id = Uuid::new_v4().to_string();
    info!(session_id = %connection_id, peer = %addr, "WebSocket connection opened");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (peer, mut rx) = PeerSender::channel(connection_id.clone(), config.outbound_queue_size);

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = ws_tx.send(Message::Text(text)).await {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    router.on_open(peer);

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    router.on_message(&connection_id, &text).await;
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!(session_id = %connection_id, "Ignoring binary frame");
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(session_id = %connection_id, "WebSocket closed by client");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(session_id = %connection_id, "WebSocket error: {}", e);
                    break;
                }
            },
            _ = shutdown_rx.recv() => {
                debug!(session_id = %connection_id, "Server shutting down, closing connection");
                break;
            }
        }
    }

    // Releases the session and drops the router's sender; the writer exits
    // once every sender is gone
    router.on_close(&connection_id).await;
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        debug!(session_id = %connection_id, "Writer did not drain in time");
    }

    info!(session_id = %connection_id, "WebSocket connection closed");
    Ok(())
}
