//! JSON-RPC client over a single WebSocket connection

use super::protocol::{self, IncomingMessage, JsonRpcRequest};
use crate::engine::EngineEventSender;
use crate::{Error, Result};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace, warn};

type PendingMap = DashMap<u64, oneshot::Sender<Result<Value>>>;

/// How long `close` waits for the server to acknowledge the close frame
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Request/response multiplexer for one media server connection
///
/// Responses are matched to requests by id. `onEvent` notifications are
/// decoded and forwarded to the event channel given at connect time. The
/// server-assigned `sessionId` is learned from the first response and attached
/// to every later request.
pub struct JsonRpcClient {
    outbound: mpsc::UnboundedSender<Message>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
    session_id: Arc<Mutex<Option<String>>>,
    closed: Arc<AtomicBool>,
    request_timeout: Duration,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl JsonRpcClient {
    /// Connect to `url` and start the reader/writer tasks
    pub async fn connect(url: &str, request_timeout: Duration, events: EngineEventSender) -> Result<Self> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| Error::EngineFault(format!("Failed to connect to media server at {}: {}", url, e)))?;
        debug!(url = %url, "Connected to media server");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let is_close = matches!(msg, Message::Close(_));
                if let Err(e) = ws_sender.send(msg).await {
                    debug!("Media server write failed: {}", e);
                    break;
                }
                if is_close {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        let pending: Arc<PendingMap> = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let reader = {
            let pending = Arc::clone(&pending);
            let closed = Arc::clone(&closed);
            let pong = outbound.clone();
            tokio::spawn(async move {
                while let Some(msg) = ws_receiver.next().await {
                    match msg {
                        Ok(Message::Text(text)) => dispatch_incoming(&text, &pending, &events),
                        Ok(Message::Ping(data)) => {
                            let _ = pong.send(Message::Pong(data));
                        }
                        Ok(Message::Close(_)) => {
                            debug!("Media server closed the connection");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("Media server connection error: {}", e);
                            break;
                        }
                    }
                }
                closed.store(true, Ordering::SeqCst);
                // Dropping the senders fails every in-flight request
                pending.clear();
            })
        };

        Ok(Self {
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            session_id: Arc::new(Mutex::new(None)),
            closed,
            request_timeout,
            reader: Mutex::new(Some(reader)),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Server session id, once known
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    /// Send a request and wait for its result
    pub async fn call(&self, method: &str, mut params: Value) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::EngineFault("Media server connection closed".to_string()));
        }

        if let (Some(session_id), Some(map)) = (self.session_id(), params.as_object_mut()) {
            map.insert("sessionId".to_string(), Value::String(session_id));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let text = serde_json::to_string(&request)?;

        let rx = self.register(id)?;
        trace!(id, method, "-> media server");

        if self.outbound.send(Message::Text(text)).is_err() {
            self.pending.remove(&id);
            return Err(Error::EngineFault("Media server connection closed".to_string()));
        }

        let result = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => {
                return Err(Error::EngineFault(format!(
                    "Media server connection closed during '{}'",
                    method
                )))
            }
            Err(_) => {
                self.pending.remove(&id);
                return Err(Error::EngineFault(format!(
                    "Media server did not answer '{}' within {:?}",
                    method, self.request_timeout
                )));
            }
        };

        if let Some(session_id) = result.get("sessionId").and_then(Value::as_str) {
            let mut current = self.session_id.lock();
            if current.as_deref() != Some(session_id) {
                *current = Some(session_id.to_string());
            }
        }

        Ok(result)
    }

    /// Add a pending entry for request `id`
    ///
    /// The reader clears the pending map when the connection ends, so an entry
    /// added after that would never complete; such requests fail here instead.
    fn register(&self, id: u64) -> Result<oneshot::Receiver<Result<Value>>> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        if self.is_closed() {
            self.pending.remove(&id);
            return Err(Error::EngineFault("Media server connection closed".to_string()));
        }
        Ok(rx)
    }

    /// Close the connection
    ///
    /// Waits briefly for the server to finish the close handshake, then stops
    /// the reader.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.outbound.send(Message::Close(None));

        let reader = self.reader.lock().take();
        if let Some(mut handle) = reader {
            if tokio::time::timeout(CLOSE_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        self.pending.clear();
    }
}

impl Drop for JsonRpcClient {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.lock().take() {
            handle.abort();
        }
    }
}

fn dispatch_incoming(text: &str, pending: &PendingMap, events: &EngineEventSender) {
    let message: IncomingMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Ignoring malformed media server message: {}", e);
            return;
        }
    };

    if message.is_notification() {
        if message.method.as_deref() == Some(protocol::ON_EVENT_METHOD) {
            match message.params.as_ref().and_then(protocol::parse_event) {
                Some(event) => {
                    trace!(source = %event.source(), kind = event.kind().as_str(), "<- media server event");
                    let _ = events.send(event);
                }
                None => debug!("Ignoring unhandled media server event"),
            }
        }
        return;
    }

    let Some(id) = message.id else {
        debug!("Ignoring media server message without id");
        return;
    };
    let Some((_, tx)) = pending.remove(&id) else {
        debug!(id, "Response for unknown or expired request");
        return;
    };

    let outcome = match (message.error, message.result) {
        (Some(error), _) => Err(error.into_error()),
        (None, Some(result)) => Ok(result),
        (None, None) => Ok(Value::Null),
    };
    let _ = tx.send(outcome);
}
