//! Per-session worker task
//!
//! Each session runs as a single task owning its [`SessionState`]. Client
//! requests arrive on a command queue and media server notifications on the
//! engine event queue; the task handles one at a time, so both share a single
//! ordering domain and the state never needs a lock.

use super::state::{SessionPhase, SessionState};
use crate::engine::{EngineEventReceiver, IceCandidate};
use crate::{Error, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, Instrument};

const COMMAND_QUEUE_SIZE: usize = 32;

/// Operation requested by the client
#[derive(Debug, Clone, PartialEq)]
pub enum SessionRequest {
    Start { sdp_offer: String },
    Stop,
    Play { sdp_offer: String },
    StopPlay,
    AddIceCandidate(IceCandidate),
}

impl SessionRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionRequest::Start { .. } => "start",
            SessionRequest::Stop => "stop",
            SessionRequest::Play { .. } => "play",
            SessionRequest::StopPlay => "stopPlay",
            SessionRequest::AddIceCandidate(_) => "onIceCandidate",
        }
    }
}

enum SessionCommand {
    Request {
        request: SessionRequest,
        reply: oneshot::Sender<Result<()>>,
    },
    Phase {
        reply: oneshot::Sender<SessionPhase>,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running session worker
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: String,
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Spawn the worker for `state`, consuming its engine events
    pub fn spawn(state: SessionState, events: EngineEventReceiver) -> Self {
        let id = state.id().to_string();
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let span = tracing::info_span!("session", session_id = %id);
        tokio::spawn(run(state, rx, events).instrument(span));
        Self { id, tx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run a request and wait for its outcome
    pub async fn request(&self, request: SessionRequest) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Request { request, reply })
            .await
            .map_err(|_| Error::SessionClosed(self.id.clone()))?;
        rx.await.map_err(|_| Error::SessionClosed(self.id.clone()))?
    }

    /// Current phase of the session
    pub async fn phase(&self) -> Result<SessionPhase> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Phase { reply })
            .await
            .map_err(|_| Error::SessionClosed(self.id.clone()))?;
        rx.await.map_err(|_| Error::SessionClosed(self.id.clone()))
    }

    /// Release the session and wait until everything is torn down
    ///
    /// Returns immediately if the worker already exited.
    pub async fn close(&self) {
        let (done, rx) = oneshot::channel();
        if self.tx.send(SessionCommand::Close { done }).await.is_ok() {
            let _ = rx.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

async fn run(
    mut state: SessionState,
    mut commands: mpsc::Receiver<SessionCommand>,
    mut events: EngineEventReceiver,
) {
    debug!("Session worker started");
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::Request { request, reply }) => {
                    let kind = request.kind();
                    let result = apply(&mut state, request).await;
                    if let Err(e) = &result {
                        debug!(kind, "Request failed: {}", e);
                    }
                    let _ = reply.send(result);
                }
                Some(SessionCommand::Phase { reply }) => {
                    let _ = reply.send(state.phase());
                }
                Some(SessionCommand::Close { done }) => {
                    state.close().await;
                    let _ = done.send(());
                    break;
                }
                None => {
                    // Every handle dropped without an explicit close
                    state.close().await;
                    break;
                }
            },
            event = events.recv() => match event {
                Some(event) => state.handle_engine_event(event).await,
                None => {
                    // The engine connection dropped its event sender
                    state.engine_lost().await;
                    break;
                }
            },
        }
    }
    debug!("Session worker stopped");
}

async fn apply(state: &mut SessionState, request: SessionRequest) -> Result<()> {
    match request {
        SessionRequest::Start { sdp_offer } => state.start(&sdp_offer).await,
        SessionRequest::Stop => state.stop().await,
        SessionRequest::Play { sdp_offer } => state.play(&sdp_offer).await,
        SessionRequest::StopPlay => state.stop_play().await,
        SessionRequest::AddIceCandidate(candidate) => state.add_ice_candidate(&candidate).await,
    }
}
