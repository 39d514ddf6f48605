//! Per-connection record/playback state machine

use crate::catalog::{fallback_item, ItemMetadata, ItemOrigin, StorageCatalog, StorageItem};
use crate::engine::{
    EngineConnection, EngineEvent, IceCandidate, MediaPipeline, MediaProfile, PlayerEndpoint,
    RecorderEndpoint, WebRtcEndpoint,
};
use crate::signaling::{PeerSender, ServerMessage};
use crate::{Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Where a session is in its record/playback lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    Idle,
    Recording,
    RecordStopped,
    Playing,
    PlayStopped,
    Closed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "Idle",
            SessionPhase::Recording => "Recording",
            SessionPhase::RecordStopped => "RecordStopped",
            SessionPhase::Playing => "Playing",
            SessionPhase::PlayStopped => "PlayStopped",
            SessionPhase::Closed => "Closed",
        }
    }

    /// Phases with a negotiated WebRTC endpoint
    pub fn is_active(&self) -> bool {
        matches!(self, SessionPhase::Recording | SessionPhase::Playing)
    }

    /// Phases from which a playback may start
    pub fn can_play(&self) -> bool {
        matches!(self, SessionPhase::RecordStopped | SessionPhase::PlayStopped)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-session settings taken from the gateway config
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Recorder media profile
    pub profile: MediaProfile,
    /// Directory for local fallback items
    pub fallback_dir: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            profile: MediaProfile::Webm,
            fallback_dir: "/tmp".to_string(),
        }
    }
}

/// Which SDP answer message a negotiation produces
#[derive(Debug, Clone, Copy)]
enum Negotiation {
    Record,
    Play,
}

impl Negotiation {
    fn answer(&self, sdp_answer: String) -> ServerMessage {
        match self {
            Negotiation::Record => ServerMessage::StartResponse { sdp_answer },
            Negotiation::Play => ServerMessage::PlayResponse { sdp_answer },
        }
    }
}

/// State of one connection's session and the engine handles it owns
///
/// At most one pipeline is alive at a time. `recorder` is only set while
/// recording and `player` only while playing; both are dropped together with
/// the pipeline they belong to.
pub struct SessionState {
    id: String,
    phase: SessionPhase,
    connection: Arc<dyn EngineConnection>,
    catalog: Arc<dyn StorageCatalog>,
    peer: PeerSender,
    options: SessionOptions,
    pipeline: Option<MediaPipeline>,
    webrtc: Option<WebRtcEndpoint>,
    recorder: Option<RecorderEndpoint>,
    player: Option<PlayerEndpoint>,
    item: Option<StorageItem>,
}

impl SessionState {
    pub fn new(
        id: impl Into<String>,
        connection: Arc<dyn EngineConnection>,
        catalog: Arc<dyn StorageCatalog>,
        peer: PeerSender,
        options: SessionOptions,
    ) -> Self {
        Self {
            id: id.into(),
            phase: SessionPhase::Idle,
            connection,
            catalog,
            peer,
            options,
            pipeline: None,
            webrtc: None,
            recorder: None,
            player: None,
            item: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn storage_item(&self) -> Option<&StorageItem> {
        self.item.as_ref()
    }

    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }

    fn reject(&self, event: &'static str) -> Error {
        Error::InvalidTransition {
            event,
            phase: self.phase,
        }
    }

    /// Begin recording: `Idle -> Recording`
    pub async fn start(&mut self, sdp_offer: &str) -> Result<()> {
        if self.phase != SessionPhase::Idle {
            return Err(self.reject("start"));
        }

        if let Err(e) = self.setup_recording(sdp_offer).await {
            self.release_pipeline().await;
            return Err(e);
        }

        self.phase = SessionPhase::Recording;
        info!(session_id = %self.id, "Recording started");
        Ok(())
    }

    async fn setup_recording(&mut self, sdp_offer: &str) -> Result<()> {
        let pipeline = MediaPipeline::create(Arc::clone(&self.connection)).await?;
        info!(session_id = %self.id, pipeline = %pipeline.id(), "Created recording pipeline");
        let pipeline = self.pipeline.insert(pipeline);

        let item = match &self.item {
            Some(item) => item.clone(),
            None => {
                let item = allocate_item(&self.id, self.catalog.as_ref(), &self.options).await;
                self.item = Some(item.clone());
                item
            }
        };

        let webrtc = pipeline.create_webrtc_endpoint().await?;
        let recorder = pipeline
            .create_recorder_endpoint(&item.write_url, self.options.profile)
            .await?;

        // Loopback so the client sees what is being recorded
        webrtc.connect(&webrtc).await?;
        webrtc.connect(&recorder).await?;

        let webrtc = self.webrtc.insert(webrtc);
        let recorder = self.recorder.insert(recorder);

        negotiate(&self.peer, &self.id, webrtc, sdp_offer, Negotiation::Record).await?;
        recorder.record().await?;
        Ok(())
    }

    /// Stop recording: `Recording -> RecordStopped`
    ///
    /// Repeated stops after recording ended are ignored.
    pub async fn stop(&mut self) -> Result<()> {
        match self.phase {
            SessionPhase::Recording => {
                if let Some(recorder) = self.recorder.take() {
                    if let Err(e) = recorder.stop().await {
                        warn!(session_id = %self.id, "Failed to stop recorder: {}", e);
                    }
                }
                self.release_pipeline().await;
                self.phase = SessionPhase::RecordStopped;
                info!(session_id = %self.id, "Recording stopped");
                Ok(())
            }
            SessionPhase::RecordStopped | SessionPhase::PlayStopped => {
                debug!(session_id = %self.id, phase = %self.phase, "Ignoring stop, nothing is running");
                Ok(())
            }
            _ => Err(self.reject("stop")),
        }
    }

    /// Play back the recording: `RecordStopped | PlayStopped -> Playing`
    ///
    /// Every playback gets a fresh pipeline.
    pub async fn play(&mut self, sdp_offer: &str) -> Result<()> {
        if !self.phase.can_play() {
            return Err(self.reject("play"));
        }

        if let Err(e) = self.setup_playback(sdp_offer).await {
            self.release_pipeline().await;
            return Err(e);
        }

        self.phase = SessionPhase::Playing;
        info!(session_id = %self.id, "Playback started");
        Ok(())
    }

    async fn setup_playback(&mut self, sdp_offer: &str) -> Result<()> {
        let read_url = self.resolve_read_url().await?;

        let pipeline = MediaPipeline::create(Arc::clone(&self.connection)).await?;
        info!(session_id = %self.id, pipeline = %pipeline.id(), "Created playback pipeline");
        let pipeline = self.pipeline.insert(pipeline);

        let webrtc = pipeline.create_webrtc_endpoint().await?;
        let player = pipeline.create_player_endpoint(&read_url).await?;
        player.connect(&webrtc).await?;

        let webrtc = self.webrtc.insert(webrtc);
        let player = self.player.insert(player);

        player.subscribe_errors().await?;
        player.subscribe_end_of_stream().await?;

        negotiate(&self.peer, &self.id, webrtc, sdp_offer, Negotiation::Play).await?;
        player.play().await?;
        Ok(())
    }

    /// Read URL of the recorded item
    ///
    /// Falls back to the write URL when the catalog cannot resolve the item.
    async fn resolve_read_url(&self) -> Result<String> {
        let item = self
            .item
            .as_ref()
            .ok_or_else(|| Error::Protocol("Nothing has been recorded yet".to_string()))?;

        if item.origin == ItemOrigin::Fallback {
            return Ok(item.write_url.clone());
        }

        match self.catalog.read_item(&item.id).await {
            Ok(read) => Ok(read.url),
            Err(e) => {
                warn!(session_id = %self.id, item = %item.id, "Could not resolve read URL, using write URL: {}", e);
                Ok(item.write_url.clone())
            }
        }
    }

    /// Stop playback: `Playing -> PlayStopped`
    pub async fn stop_play(&mut self) -> Result<()> {
        match self.phase {
            SessionPhase::Playing => {
                self.finish_playback().await;
                info!(session_id = %self.id, "Playback stopped");
                Ok(())
            }
            SessionPhase::RecordStopped | SessionPhase::PlayStopped => {
                debug!(session_id = %self.id, phase = %self.phase, "Ignoring stopPlay, nothing is playing");
                Ok(())
            }
            _ => Err(self.reject("stopPlay")),
        }
    }

    async fn finish_playback(&mut self) {
        if let Some(player) = self.player.take() {
            if let Err(e) = player.stop().await {
                warn!(session_id = %self.id, "Failed to stop player: {}", e);
            }
        }
        self.release_pipeline().await;
        self.phase = SessionPhase::PlayStopped;
    }

    /// Apply a remote candidate to the current WebRTC endpoint
    ///
    /// Candidates arriving while no endpoint is negotiated are dropped.
    pub async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<()> {
        match (&self.webrtc, self.phase.is_active()) {
            (Some(webrtc), true) => webrtc.add_ice_candidate(candidate).await,
            _ => {
                debug!(session_id = %self.id, phase = %self.phase, "Dropping remote ICE candidate, no endpoint");
                Ok(())
            }
        }
    }

    /// Handle a notification from the media server
    ///
    /// Events from objects that are no longer current are ignored.
    pub async fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::IceCandidateFound { source, candidate } => {
                if self.webrtc.as_ref().map(|w| w.id()) != Some(source.as_str()) {
                    debug!(session_id = %self.id, source = %source, "Ignoring candidate from stale endpoint");
                    return;
                }
                self.send(&ServerMessage::IceCandidate { candidate }).await;
            }
            EngineEvent::EndOfStream { ref source } | EngineEvent::Error { ref source, .. } => {
                let is_current_player = self.phase == SessionPhase::Playing
                    && self.player.as_ref().map(|p| p.id()) == Some(source.as_str());
                if !is_current_player {
                    debug!(session_id = %self.id, source = %source, kind = event.kind().as_str(), "Ignoring stale player event");
                    return;
                }

                if let EngineEvent::Error { description, .. } = &event {
                    warn!(session_id = %self.id, "Player error: {}", description);
                } else {
                    info!(session_id = %self.id, "Playback reached end of stream");
                }

                self.send(&ServerMessage::PlayEnd).await;
                self.finish_playback().await;
            }
        }
    }

    /// The media server connection is gone: report it and shut down
    pub async fn engine_lost(&mut self) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        let err = Error::EngineFault("Media server connection lost".to_string());
        error!(session_id = %self.id, phase = %self.phase, "{}", err);
        self.send(&ServerMessage::error(&err)).await;
        self.close().await;
    }

    /// Release everything and close the engine connection
    pub async fn close(&mut self) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        self.release_pipeline().await;
        self.connection.close().await;
        self.phase = SessionPhase::Closed;
        info!(session_id = %self.id, "Session closed");
    }

    /// Drop all endpoints and release the current pipeline, logging failures
    async fn release_pipeline(&mut self) {
        self.webrtc = None;
        self.recorder = None;
        self.player = None;
        if let Some(pipeline) = self.pipeline.take() {
            match pipeline.release().await {
                Ok(()) => debug!(session_id = %self.id, pipeline = %pipeline.id(), "Released pipeline"),
                Err(e) => warn!(session_id = %self.id, pipeline = %pipeline.id(), "Failed to release pipeline: {}", e),
            }
        }
    }

    async fn send(&self, message: &ServerMessage) {
        if let Err(e) = self.peer.send(message).await {
            warn!(session_id = %self.id, kind = message.kind(), "Failed to send message: {}", e);
        }
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("pipeline", &self.pipeline)
            .field("item", &self.item)
            .finish()
    }
}

/// Subscribe to local candidates, answer the offer, then start gathering
async fn negotiate(
    peer: &PeerSender,
    session_id: &str,
    webrtc: &WebRtcEndpoint,
    sdp_offer: &str,
    kind: Negotiation,
) -> Result<()> {
    webrtc.subscribe_ice_candidates().await?;
    let sdp_answer = webrtc.process_offer(sdp_offer).await?;
    debug!(session_id = %session_id, "Processed SDP offer");

    let answer = kind.answer(sdp_answer);
    if let Err(e) = peer.send(&answer).await {
        warn!(session_id = %session_id, kind = answer.kind(), "Failed to send message: {}", e);
    }

    webrtc.gather_candidates().await
}

/// Allocate the recording item, falling back to a local file
async fn allocate_item(
    session_id: &str,
    catalog: &dyn StorageCatalog,
    options: &SessionOptions,
) -> StorageItem {
    let mut metadata = ItemMetadata::new();
    metadata.insert("sessionId".to_string(), session_id.to_string());
    metadata.insert("mediaProfile".to_string(), options.profile.as_str().to_string());

    match catalog.create_item(&metadata).await {
        Ok(item) => {
            info!(session_id = %session_id, item = %item.id, "Allocated repository item");
            StorageItem::from_catalog(item)
        }
        Err(e) => {
            let item = fallback_item(&options.fallback_dir, options.profile);
            warn!(session_id = %session_id, url = %item.url, "Repository unavailable, recording locally: {}", e);
            StorageItem::from_fallback(item)
        }
    }
}
