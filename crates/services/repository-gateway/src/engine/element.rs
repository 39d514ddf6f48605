//! Typed handles over media server objects

use super::{EngineConnection, EngineEventKind, IceCandidate, MediaProfile, ObjectId};
use crate::Result;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Anything that can be wired into a pipeline
///
/// Elements are borrowed across `.await` inside session workers, so they must
/// be shareable between threads.
pub trait MediaElement: Send + Sync {
    /// Server-side object id
    fn object_id(&self) -> &str;
}

/// Handle to a media pipeline
///
/// Releasing the pipeline releases all of its endpoints. Release is idempotent:
/// only the first call reaches the server.
pub struct MediaPipeline {
    id: ObjectId,
    connection: Arc<dyn EngineConnection>,
    released: AtomicBool,
}

impl MediaPipeline {
    /// Create a new pipeline on `connection`
    pub async fn create(connection: Arc<dyn EngineConnection>) -> Result<Self> {
        let id = connection.create_pipeline().await?;
        Ok(Self {
            id,
            connection,
            released: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Create a WebRTC endpoint bound to this pipeline
    pub async fn create_webrtc_endpoint(&self) -> Result<WebRtcEndpoint> {
        let id = self.connection.create_webrtc_endpoint(&self.id).await?;
        Ok(WebRtcEndpoint {
            id,
            connection: Arc::clone(&self.connection),
        })
    }

    /// Create a recorder endpoint writing to `uri`
    pub async fn create_recorder_endpoint(
        &self,
        uri: &str,
        profile: MediaProfile,
    ) -> Result<RecorderEndpoint> {
        let id = self
            .connection
            .create_recorder_endpoint(&self.id, uri, profile)
            .await?;
        Ok(RecorderEndpoint {
            id,
            connection: Arc::clone(&self.connection),
        })
    }

    /// Create a player endpoint reading from `uri`
    pub async fn create_player_endpoint(&self, uri: &str) -> Result<PlayerEndpoint> {
        let id = self.connection.create_player_endpoint(&self.id, uri).await?;
        Ok(PlayerEndpoint {
            id,
            connection: Arc::clone(&self.connection),
        })
    }

    /// Release the pipeline and everything inside it
    pub async fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            debug!(pipeline = %self.id, "Pipeline already released");
            return Ok(());
        }
        self.connection.release(&self.id).await
    }
}

impl fmt::Debug for MediaPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaPipeline")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Handle to a WebRTC endpoint
pub struct WebRtcEndpoint {
    id: ObjectId,
    connection: Arc<dyn EngineConnection>,
}

impl WebRtcEndpoint {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Route this endpoint's media into `sink`
    pub async fn connect(&self, sink: &dyn MediaElement) -> Result<()> {
        self.connection.connect(&self.id, sink.object_id()).await
    }

    /// Ask the server to push locally gathered candidates as events
    pub async fn subscribe_ice_candidates(&self) -> Result<()> {
        self.connection
            .subscribe(&self.id, EngineEventKind::IceCandidateFound)
            .await
    }

    /// Negotiate: process the remote offer, returning the SDP answer
    pub async fn process_offer(&self, offer: &str) -> Result<String> {
        self.connection.process_offer(&self.id, offer).await
    }

    pub async fn gather_candidates(&self) -> Result<()> {
        self.connection.gather_candidates(&self.id).await
    }

    pub async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.connection.add_ice_candidate(&self.id, candidate).await
    }
}

impl MediaElement for WebRtcEndpoint {
    fn object_id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for WebRtcEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRtcEndpoint").field("id", &self.id).finish()
    }
}

/// Handle to a recorder endpoint
pub struct RecorderEndpoint {
    id: ObjectId,
    connection: Arc<dyn EngineConnection>,
}

impl RecorderEndpoint {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn record(&self) -> Result<()> {
        self.connection.record(&self.id).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.connection.stop(&self.id).await
    }
}

impl MediaElement for RecorderEndpoint {
    fn object_id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for RecorderEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecorderEndpoint").field("id", &self.id).finish()
    }
}

/// Handle to a player endpoint
pub struct PlayerEndpoint {
    id: ObjectId,
    connection: Arc<dyn EngineConnection>,
}

impl PlayerEndpoint {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Route the played media into `sink`
    pub async fn connect(&self, sink: &dyn MediaElement) -> Result<()> {
        self.connection.connect(&self.id, sink.object_id()).await
    }

    pub async fn subscribe_end_of_stream(&self) -> Result<()> {
        self.connection
            .subscribe(&self.id, EngineEventKind::EndOfStream)
            .await
    }

    pub async fn subscribe_errors(&self) -> Result<()> {
        self.connection.subscribe(&self.id, EngineEventKind::Error).await
    }

    pub async fn play(&self) -> Result<()> {
        self.connection.play(&self.id).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.connection.stop(&self.id).await
    }
}

impl MediaElement for PlayerEndpoint {
    fn object_id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for PlayerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerEndpoint").field("id", &self.id).finish()
    }
}
