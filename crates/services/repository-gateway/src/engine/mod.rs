//! Media server control plane
//!
//! The gateway never touches media itself. Pipelines, endpoints, SDP answers and
//! ICE gathering all live in an external media server reached through an
//! [`EngineConnection`]. Each session opens its own connection and receives the
//! server's asynchronous notifications as typed [`EngineEvent`]s on a channel,
//! so they can be processed in order with the session's client requests.

pub mod element;
pub mod kurento;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use element::{MediaElement, MediaPipeline, PlayerEndpoint, RecorderEndpoint, WebRtcEndpoint};

/// Opaque identifier of an object living inside the media server
pub type ObjectId = String;

/// Sending half of a session's engine event queue
pub type EngineEventSender = mpsc::UnboundedSender<EngineEvent>;

/// Receiving half of a session's engine event queue
pub type EngineEventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// ICE candidate exchanged between the browser and the media server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate line (`candidate:...`)
    pub candidate: String,

    /// Media stream identification tag
    #[serde(rename = "sdpMid")]
    pub sdp_mid: String,

    /// Index of the m-line the candidate belongs to
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_m_line_index: u32,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>, sdp_mid: impl Into<String>, sdp_m_line_index: u32) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: sdp_mid.into(),
            sdp_m_line_index,
        }
    }
}

/// Recording container/track profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaProfile {
    /// WebM with audio and video (default)
    #[default]
    Webm,
    /// MP4 with audio and video
    Mp4,
    /// WebM, audio track only
    WebmAudioOnly,
    /// WebM, video track only
    WebmVideoOnly,
    /// MP4, audio track only
    Mp4AudioOnly,
    /// MP4, video track only
    Mp4VideoOnly,
}

impl MediaProfile {
    /// Name understood by the media server
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaProfile::Webm => "WEBM",
            MediaProfile::Mp4 => "MP4",
            MediaProfile::WebmAudioOnly => "WEBM_AUDIO_ONLY",
            MediaProfile::WebmVideoOnly => "WEBM_VIDEO_ONLY",
            MediaProfile::Mp4AudioOnly => "MP4_AUDIO_ONLY",
            MediaProfile::Mp4VideoOnly => "MP4_VIDEO_ONLY",
        }
    }

    /// File extension of the recorded container
    pub fn extension(&self) -> &'static str {
        match self {
            MediaProfile::Webm | MediaProfile::WebmAudioOnly | MediaProfile::WebmVideoOnly => "webm",
            MediaProfile::Mp4 | MediaProfile::Mp4AudioOnly | MediaProfile::Mp4VideoOnly => "mp4",
        }
    }
}

impl fmt::Display for MediaProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MediaProfile {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "WEBM" => Ok(MediaProfile::Webm),
            "MP4" => Ok(MediaProfile::Mp4),
            "WEBM_AUDIO_ONLY" => Ok(MediaProfile::WebmAudioOnly),
            "WEBM_VIDEO_ONLY" => Ok(MediaProfile::WebmVideoOnly),
            "MP4_AUDIO_ONLY" => Ok(MediaProfile::Mp4AudioOnly),
            "MP4_VIDEO_ONLY" => Ok(MediaProfile::Mp4VideoOnly),
            other => Err(crate::Error::InvalidConfig(format!(
                "unknown media profile: {}",
                other
            ))),
        }
    }
}

/// Kinds of server-side events a session can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEventKind {
    /// Local ICE candidate gathered by a WebRTC endpoint
    IceCandidateFound,
    /// Player reached the end of its source
    EndOfStream,
    /// Element reported an error
    Error,
}

impl EngineEventKind {
    /// Event type name used by the media server
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineEventKind::IceCandidateFound => "IceCandidateFound",
            EngineEventKind::EndOfStream => "EndOfStream",
            EngineEventKind::Error => "Error",
        }
    }
}

/// Asynchronous notification pushed by the media server
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A WebRTC endpoint produced a local candidate
    IceCandidateFound {
        /// Endpoint that gathered the candidate
        source: ObjectId,
        /// The candidate
        candidate: IceCandidate,
    },

    /// A player finished its source
    EndOfStream {
        /// Player endpoint
        source: ObjectId,
    },

    /// An element failed
    Error {
        /// Failing element
        source: ObjectId,
        /// Server-provided description
        description: String,
    },
}

impl EngineEvent {
    /// Object that emitted the event
    pub fn source(&self) -> &str {
        match self {
            EngineEvent::IceCandidateFound { source, .. }
            | EngineEvent::EndOfStream { source }
            | EngineEvent::Error { source, .. } => source,
        }
    }

    /// Kind of this event
    pub fn kind(&self) -> EngineEventKind {
        match self {
            EngineEvent::IceCandidateFound { .. } => EngineEventKind::IceCandidateFound,
            EngineEvent::EndOfStream { .. } => EngineEventKind::EndOfStream,
            EngineEvent::Error { .. } => EngineEventKind::Error,
        }
    }
}

/// Factory for per-session media server connections
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Open a control connection dedicated to one session
    ///
    /// Every event the server emits for objects created through the returned
    /// connection is delivered to `events`.
    async fn connect(&self, events: EngineEventSender) -> Result<Arc<dyn EngineConnection>>;
}

/// Control connection to the media server
///
/// This is the raw, object-id based surface. Sessions use the typed wrappers in
/// [`element`] instead of calling it directly.
#[async_trait]
pub trait EngineConnection: Send + Sync {
    /// Create a media pipeline
    async fn create_pipeline(&self) -> Result<ObjectId>;

    /// Create a WebRTC endpoint inside `pipeline`
    async fn create_webrtc_endpoint(&self, pipeline: &str) -> Result<ObjectId>;

    /// Create a recorder endpoint writing to `uri`
    async fn create_recorder_endpoint(
        &self,
        pipeline: &str,
        uri: &str,
        profile: MediaProfile,
    ) -> Result<ObjectId>;

    /// Create a player endpoint reading from `uri`
    async fn create_player_endpoint(&self, pipeline: &str, uri: &str) -> Result<ObjectId>;

    /// Connect the media output of `source` to `sink`
    async fn connect(&self, source: &str, sink: &str) -> Result<()>;

    /// Process an SDP offer and return the answer
    async fn process_offer(&self, endpoint: &str, offer: &str) -> Result<String>;

    /// Start ICE candidate gathering
    async fn gather_candidates(&self, endpoint: &str) -> Result<()>;

    /// Add a remote ICE candidate
    async fn add_ice_candidate(&self, endpoint: &str, candidate: &IceCandidate) -> Result<()>;

    /// Subscribe to an event kind on an object
    async fn subscribe(&self, object: &str, kind: EngineEventKind) -> Result<()>;

    /// Start recording
    async fn record(&self, recorder: &str) -> Result<()>;

    /// Start playback
    async fn play(&self, player: &str) -> Result<()>;

    /// Stop a recorder or player
    async fn stop(&self, object: &str) -> Result<()>;

    /// Release an object; releasing a pipeline releases everything inside it
    async fn release(&self, object: &str) -> Result<()>;

    /// Tear down the connection
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ice_candidate_wire_names() {
        let candidate = IceCandidate::new("candidate:1 1 UDP 2122 10.0.0.1 5000 typ host", "0", 0);
        let json = serde_json::to_value(&candidate).unwrap();
        assert_eq!(json["sdpMid"], "0");
        assert_eq!(json["sdpMLineIndex"], 0);
        assert!(json["candidate"].as_str().unwrap().starts_with("candidate:"));
    }

    #[test]
    fn test_media_profile_parsing() {
        assert_eq!("webm".parse::<MediaProfile>().unwrap(), MediaProfile::Webm);
        assert_eq!(
            "MP4_AUDIO_ONLY".parse::<MediaProfile>().unwrap(),
            MediaProfile::Mp4AudioOnly
        );
        assert!("ogg".parse::<MediaProfile>().is_err());
    }

    #[test]
    fn test_media_profile_extension() {
        assert_eq!(MediaProfile::Webm.extension(), "webm");
        assert_eq!(MediaProfile::WebmVideoOnly.extension(), "webm");
        assert_eq!(MediaProfile::Mp4.extension(), "mp4");
    }

    #[test]
    fn test_media_profile_serde() {
        let json = serde_json::to_string(&MediaProfile::WebmAudioOnly).unwrap();
        assert_eq!(json, "\"WEBM_AUDIO_ONLY\"");
    }

    #[test]
    fn test_event_source() {
        let event = EngineEvent::EndOfStream {
            source: "player-1".to_string(),
        };
        assert_eq!(event.source(), "player-1");
        assert_eq!(event.kind(), EngineEventKind::EndOfStream);
    }
}
