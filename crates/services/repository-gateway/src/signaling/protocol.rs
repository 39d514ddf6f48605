//! Client control protocol
//!
//! Every message is one JSON object whose string `id` field names its kind.

use crate::engine::IceCandidate;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound message kinds the gateway understands
pub const CLIENT_MESSAGE_IDS: [&str; 5] = ["start", "stop", "play", "stopPlay", "onIceCandidate"];

/// Message sent by the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Begin recording
    Start {
        #[serde(rename = "sdpOffer")]
        sdp_offer: String,
    },

    /// Stop recording
    Stop,

    /// Play back the recording
    Play {
        #[serde(rename = "sdpOffer")]
        sdp_offer: String,
    },

    /// Stop playback
    StopPlay,

    /// Trickled remote ICE candidate
    OnIceCandidate { candidate: IceCandidate },
}

impl ClientMessage {
    /// Decode a raw text frame
    ///
    /// Unknown kinds produce `Invalid message with id <id>`; known kinds with
    /// missing or mistyped fields are reported with the kind name.
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::Protocol(format!("Malformed message: {}", e)))?;

        let id = match value.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => return Err(Error::Protocol(format!("Invalid message with id {}", other))),
            None => return Err(Error::Protocol("Message has no id".to_string())),
        };

        if !CLIENT_MESSAGE_IDS.contains(&id.as_str()) {
            return Err(Error::Protocol(format!("Invalid message with id {}", id)));
        }

        serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("Invalid '{}' message: {}", id, e)))
    }

    /// Wire name of this message kind
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Start { .. } => "start",
            ClientMessage::Stop => "stop",
            ClientMessage::Play { .. } => "play",
            ClientMessage::StopPlay => "stopPlay",
            ClientMessage::OnIceCandidate { .. } => "onIceCandidate",
        }
    }
}

/// Message pushed to the browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "camelCase")]
pub enum ServerMessage {
    /// SDP answer for a recording negotiation
    StartResponse {
        #[serde(rename = "sdpAnswer")]
        sdp_answer: String,
    },

    /// SDP answer for a playback negotiation
    PlayResponse {
        #[serde(rename = "sdpAnswer")]
        sdp_answer: String,
    },

    /// Locally gathered ICE candidate
    IceCandidate { candidate: IceCandidate },

    /// Playback finished or failed
    PlayEnd,

    /// Request failed; the session has been released
    Error {
        message: String,
        /// Machine-readable error category
        category: String,
    },

    /// Media server has no capacity; the session has been released
    NotEnoughResources,
}

impl ServerMessage {
    pub fn error(err: &Error) -> Self {
        ServerMessage::Error {
            message: err.to_string(),
            category: err.category().to_string(),
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name of this message kind
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::StartResponse { .. } => "startResponse",
            ServerMessage::PlayResponse { .. } => "playResponse",
            ServerMessage::IceCandidate { .. } => "iceCandidate",
            ServerMessage::PlayEnd => "playEnd",
            ServerMessage::Error { .. } => "error",
            ServerMessage::NotEnoughResources => "notEnoughResources",
        }
    }
}
