//! Kurento JSON-RPC 2.0 message types

use crate::engine::{EngineEvent, EngineEventKind, IceCandidate, MediaProfile};
use crate::Error;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// JSON-RPC 2.0 protocol version
pub const JSONRPC_VERSION: &str = "2.0";

/// Notification method the server uses for subscribed events
pub const ON_EVENT_METHOD: &str = "onEvent";

/// `error.data.type` reported when the server cannot allocate an element
pub const NOT_ENOUGH_RESOURCES: &str = "NOT_ENOUGH_RESOURCES";

/// JSON-RPC 2.0 request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    /// Protocol version (must be "2.0")
    pub jsonrpc: String,

    /// Request ID for matching with the response
    pub id: u64,

    /// Method name to invoke
    pub method: String,

    /// Method parameters
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    /// Error code
    pub code: i64,

    /// Human-readable error message
    pub message: String,

    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Server-side error type tag (`data.type`), if any
    pub fn error_type(&self) -> Option<&str> {
        self.data.as_ref()?.get("type")?.as_str()
    }

    /// Map the server error onto the gateway error taxonomy
    pub fn into_error(self) -> Error {
        if self.error_type() == Some(NOT_ENOUGH_RESOURCES) {
            Error::ResourceExhausted(self.message)
        } else {
            Error::EngineFault(format!("{} (code {})", self.message, self.code))
        }
    }
}

/// Anything the server may send: a response to one of our requests or a
/// notification
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IncomingMessage {
    #[serde(default)]
    pub id: Option<u64>,

    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub params: Option<Value>,

    #[serde(default)]
    pub result: Option<Value>,

    #[serde(default)]
    pub error: Option<ErrorObject>,
}

impl IncomingMessage {
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.is_some()
    }
}

/// Params of `create` for a `MediaPipeline`
pub fn create_pipeline_params() -> Value {
    json!({
        "type": "MediaPipeline",
        "constructorParams": {},
        "properties": {},
    })
}

/// Params of `create` for a `WebRtcEndpoint`
pub fn create_webrtc_params(pipeline: &str) -> Value {
    json!({
        "type": "WebRtcEndpoint",
        "constructorParams": { "mediaPipeline": pipeline },
        "properties": {},
    })
}

/// Params of `create` for a `RecorderEndpoint`
pub fn create_recorder_params(pipeline: &str, uri: &str, profile: MediaProfile) -> Value {
    json!({
        "type": "RecorderEndpoint",
        "constructorParams": {
            "mediaPipeline": pipeline,
            "uri": uri,
            "mediaProfile": profile.as_str(),
        },
        "properties": {},
    })
}

/// Params of `create` for a `PlayerEndpoint`
pub fn create_player_params(pipeline: &str, uri: &str) -> Value {
    json!({
        "type": "PlayerEndpoint",
        "constructorParams": { "mediaPipeline": pipeline, "uri": uri },
        "properties": {},
    })
}

/// Params of `invoke`
pub fn invoke_params(object: &str, operation: &str, operation_params: Value) -> Value {
    json!({
        "object": object,
        "operation": operation,
        "operationParams": operation_params,
    })
}

/// Params of `subscribe`
pub fn subscribe_params(object: &str, kind: EngineEventKind) -> Value {
    json!({ "object": object, "type": kind.as_str() })
}

/// Params of `release`
pub fn release_params(object: &str) -> Value {
    json!({ "object": object })
}

/// Complex-type encoding of an ICE candidate
pub fn ice_candidate_value(candidate: &IceCandidate) -> Value {
    json!({
        "__module__": "kurento",
        "__type__": "IceCandidate",
        "candidate": candidate.candidate,
        "sdpMid": candidate.sdp_mid,
        "sdpMLineIndex": candidate.sdp_m_line_index,
    })
}

/// Extract `result.value` as a string
pub fn value_as_string(result: &Value) -> Option<String> {
    result.get("value")?.as_str().map(str::to_string)
}

/// Decode the params of an `onEvent` notification
///
/// Returns `None` for event types the gateway does not subscribe to.
pub fn parse_event(params: &Value) -> Option<EngineEvent> {
    let value = params.get("value")?;
    let data = value.get("data")?;
    let source = data
        .get("source")
        .or_else(|| value.get("object"))?
        .as_str()?
        .to_string();
    let event_type = value
        .get("type")
        .or_else(|| data.get("type"))?
        .as_str()?;

    match event_type {
        "IceCandidateFound" | "OnIceCandidate" => {
            let candidate = serde_json::from_value(data.get("candidate")?.clone()).ok()?;
            Some(EngineEvent::IceCandidateFound { source, candidate })
        }
        "EndOfStream" => Some(EngineEvent::EndOfStream { source }),
        "Error" => {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            Some(EngineEvent::Error {
                source,
                description,
            })
        }
        _ => None,
    }
}
