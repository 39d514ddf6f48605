//! Kurento Media Server backend
//!
//! Each session gets its own WebSocket connection to the media server, so the
//! server's `onEvent` notifications for that session's objects arrive on that
//! session's event channel only.

pub mod client;
pub mod protocol;

pub use client::JsonRpcClient;

use super::{
    EngineConnection, EngineEventKind, EngineEventSender, IceCandidate, MediaEngine, MediaProfile,
    ObjectId,
};
use crate::config::EngineConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// [`MediaEngine`] that talks JSON-RPC to a Kurento Media Server
#[derive(Debug, Clone)]
pub struct KurentoEngine {
    url: String,
    request_timeout: Duration,
}

impl KurentoEngine {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            request_timeout,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.url.clone(),
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MediaEngine for KurentoEngine {
    async fn connect(&self, events: EngineEventSender) -> Result<Arc<dyn EngineConnection>> {
        let client = JsonRpcClient::connect(&self.url, self.request_timeout, events).await?;
        info!(url = %self.url, "Opened media server connection");
        Ok(Arc::new(KurentoConnection { client }))
    }
}

/// One session's control connection
pub struct KurentoConnection {
    client: JsonRpcClient,
}

impl KurentoConnection {
    async fn create(&self, params: Value) -> Result<ObjectId> {
        let result = self.client.call("create", params).await?;
        protocol::value_as_string(&result)
            .ok_or_else(|| Error::EngineFault("create returned no object id".to_string()))
    }

    async fn invoke(&self, object: &str, operation: &str, operation_params: Value) -> Result<Value> {
        debug!(object, operation, "Invoking media server operation");
        self.client
            .call(
                "invoke",
                protocol::invoke_params(object, operation, operation_params),
            )
            .await
    }
}

#[async_trait]
impl EngineConnection for KurentoConnection {
    async fn create_pipeline(&self) -> Result<ObjectId> {
        self.create(protocol::create_pipeline_params()).await
    }

    async fn create_webrtc_endpoint(&self, pipeline: &str) -> Result<ObjectId> {
        self.create(protocol::create_webrtc_params(pipeline)).await
    }

    async fn create_recorder_endpoint(
        &self,
        pipeline: &str,
        uri: &str,
        profile: MediaProfile,
    ) -> Result<ObjectId> {
        self.create(protocol::create_recorder_params(pipeline, uri, profile))
            .await
    }

    async fn create_player_endpoint(&self, pipeline: &str, uri: &str) -> Result<ObjectId> {
        self.create(protocol::create_player_params(pipeline, uri))
            .await
    }

    async fn connect(&self, source: &str, sink: &str) -> Result<()> {
        self.invoke(source, "connect", json!({ "sink": sink })).await?;
        Ok(())
    }

    async fn process_offer(&self, endpoint: &str, offer: &str) -> Result<String> {
        let result = self
            .invoke(endpoint, "processOffer", json!({ "offer": offer }))
            .await?;
        protocol::value_as_string(&result)
            .ok_or_else(|| Error::EngineFault("processOffer returned no SDP answer".to_string()))
    }

    async fn gather_candidates(&self, endpoint: &str) -> Result<()> {
        self.invoke(endpoint, "gatherCandidates", json!({})).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, endpoint: &str, candidate: &IceCandidate) -> Result<()> {
        self.invoke(
            endpoint,
            "addIceCandidate",
            json!({ "candidate": protocol::ice_candidate_value(candidate) }),
        )
        .await?;
        Ok(())
    }

    async fn subscribe(&self, object: &str, kind: EngineEventKind) -> Result<()> {
        self.client
            .call("subscribe", protocol::subscribe_params(object, kind))
            .await?;
        Ok(())
    }

    async fn record(&self, recorder: &str) -> Result<()> {
        self.invoke(recorder, "record", json!({})).await?;
        Ok(())
    }

    async fn play(&self, player: &str) -> Result<()> {
        self.invoke(player, "play", json!({})).await?;
        Ok(())
    }

    async fn stop(&self, object: &str) -> Result<()> {
        self.invoke(object, "stop", json!({})).await?;
        Ok(())
    }

    async fn release(&self, object: &str) -> Result<()> {
        self.client
            .call("release", protocol::release_params(object))
            .await?;
        Ok(())
    }

    async fn close(&self) {
        self.client.close().await;
        debug!(session = ?self.client.session_id(), "Closed media server connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = EngineConfig {
            url: "ws://kms.local:8888/kurento".to_string(),
            request_timeout_ms: 5000,
        };
        let engine = KurentoEngine::from_config(&config);
        assert_eq!(engine.url(), "ws://kms.local:8888/kurento");
        assert_eq!(engine.request_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_connect_to_missing_server_fails() {
        let engine = KurentoEngine::new("ws://127.0.0.1:1/kurento", Duration::from_millis(200));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let err = engine.connect(tx).await.err().unwrap();
        assert_eq!(err.category(), "engine");
    }
}
