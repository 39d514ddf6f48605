//! Scripted in-process media engine
//!
//! Records every call, tracks which server objects are alive, and lets tests
//! inject failures or push events. Used by the unit tests and the integration
//! harness; nothing in it talks to a real media server.

use super::{
    EngineConnection, EngineEvent, EngineEventKind, EngineEventSender, IceCandidate, MediaEngine,
    MediaProfile, ObjectId,
};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A call observed by the mock
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    OpenConnection { connection: u64 },
    CreatePipeline { pipeline: ObjectId },
    CreateWebRtcEndpoint { pipeline: ObjectId, endpoint: ObjectId },
    CreateRecorderEndpoint {
        pipeline: ObjectId,
        endpoint: ObjectId,
        uri: String,
        profile: MediaProfile,
    },
    CreatePlayerEndpoint {
        pipeline: ObjectId,
        endpoint: ObjectId,
        uri: String,
    },
    ConnectElements { source: ObjectId, sink: ObjectId },
    ProcessOffer { endpoint: ObjectId, offer: String },
    GatherCandidates { endpoint: ObjectId },
    AddIceCandidate { endpoint: ObjectId, candidate: IceCandidate },
    Subscribe { object: ObjectId, kind: EngineEventKind },
    Record { recorder: ObjectId },
    Play { player: ObjectId },
    Stop { object: ObjectId },
    Release { object: ObjectId },
    CloseConnection { connection: u64 },
}

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    OpenConnection,
    CreatePipeline,
    CreateWebRtcEndpoint,
    CreateRecorderEndpoint,
    CreatePlayerEndpoint,
    ConnectElements,
    ProcessOffer,
    GatherCandidates,
    AddIceCandidate,
    Subscribe,
    Record,
    Play,
    Stop,
    Release,
}

/// Failure to inject on the next matching operation
#[derive(Debug, Clone, PartialEq)]
pub enum MockFailure {
    /// Server is out of capacity
    NotEnoughResources,
    /// Generic server fault with a description
    Fault(String),
}

/// Kind of a live mock object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Pipeline,
    WebRtcEndpoint,
    RecorderEndpoint,
    PlayerEndpoint,
}

impl ObjectKind {
    fn prefix(&self) -> &'static str {
        match self {
            ObjectKind::Pipeline => "pipeline",
            ObjectKind::WebRtcEndpoint => "webrtc",
            ObjectKind::RecorderEndpoint => "recorder",
            ObjectKind::PlayerEndpoint => "player",
        }
    }
}

#[derive(Debug)]
struct MockObject {
    kind: ObjectKind,
    pipeline: Option<ObjectId>,
    connection: u64,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    next_connection: u64,
    objects: HashMap<ObjectId, MockObject>,
    created: Vec<(ObjectKind, ObjectId)>,
    subscriptions: HashSet<(ObjectId, EngineEventKind)>,
    connections: HashMap<u64, EngineEventSender>,
    calls: Vec<EngineCall>,
    failures: HashMap<MockOperation, MockFailure>,
    local_candidates: usize,
}

impl MockState {
    fn take_failure(&mut self, op: MockOperation) -> Result<()> {
        match self.failures.remove(&op) {
            None => Ok(()),
            Some(MockFailure::NotEnoughResources) => {
                Err(Error::ResourceExhausted(format!("{:?} rejected by media server", op)))
            }
            Some(MockFailure::Fault(message)) => Err(Error::EngineFault(message)),
        }
    }

    fn allocate(&mut self, kind: ObjectKind, pipeline: Option<ObjectId>, connection: u64) -> ObjectId {
        self.next_id += 1;
        let id = format!("{}-{}", kind.prefix(), self.next_id);
        self.objects.insert(
            id.clone(),
            MockObject {
                kind,
                pipeline,
                connection,
            },
        );
        self.created.push((kind, id.clone()));
        id
    }

    fn require(&self, object: &str) -> Result<&MockObject> {
        self.objects
            .get(object)
            .ok_or_else(|| Error::EngineFault(format!("Object '{}' not found", object)))
    }

    fn require_pipeline(&self, pipeline: &str) -> Result<()> {
        match self.require(pipeline)?.kind {
            ObjectKind::Pipeline => Ok(()),
            other => Err(Error::EngineFault(format!(
                "Object '{}' is a {:?}, not a pipeline",
                pipeline, other
            ))),
        }
    }
}

/// In-process [`MediaEngine`] for tests
#[derive(Clone, Default)]
pub struct MockMediaEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockMediaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `count` local candidates on every `gather_candidates` of a subscribed endpoint
    pub fn with_local_candidates(self, count: usize) -> Self {
        self.state.lock().local_candidates = count;
        self
    }

    /// SDP answer the mock returns for `offer`
    pub fn answer_for(offer: &str) -> String {
        format!("answer:{}", offer)
    }

    /// Make the next call of `op` fail
    pub fn fail_next(&self, op: MockOperation, failure: MockFailure) {
        self.state.lock().failures.insert(op, failure);
    }

    /// Every call seen so far, in order
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    /// Ids of all objects not yet released
    pub fn live_objects(&self) -> Vec<ObjectId> {
        let mut ids: Vec<_> = self.state.lock().objects.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of live pipelines
    pub fn live_pipelines(&self) -> Vec<ObjectId> {
        let mut ids: Vec<_> = self
            .state
            .lock()
            .objects
            .iter()
            .filter(|(_, o)| o.kind == ObjectKind::Pipeline)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Number of connections not yet closed
    pub fn open_connections(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Most recently created object of `kind`, live or not
    pub fn last_object_of(&self, kind: ObjectKind) -> Option<ObjectId> {
        self.state
            .lock()
            .created
            .iter()
            .rev()
            .find(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
    }

    /// Push an event to the connection owning the event's source
    ///
    /// Returns `false` if the source is unknown or its connection is closed.
    pub fn emit(&self, event: EngineEvent) -> bool {
        let state = self.state.lock();
        let Some(object) = state.objects.get(event.source()) else {
            return false;
        };
        match state.connections.get(&object.connection) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn connect(&self, events: EngineEventSender) -> Result<Arc<dyn EngineConnection>> {
        let mut state = self.state.lock();
        state.take_failure(MockOperation::OpenConnection)?;
        state.next_connection += 1;
        let id = state.next_connection;
        state.connections.insert(id, events);
        state.calls.push(EngineCall::OpenConnection { connection: id });
        Ok(Arc::new(MockConnection {
            id,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockConnection {
    id: u64,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl EngineConnection for MockConnection {
    async fn create_pipeline(&self) -> Result<ObjectId> {
        let mut state = self.state.lock();
        state.take_failure(MockOperation::CreatePipeline)?;
        let pipeline = state.allocate(ObjectKind::Pipeline, None, self.id);
        state.calls.push(EngineCall::CreatePipeline {
            pipeline: pipeline.clone(),
        });
        Ok(pipeline)
    }

    async fn create_webrtc_endpoint(&self, pipeline: &str) -> Result<ObjectId> {
        let mut state = self.state.lock();
        state.take_failure(MockOperation::CreateWebRtcEndpoint)?;
        state.require_pipeline(pipeline)?;
        let endpoint = state.allocate(ObjectKind::WebRtcEndpoint, Some(pipeline.to_string()), self.id);
        state.calls.push(EngineCall::CreateWebRtcEndpoint {
            pipeline: pipeline.to_string(),
            endpoint: endpoint.clone(),
        });
        Ok(endpoint)
    }

    async fn create_recorder_endpoint(
        &self,
        pipeline: &str,
        uri: &str,
        profile: MediaProfile,
    ) -> Result<ObjectId> {
        let mut state = self.state.lock();
        state.take_failure(MockOperation::CreateRecorderEndpoint)?;
        state.require_pipeline(pipeline)?;
        let endpoint = state.allocate(ObjectKind::RecorderEndpoint, Some(pipeline.to_string()), self.id);
        state.calls.push(EngineCall::CreateRecorderEndpoint {
            pipeline: pipeline.to_string(),
            endpoint: endpoint.clone(),
            uri: uri.to_string(),
            profile,
        });
        Ok(endpoint)
    }

    async fn create_player_endpoint(&self, pipeline: &str, uri: &str) -> Result<ObjectId> {
        let mut state = self.state.lock();
        state.take_failure(MockOperation::CreatePlayerEndpoint)?;
        state.require_pipeline(pipeline)?;
        let endpoint = state.allocate(ObjectKind::PlayerEndpoint, Some(pipeline.to_string()), self.id);
        state.calls.push(EngineCall::CreatePlayerEndpoint {
            pipeline: pipeline.to_string(),
            endpoint: endpoint.clone(),
            uri: uri.to_string(),
        });
        Ok(endpoint)
    }

    async fn connect(&self, source: &str, sink: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure(MockOperation::ConnectElements)?;
        state.require(source)?;
        state.require(sink)?;
        state.calls.push(EngineCall::ConnectElements {
            source: source.to_string(),
            sink: sink.to_string(),
        });
        Ok(())
    }

    async fn process_offer(&self, endpoint: &str, offer: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.take_failure(MockOperation::ProcessOffer)?;
        state.require(endpoint)?;
        state.calls.push(EngineCall::ProcessOffer {
            endpoint: endpoint.to_string(),
            offer: offer.to_string(),
        });
        Ok(MockMediaEngine::answer_for(offer))
    }

    async fn gather_candidates(&self, endpoint: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure(MockOperation::GatherCandidates)?;
        state.require(endpoint)?;
        state.calls.push(EngineCall::GatherCandidates {
            endpoint: endpoint.to_string(),
        });

        let subscribed = state
            .subscriptions
            .contains(&(endpoint.to_string(), EngineEventKind::IceCandidateFound));
        if subscribed {
            if let Some(tx) = state.connections.get(&self.id) {
                for i in 0..state.local_candidates {
                    let candidate = IceCandidate::new(
                        format!("candidate:{} 1 UDP 2122260223 127.0.0.1 {} typ host", i, 40000 + i),
                        "0",
                        0,
                    );
                    let _ = tx.send(EngineEvent::IceCandidateFound {
                        source: endpoint.to_string(),
                        candidate,
                    });
                }
            }
        }
        Ok(())
    }

    async fn add_ice_candidate(&self, endpoint: &str, candidate: &IceCandidate) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure(MockOperation::AddIceCandidate)?;
        state.require(endpoint)?;
        state.calls.push(EngineCall::AddIceCandidate {
            endpoint: endpoint.to_string(),
            candidate: candidate.clone(),
        });
        Ok(())
    }

    async fn subscribe(&self, object: &str, kind: EngineEventKind) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure(MockOperation::Subscribe)?;
        state.require(object)?;
        state.subscriptions.insert((object.to_string(), kind));
        state.calls.push(EngineCall::Subscribe {
            object: object.to_string(),
            kind,
        });
        Ok(())
    }

    async fn record(&self, recorder: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure(MockOperation::Record)?;
        state.require(recorder)?;
        state.calls.push(EngineCall::Record {
            recorder: recorder.to_string(),
        });
        Ok(())
    }

    async fn play(&self, player: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure(MockOperation::Play)?;
        state.require(player)?;
        state.calls.push(EngineCall::Play {
            player: player.to_string(),
        });
        Ok(())
    }

    async fn stop(&self, object: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure(MockOperation::Stop)?;
        state.require(object)?;
        state.calls.push(EngineCall::Stop {
            object: object.to_string(),
        });
        Ok(())
    }

    async fn release(&self, object: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.take_failure(MockOperation::Release)?;
        let kind = state.require(object)?.kind;
        state.calls.push(EngineCall::Release {
            object: object.to_string(),
        });

        let mut doomed = vec![object.to_string()];
        if kind == ObjectKind::Pipeline {
            doomed.extend(
                state
                    .objects
                    .iter()
                    .filter(|(_, o)| o.pipeline.as_deref() == Some(object))
                    .map(|(id, _)| id.clone()),
            );
        }
        for id in doomed {
            state.objects.remove(&id);
            state.subscriptions.retain(|(o, _)| *o != id);
        }
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.state.lock();
        if state.connections.remove(&self.id).is_some() {
            state
                .calls
                .push(EngineCall::CloseConnection { connection: self.id });
        }
    }
}
