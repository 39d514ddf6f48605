//! End-to-end tests over a real WebSocket connection

mod harness;

use harness::{init_logging, wait_until, TestServer, WsTestClient};
use remotemedia_repository_gateway::engine::mock::MockMediaEngine;
use remotemedia_repository_gateway::ServerMessage;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_record_and_play_over_websocket() {
    init_logging();
    let server = TestServer::start().await.unwrap();
    let mut client = WsTestClient::connect(&server.url()).await.unwrap();

    client
        .send(json!({ "id": "start", "sdpOffer": "O1" }))
        .await
        .unwrap();
    assert_eq!(
        client.next().await.unwrap(),
        ServerMessage::StartResponse {
            sdp_answer: MockMediaEngine::answer_for("O1")
        }
    );

    client.send(json!({ "id": "stop" })).await.unwrap();
    client
        .send(json!({ "id": "play", "sdpOffer": "O2" }))
        .await
        .unwrap();
    assert_eq!(
        client.next().await.unwrap(),
        ServerMessage::PlayResponse {
            sdp_answer: MockMediaEngine::answer_for("O2")
        }
    );
    assert_eq!(server.harness.engine.live_pipelines().len(), 1);

    client.close().await.unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_candidates_follow_answer() {
    init_logging();
    let server = TestServer::start_with(MockMediaEngine::new().with_local_candidates(2))
        .await
        .unwrap();
    let mut client = WsTestClient::connect(&server.url()).await.unwrap();

    client
        .send(json!({ "id": "start", "sdpOffer": "O1" }))
        .await
        .unwrap();

    assert!(matches!(
        client.next().await.unwrap(),
        ServerMessage::StartResponse { .. }
    ));
    for _ in 0..2 {
        match client.next().await.unwrap() {
            ServerMessage::IceCandidate { candidate } => {
                assert!(candidate.candidate.starts_with("candidate:"))
            }
            other => panic!("expected iceCandidate, got {:?}", other),
        }
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_releases_session() {
    init_logging();
    let server = TestServer::start().await.unwrap();
    let mut client = WsTestClient::connect(&server.url()).await.unwrap();

    client
        .send(json!({ "id": "start", "sdpOffer": "O1" }))
        .await
        .unwrap();
    client.next().await.unwrap();
    assert_eq!(server.harness.session_count(), 1);

    // Close without sending stop
    client.close().await.unwrap();

    let engine = server.harness.engine.clone();
    let router = server.harness.router.clone();
    let released = wait_until(Duration::from_secs(2), || {
        router.registry().is_empty() && engine.live_objects().is_empty()
    })
    .await;
    assert!(released, "session not released after disconnect");
    assert!(wait_until(Duration::from_secs(1), || router.connection_count() == 0).await);
    server.harness.assert_no_leaks();

    server.shutdown().await;
}

#[tokio::test]
async fn test_protocol_error_over_websocket() {
    init_logging();
    let server = TestServer::start().await.unwrap();
    let mut client = WsTestClient::connect(&server.url()).await.unwrap();

    client.send(json!({ "sdpOffer": "O1" })).await.unwrap();

    assert_eq!(
        client.next().await.unwrap(),
        ServerMessage::Error {
            message: "Message has no id".to_string(),
            category: "protocol".to_string(),
        }
    );

    // The connection stays usable
    client
        .send(json!({ "id": "start", "sdpOffer": "O1" }))
        .await
        .unwrap();
    assert!(matches!(
        client.next().await.unwrap(),
        ServerMessage::StartResponse { .. }
    ));

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_path_is_rejected() {
    init_logging();
    let server = TestServer::start().await.unwrap();

    let url = format!("ws://{}/elsewhere", server.addr());
    assert!(WsTestClient::connect(&url).await.is_err());
    assert_eq!(server.harness.router.connection_count(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    init_logging();
    let server = TestServer::start().await.unwrap();
    let mut a = WsTestClient::connect(&server.url()).await.unwrap();
    let mut b = WsTestClient::connect(&server.url()).await.unwrap();

    for client in [&mut a, &mut b] {
        client
            .send(json!({ "id": "start", "sdpOffer": "O" }))
            .await
            .unwrap();
        client.next().await.unwrap();
    }
    assert_eq!(server.harness.session_count(), 2);

    let engine = server.harness.engine.clone();
    let router = server.harness.router.clone();
    server.shutdown().await;

    // Connection handlers may still be finishing their own release
    assert!(
        wait_until(Duration::from_secs(2), || {
            router.registry().is_empty() && engine.live_objects().is_empty()
        })
        .await
    );
    assert!(a.next().await.is_err());
}
