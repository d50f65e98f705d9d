//! Integration tests for the relay-mcp system.

use std::sync::Arc;
use std::time::Duration;

use relay_mcp::{GetStateResponse, SendAndWaitResponse, SetConfigParams};
use relay_mcp_core::{
    ConnectionState, OutboundEnvelope, ReplyEnvelope, SessionConfig, SessionConfigPatch,
};
use relay_mcp_session::BridgeSession;
use relay_mcp_transport::testing::MockTransport;

fn test_config() -> SessionConfig {
    SessionConfig {
        server_url: "http://localhost:3000".to_string(),
        user_id: "user-1".to_string(),
        world_id: "world-1".to_string(),
        target_id: "agent-1".to_string(),
        channel_id: "agent-1".to_string(),
        connect_timeout_ms: 1_000,
        response_timeout_ms: 5_000,
    }
}

/// Let the mock's forwarding tasks drain their queues.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_full_session_pipeline() {
    let transport = Arc::new(MockTransport::new());
    let session = BridgeSession::new(test_config(), transport.clone()).unwrap();

    // Connect: one transport open, one join envelope for the target channel
    session.connect().await.unwrap();
    settle().await;
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(transport.open_count(), 1);

    let handle = transport.last_handle();
    let emitted = handle.emitted();
    assert_eq!(emitted.len(), 1, "expected exactly one join envelope");
    match &emitted[0] {
        OutboundEnvelope::Join(join) => {
            assert_eq!(join.channel_id, "agent-1");
            assert_eq!(join.target_ids, vec!["agent-1".to_string()]);
        }
        other => panic!("expected a join envelope, got {other:?}"),
    }

    // Send: one SEND envelope carrying the configured identities
    let correlation_id = session.send("hello").await.unwrap();
    settle().await;
    let emitted = handle.emitted();
    assert_eq!(emitted.len(), 1, "expected exactly one send envelope");
    match &emitted[0] {
        OutboundEnvelope::Send(send) => {
            assert_eq!(send.text, "hello");
            assert_eq!(send.sender_id, "user-1");
            assert_eq!(send.target_id, "agent-1");
            assert_eq!(send.world_id, "world-1");
            assert_eq!(send.correlation_id, correlation_id);
        }
        other => panic!("expected a send envelope, got {other:?}"),
    }

    // A reply that lands before anyone waits is queued, then handed to
    // the next waiter in FIFO order
    handle.broadcast(ReplyEnvelope::new("agent-1", "world"));
    settle().await;
    assert_eq!(session.status().queued_replies, 1);

    let reply = session.wait_for_next(Some(1_000)).await.unwrap();
    assert_eq!(reply.text, "world");
    assert_eq!(reply.sender_id, "agent-1");
    assert_eq!(session.status().queued_replies, 0);

    // Disconnect: the close reaches the transport and the state lands
    session.disconnect();
    settle().await;
    assert!(handle.was_closed());
    assert_eq!(session.state(), ConnectionState::Disconnected);

    println!("\n✓ Integration test passed!");
}

#[tokio::test]
async fn test_send_and_wait_round_trip() {
    let transport = Arc::new(MockTransport::new());
    let session = BridgeSession::new(test_config(), transport.clone()).unwrap();

    session.connect().await.unwrap();
    settle().await;
    let handle = transport.last_handle();

    // Reply lands while the call is waiting
    let replier = {
        let handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.broadcast(ReplyEnvelope::new("agent-1", "pong"));
        })
    };

    let outcome = session.send_and_await("ping").await.unwrap();
    replier.await.unwrap();

    assert!(!outcome.is_timeout());
    let reply = outcome.reply.expect("reply should be present");
    assert_eq!(reply.text, "pong");
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn test_critical_reconfigure_reconnects() {
    let transport = Arc::new(MockTransport::new());
    let session = BridgeSession::new(test_config(), transport.clone()).unwrap();

    session.connect().await.unwrap();
    settle().await;
    assert_eq!(transport.open_count(), 1);

    let outcome = session
        .set_config(SessionConfigPatch {
            target_id: Some("agent-2".to_string()),
            channel_id: Some("agent-2".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    settle().await;

    assert!(outcome.critical);
    assert!(outcome.reconnected);
    assert_eq!(transport.open_count(), 2);
    assert_eq!(session.config().target_id, "agent-2");

    // The fresh connection joins the new channel
    let handle = transport.last_handle();
    let emitted = handle.emitted();
    assert_eq!(emitted.len(), 1, "expected exactly one join envelope");
    match &emitted[0] {
        OutboundEnvelope::Join(join) => assert_eq!(join.channel_id, "agent-2"),
        other => panic!("expected a join envelope, got {other:?}"),
    }
}

#[test]
fn test_send_and_wait_response_timeout_shape() {
    let response = SendAndWaitResponse {
        reply: None,
        sender_id: None,
        error: Some("No response from agent-1 within 5000ms".to_string()),
        elapsed_ms: 5_000,
        timed_out: true,
    };
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["timed_out"], serde_json::json!(true));
    assert!(value.get("reply").is_none(), "reply key should be omitted");
    assert!(value.get("sender_id").is_none());
    assert!(value["error"].as_str().unwrap().contains("5000ms"));
}

#[test]
fn test_send_and_wait_response_reply_shape() {
    let response = SendAndWaitResponse {
        reply: Some("pong".to_string()),
        sender_id: Some("agent-1".to_string()),
        error: None,
        elapsed_ms: 42,
        timed_out: false,
    };
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(value["reply"], serde_json::json!("pong"));
    assert_eq!(value["sender_id"], serde_json::json!("agent-1"));
    assert!(value.get("error").is_none(), "error key should be omitted");
}

#[test]
fn test_set_config_params_convert_to_patch() {
    let params = SetConfigParams {
        target_id: Some("agent-9".to_string()),
        channel_id: Some("agent-9".to_string()),
        response_timeout_ms: Some(1_234),
        ..Default::default()
    };
    let patch: SessionConfigPatch = params.into();
    assert_eq!(patch.target_id.as_deref(), Some("agent-9"));
    assert_eq!(patch.channel_id.as_deref(), Some("agent-9"));
    assert_eq!(patch.response_timeout_ms, Some(1_234));
    assert!(patch.server_url.is_none());
    assert!(patch.user_id.is_none());
}

#[test]
fn test_get_state_response_omits_unknown_connect_time() {
    let response = GetStateResponse {
        state: "disconnected".to_string(),
        connected: false,
        joined: false,
        queued_replies: 0,
        outstanding_waiters: 0,
        last_connect_ms: None,
        target_id: "agent-1".to_string(),
        channel_id: "agent-1".to_string(),
    };
    let value = serde_json::to_value(&response).unwrap();
    assert!(value.get("last_connect_ms").is_none());
    assert_eq!(value["connected"], serde_json::json!(false));
}
