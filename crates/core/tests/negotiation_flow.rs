//! End-to-end lifecycle scenarios against in-memory doubles
//!
//! Exercises the coordinator loop the way the relay would: commands on one
//! side, raw inbound frames on the other.

mod harness;

use harness::{MemoryTransport, ScriptedFactory};
use peercall_core::{
    ConnectionManager, Error, ManagerEvent, SignalMessage, SignalingTransport, StartError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

/// Poll until `check` passes or the deadline expires
async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within deadline");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ManagerEvent>) -> ManagerEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("event within deadline")
        .expect("manager alive")
}

fn setup() -> (
    Arc<MemoryTransport>,
    Arc<ScriptedFactory>,
    ConnectionManager,
    mpsc::UnboundedReceiver<ManagerEvent>,
) {
    let transport = MemoryTransport::new();
    let factory = ScriptedFactory::new();
    let manager = ConnectionManager::new(transport.clone(), factory.clone());
    let events = manager.take_events().expect("events taken once");
    (transport, factory, manager, events)
}

#[tokio::test]
async fn test_initiator_call_reaches_connected() {
    let (transport, factory, manager, mut events) = setup();

    let handle = manager.start("peerA").await.expect("start succeeds");
    assert_eq!(handle.peer_id(), "peerA");

    // the offer went out with the expected wire shape
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        SignalMessage::Offer { peer_id, sdp } => {
            assert_eq!(peer_id, "peerA");
            assert!(sdp.starts_with("v=0"));
        }
        other => panic!("expected offer, got {:?}", other),
    }

    transport.push_inbound(r#"{"type":"answer","peer_id":"peerA","sdp":"v=0 remote"}"#);
    match next_event(&mut events).await {
        ManagerEvent::SessionConnected { peer_id } => assert_eq!(peer_id, "peerA"),
        other => panic!("expected SessionConnected, got {:?}", other),
    }

    let engine = factory.engine_for("peerA").unwrap();
    assert_eq!(engine.calls(), vec!["create_offer", "set_remote:Answer"]);
}

#[tokio::test]
async fn test_responder_answers_once_and_applies_candidates_in_order() {
    let (transport, factory, _manager, mut events) = setup();
    transport.connect().await.unwrap();

    transport.push_inbound(
        r#"{"type":"offer","peer_id":"peerB","sdp":"v=0 remote-offer"}"#,
    );
    match next_event(&mut events).await {
        ManagerEvent::SessionConnected { peer_id } => assert_eq!(peer_id, "peerB"),
        other => panic!("expected SessionConnected, got {:?}", other),
    }

    // exactly one answer went out
    assert_eq!(transport.sent_kinds(), vec!["answer"]);

    // candidates after the description are applied in arrival order
    transport.push_inbound(
        r#"{"type":"ice-candidate","peer_id":"peerB","candidate":{"candidate":"c1"}}"#,
    );
    transport.push_inbound(
        r#"{"type":"ice-candidate","peer_id":"peerB","candidate":{"candidate":"c2"}}"#,
    );

    // close flushes the loop deterministically
    transport.push_inbound(r#"{"type":"close","peer_id":"peerB"}"#);
    match next_event(&mut events).await {
        ManagerEvent::SessionClosed { peer_id } => assert_eq!(peer_id, "peerB"),
        other => panic!("expected SessionClosed, got {:?}", other),
    }

    let engine = factory.engine_for("peerB").unwrap();
    assert_eq!(
        engine.calls(),
        vec![
            "set_remote:Offer",
            "create_answer",
            "candidate:c1",
            "candidate:c2",
            "close"
        ]
    );
}

#[tokio::test]
async fn test_stop_mid_negotiation_sends_close_and_rejects_later_inbound() {
    let (transport, factory, manager, mut events) = setup();

    let handle = manager.start("peerA").await.unwrap();
    // no answer yet: session is OfferPending

    manager.stop(&handle).await;
    assert_eq!(transport.sent_kinds(), vec!["offer", "close"]);
    match next_event(&mut events).await {
        ManagerEvent::SessionClosed { peer_id } => assert_eq!(peer_id, "peerA"),
        other => panic!("expected SessionClosed, got {:?}", other),
    }
    assert!(factory.engine_for("peerA").unwrap().is_closed());

    // subsequent inbound for that peer is rejected with SessionClosed
    transport.push_inbound(
        r#"{"type":"ice-candidate","peer_id":"peerA","candidate":{"candidate":"late"}}"#,
    );
    match next_event(&mut events).await {
        ManagerEvent::MessageRejected { peer_id, error } => {
            assert_eq!(peer_id, "peerA");
            assert!(matches!(error, Error::SessionClosed(_)));
        }
        other => panic!("expected MessageRejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (transport, _factory, manager, mut events) = setup();

    let handle = manager.start("peerA").await.unwrap();
    manager.stop(&handle).await;
    match next_event(&mut events).await {
        ManagerEvent::SessionClosed { .. } => {}
        other => panic!("expected SessionClosed, got {:?}", other),
    }

    // second stop: no second close frame, no second event, no panic
    manager.stop(&handle).await;
    assert_eq!(transport.sent_kinds(), vec!["offer", "close"]);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_answer_out_of_turn_fails_session() {
    let (transport, factory, manager, mut events) = setup();
    let _handle = manager.start("peerA").await.unwrap();

    // complete the round, then a second answer is inconsistent with state
    transport.push_inbound(r#"{"type":"answer","peer_id":"peerA","sdp":"v=0 one"}"#);
    match next_event(&mut events).await {
        ManagerEvent::SessionConnected { .. } => {}
        other => panic!("expected SessionConnected, got {:?}", other),
    }

    transport.push_inbound(r#"{"type":"answer","peer_id":"peerA","sdp":"v=0 two"}"#);
    match next_event(&mut events).await {
        ManagerEvent::SessionFailed { peer_id, .. } => assert_eq!(peer_id, "peerA"),
        other => panic!("expected SessionFailed, got {:?}", other),
    }

    // the first description was not overwritten: the engine saw exactly one
    let engine = factory.engine_for("peerA").unwrap();
    let remotes = engine
        .calls()
        .iter()
        .filter(|c| c.starts_with("set_remote"))
        .count();
    assert_eq!(remotes, 1);
}

#[tokio::test]
async fn test_unknown_kind_leaves_sessions_untouched() {
    let (transport, _factory, manager, mut events) = setup();
    let _handle = manager.start("peerA").await.unwrap();

    transport.push_inbound(r#"{"type":"hologram","peer_id":"peerA","data":[1,2,3]}"#);

    // the session still completes normally afterwards
    transport.push_inbound(r#"{"type":"answer","peer_id":"peerA","sdp":"v=0"}"#);
    match next_event(&mut events).await {
        ManagerEvent::SessionConnected { peer_id } => assert_eq!(peer_id, "peerA"),
        other => panic!("expected SessionConnected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_start_rolls_back_when_engine_acquisition_fails() {
    let (transport, factory, manager, _events) = setup();
    factory.set_fail_create(true);

    let err = manager.start("peerA").await.unwrap_err();
    assert!(matches!(err, StartError::Engine(_)));
    // nothing was sent and nothing leaked
    assert!(transport.sent().is_empty());
    assert!(factory.engine_for("peerA").is_none());
}

#[tokio::test]
async fn test_start_rolls_back_when_offer_creation_fails() {
    let (transport, factory, manager, _events) = setup();
    factory.set_fail_offer_next(true);

    let err = manager.start("peerA").await.unwrap_err();
    assert!(matches!(err, StartError::Offer(_)));
    assert!(transport.sent().is_empty());
    // the engine acquired before the failure point was released
    assert!(factory.engine_for("peerA").unwrap().is_closed());
}

#[tokio::test]
async fn test_second_start_for_live_peer_rejected() {
    let (_transport, _factory, manager, _events) = setup();
    let _handle = manager.start("peerA").await.unwrap();

    let err = manager.start("peerA").await.unwrap_err();
    assert!(matches!(err, StartError::SessionExists(_)));
}

#[tokio::test]
async fn test_stopped_peer_can_be_recreated() {
    let (transport, _factory, manager, mut events) = setup();
    let handle = manager.start("peerA").await.unwrap();
    manager.stop(&handle).await;
    let _ = next_event(&mut events).await;

    let handle = manager.start("peerA").await.expect("recreation allowed");
    assert_eq!(handle.peer_id(), "peerA");
    assert_eq!(transport.sent_kinds(), vec!["offer", "close", "offer"]);
}

#[tokio::test]
async fn test_local_candidates_relayed_in_discovery_order() {
    let (transport, factory, manager, mut events) = setup();
    let handle = manager.start("peerA").await.unwrap();

    let engine = factory.engine_for("peerA").unwrap();
    engine.discover_candidate("local-1");
    engine.discover_candidate("local-2");

    let candidates_sent = {
        let transport = transport.clone();
        move || {
            transport
                .sent_kinds()
                .iter()
                .filter(|k| **k == "ice-candidate")
                .count()
                == 2
        }
    };
    wait_until(candidates_sent).await;

    manager.stop(&handle).await;
    let _ = next_event(&mut events).await;

    let sent = transport.sent();
    let candidates: Vec<String> = sent
        .iter()
        .filter_map(|m| match m {
            SignalMessage::IceCandidate { candidate, .. } => Some(candidate.candidate.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(candidates, vec!["local-1", "local-2"]);
}

#[tokio::test]
async fn test_transport_disconnect_is_surfaced() {
    let (transport, _factory, manager, mut events) = setup();
    let _handle = manager.start("peerA").await.unwrap();

    transport.push_disconnect();
    match next_event(&mut events).await {
        ManagerEvent::TransportDisconnected => {}
        other => panic!("expected TransportDisconnected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_shutdown_closes_all_sessions() {
    let (transport, factory, manager, _events) = setup();
    let _a = manager.start("peerA").await.unwrap();
    let _b = manager.start("peerB").await.unwrap();

    manager.shutdown().await;

    assert!(factory.engine_for("peerA").unwrap().is_closed());
    assert!(factory.engine_for("peerB").unwrap().is_closed());
    let closes = transport
        .sent_kinds()
        .iter()
        .filter(|k| **k == "close")
        .count();
    assert_eq!(closes, 2);
}
