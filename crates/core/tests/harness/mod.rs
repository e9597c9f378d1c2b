//! In-memory doubles for lifecycle integration tests
//!
//! `MemoryTransport` stands in for the relay connection and records every
//! outbound message; `ScriptedEngine` stands in for the media path and
//! records every call in order.

use async_trait::async_trait;
use peercall_core::{
    CandidateInit, Error, MediaEngine, Result, SdpKind, SignalMessage, SignalingTransport,
    TransportEvent,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub struct MemoryTransport {
    connected: AtomicBool,
    fail_send: AtomicBool,
    sent: Mutex<Vec<SignalMessage>>,
    inbound_tx: mpsc::UnboundedSender<TransportEvent>,
    events: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            connected: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            inbound_tx,
            events: Mutex::new(Some(inbound_rx)),
        })
    }

    /// Inject a raw inbound frame as if received from the relay
    pub fn push_inbound(&self, raw: impl Into<String>) {
        self.inbound_tx
            .send(TransportEvent::Message(raw.into()))
            .expect("coordinator running");
    }

    pub fn push_disconnect(&self) {
        let _ = self.inbound_tx.send(TransportEvent::Disconnected);
    }

    pub fn sent(&self) -> Vec<SignalMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_kinds(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().iter().map(|m| m.kind()).collect()
    }

    #[allow(dead_code)]
    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SignalingTransport for MemoryTransport {
    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, message: &SignalMessage) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::Transport("not connected".into()));
        }
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(Error::Transport("send refused".into()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events.lock().unwrap().take()
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

pub struct ScriptedEngine {
    pub peer_id: String,
    calls: Mutex<Vec<String>>,
    fail_offer: AtomicBool,
    closed: AtomicBool,
    candidates_tx: mpsc::UnboundedSender<CandidateInit>,
    candidates_rx: Mutex<Option<mpsc::UnboundedReceiver<CandidateInit>>>,
}

impl ScriptedEngine {
    fn new(peer_id: String) -> Arc<Self> {
        let (candidates_tx, candidates_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            peer_id,
            calls: Mutex::new(Vec::new()),
            fail_offer: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            candidates_tx,
            candidates_rx: Mutex::new(Some(candidates_rx)),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulate local candidate discovery
    #[allow(dead_code)]
    pub fn discover_candidate(&self, candidate: &str) {
        let _ = self.candidates_tx.send(CandidateInit {
            candidate: candidate.to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        });
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl MediaEngine for ScriptedEngine {
    async fn create_offer(&self) -> Result<String> {
        if self.fail_offer.load(Ordering::SeqCst) {
            return Err(Error::Engine("offer refused".into()));
        }
        self.record("create_offer");
        Ok(format!("v=0 offer-for-{}", self.peer_id))
    }

    async fn create_answer(&self) -> Result<String> {
        self.record("create_answer");
        Ok(format!("v=0 answer-for-{}", self.peer_id))
    }

    async fn set_remote_description(&self, kind: SdpKind, _sdp: &str) -> Result<()> {
        self.record(format!("set_remote:{:?}", kind));
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: &CandidateInit) -> Result<()> {
        self.record(format!("candidate:{}", candidate.candidate));
        Ok(())
    }

    fn take_local_candidates(&self) -> Option<mpsc::UnboundedReceiver<CandidateInit>> {
        self.candidates_rx.lock().unwrap().take()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.record("close");
    }
}

/// Factory handing out one scripted engine per peer and keeping them
/// reachable for assertions
pub struct ScriptedFactory {
    engines: Mutex<Vec<Arc<ScriptedEngine>>>,
    fail_create: AtomicBool,
    fail_offer_next: AtomicBool,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            engines: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            fail_offer_next: AtomicBool::new(false),
        })
    }

    pub fn engine_for(&self, peer_id: &str) -> Option<Arc<ScriptedEngine>> {
        self.engines
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.peer_id == peer_id)
            .cloned()
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_offer_next(&self, fail: bool) {
        self.fail_offer_next.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl peercall_core::EngineFactory for ScriptedFactory {
    async fn create(&self, peer_id: &str) -> Result<Arc<dyn MediaEngine>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Engine("no media devices".into()));
        }
        let engine = ScriptedEngine::new(peer_id.to_string());
        if self.fail_offer_next.swap(false, Ordering::SeqCst) {
            engine.fail_offer.store(true, Ordering::SeqCst);
        }
        self.engines.lock().unwrap().push(engine.clone());
        Ok(engine)
    }
}
