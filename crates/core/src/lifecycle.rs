//! Connection lifecycle management
//!
//! [`ConnectionManager`] owns the coordinator task: a single event loop that
//! serializes start/stop commands, inbound relay frames, and locally
//! discovered candidates, so every session transition executes to completion
//! before the next event is processed. No locks guard session state — the
//! loop is the lock.
//!
//! Start acquires the media engine, creates the initiator session, and drives
//! the first offer; partial failure releases everything acquired up to that
//! point before the error surfaces. Stop is idempotent, notifies the peer
//! best-effort, and releases resources in reverse acquisition order.

use crate::engine::EngineFactory;
use crate::error::StartError;
use crate::protocol::{CandidateInit, SignalMessage};
use crate::router::{PassthroughFrame, Router};
use crate::session::{Role, Session, SessionState};
use crate::transport::{SignalingTransport, TransportEvent};
use crate::Error;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Handle to a started session; pass back to [`ConnectionManager::stop`]
///
/// Stopping the same handle twice is a no-op, not an error.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    peer_id: String,
}

impl SessionHandle {
    /// Peer this handle's session negotiates with
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }
}

/// Observable session lifecycle events
///
/// Protocol violations and rejected messages are surfaced here rather than
/// silently swallowed inside the event loop.
#[derive(Debug)]
pub enum ManagerEvent {
    /// Negotiation for this peer reached `Connected`
    SessionConnected {
        /// Peer identifier
        peer_id: String,
    },
    /// The session moved to `Failed` and must be recreated
    SessionFailed {
        /// Peer identifier
        peer_id: String,
        /// Why the session failed
        reason: String,
    },
    /// The session was closed, locally or by the peer
    SessionClosed {
        /// Peer identifier
        peer_id: String,
    },
    /// An inbound message was rejected with a typed error
    MessageRejected {
        /// Peer the message was for
        peer_id: String,
        /// Why it was rejected
        error: Error,
    },
    /// The signaling transport dropped unexpectedly
    TransportDisconnected,
}

enum Command {
    Start {
        peer_id: String,
        reply: oneshot::Sender<Result<SessionHandle, StartError>>,
    },
    Stop {
        peer_id: String,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Orchestrates session start/stop over one signaling transport
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    events: Mutex<Option<mpsc::UnboundedReceiver<ManagerEvent>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager; passthrough frames are dropped with a debug log
    pub fn new(transport: Arc<dyn SignalingTransport>, factory: Arc<dyn EngineFactory>) -> Self {
        Self::with_router(transport, factory, Router::new())
    }

    /// Create a manager forwarding passthrough frames to `sink`
    pub fn with_passthrough(
        transport: Arc<dyn SignalingTransport>,
        factory: Arc<dyn EngineFactory>,
        sink: mpsc::UnboundedSender<PassthroughFrame>,
    ) -> Self {
        Self::with_router(transport, factory, Router::with_passthrough(sink))
    }

    fn with_router(
        transport: Arc<dyn SignalingTransport>,
        factory: Arc<dyn EngineFactory>,
        router: Router,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(transport, factory, router, event_tx);
        let task = tokio::spawn(coordinator.run(command_rx));
        Self {
            commands: command_tx,
            events: Mutex::new(Some(event_rx)),
            task: Mutex::new(Some(task)),
        }
    }

    /// Start a call to `peer_id` in the initiator role and drive the first
    /// offer
    pub async fn start(&self, peer_id: impl Into<String>) -> Result<SessionHandle, StartError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Start {
                peer_id: peer_id.into(),
                reply,
            })
            .map_err(|_| StartError::ManagerClosed)?;
        rx.await.map_err(|_| StartError::ManagerClosed)?
    }

    /// Stop the session behind `handle`; idempotent
    ///
    /// Notifies the peer best-effort, releases session state, then releases
    /// the media engine. Stopping an already-stopped handle (or one whose
    /// manager has shut down) is a no-op.
    pub async fn stop(&self, handle: &SessionHandle) {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Stop {
                peer_id: handle.peer_id.clone(),
                reply,
            })
            .is_err()
        {
            return;
        }
        let _ = rx.await;
    }

    /// Take the manager event stream; single subscriber
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ManagerEvent>> {
        self.events.lock().unwrap().take()
    }

    /// Stop every session and tear down the coordinator
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).is_err() {
            return;
        }
        let _ = rx.await;
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }
}

struct Coordinator {
    transport: Arc<dyn SignalingTransport>,
    factory: Arc<dyn EngineFactory>,
    router: Router,
    sessions: HashMap<String, Session>,
    events: mpsc::UnboundedSender<ManagerEvent>,
    local_candidates_tx: mpsc::UnboundedSender<(String, CandidateInit)>,
    local_candidates_rx: Option<mpsc::UnboundedReceiver<(String, CandidateInit)>>,
}

impl Coordinator {
    fn new(
        transport: Arc<dyn SignalingTransport>,
        factory: Arc<dyn EngineFactory>,
        router: Router,
        events: mpsc::UnboundedSender<ManagerEvent>,
    ) -> Self {
        let (local_candidates_tx, local_candidates_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            factory,
            router,
            sessions: HashMap::new(),
            events,
            local_candidates_tx,
            local_candidates_rx: Some(local_candidates_rx),
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut inbound = match self.transport.take_events() {
            Some(rx) => rx,
            None => {
                error!("transport event stream already taken; coordinator cannot run");
                return;
            }
        };
        let Some(mut candidates) = self.local_candidates_rx.take() else {
            error!("candidate stream already taken; coordinator cannot run");
            return;
        };

        debug!("coordinator running");
        let mut inbound_open = true;
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Start { peer_id, reply }) => {
                        let _ = reply.send(self.start_session(peer_id).await);
                    }
                    Some(Command::Stop { peer_id, reply }) => {
                        self.stop_session(&peer_id).await;
                        let _ = reply.send(());
                    }
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown_all().await;
                        let _ = reply.send(());
                        return;
                    }
                    None => {
                        self.shutdown_all().await;
                        return;
                    }
                },
                event = inbound.recv(), if inbound_open => match event {
                    Some(TransportEvent::Message(raw)) => {
                        if let Some(message) = self.router.dispatch(&raw) {
                            self.handle_signal(message).await;
                        }
                    }
                    Some(TransportEvent::Disconnected) | None => {
                        warn!("signaling transport disconnected");
                        inbound_open = false;
                        self.emit(ManagerEvent::TransportDisconnected);
                        // Reconnection is the caller's policy; keep serving
                        // commands so sessions can be stopped cleanly.
                    }
                },
                Some((peer_id, candidate)) = candidates.recv() => {
                    self.send_local_candidate(peer_id, candidate).await;
                }
            }
        }
    }

    /// Acquire engine, create the initiator session, drive the first offer.
    /// Everything acquired before a failure point is released before the
    /// error is returned.
    async fn start_session(&mut self, peer_id: String) -> Result<SessionHandle, StartError> {
        if let Some(existing) = self.sessions.get_mut(&peer_id) {
            if !existing.state().is_terminal() {
                return Err(StartError::SessionExists(peer_id));
            }
            // explicit recreation replaces a terminal session
            existing.close().await;
            self.sessions.remove(&peer_id);
        }

        self.transport
            .connect()
            .await
            .map_err(|e| StartError::Transport(e.to_string()))?;

        let engine = self
            .factory
            .create(&peer_id)
            .await
            .map_err(|e| StartError::Engine(e.to_string()))?;

        let mut session = Session::new(peer_id.clone(), Role::Initiator, engine.clone());
        let offer = match session.start_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                session.close().await;
                return Err(StartError::Offer(e.to_string()));
            }
        };

        if let Err(e) = self.transport.send(&offer).await {
            session.close().await;
            return Err(StartError::Transport(e.to_string()));
        }

        self.forward_local_candidates(&peer_id, engine);
        self.sessions.insert(peer_id.clone(), session);
        info!(peer_id = %peer_id, "call started, offer sent");
        Ok(SessionHandle { peer_id })
    }

    /// Idempotent teardown: peer notified best-effort, state machine
    /// released, engine released last (reverse acquisition order).
    async fn stop_session(&mut self, peer_id: &str) {
        let session = match self.sessions.get_mut(peer_id) {
            Some(session) => session,
            None => {
                debug!(peer_id = %peer_id, "stop for unknown session is a no-op");
                return;
            }
        };
        if session.state() == SessionState::Closed {
            debug!(peer_id = %peer_id, "stop for already-closed session is a no-op");
            return;
        }

        let close = SignalMessage::Close {
            peer_id: peer_id.to_string(),
        };
        if let Err(e) = self.transport.send(&close).await {
            warn!(peer_id = %peer_id, error = %e, "best-effort close notification failed");
        }

        session.close().await;
        self.emit(ManagerEvent::SessionClosed {
            peer_id: peer_id.to_string(),
        });
    }

    async fn handle_signal(&mut self, message: SignalMessage) {
        match message {
            SignalMessage::Offer { peer_id, sdp } => self.handle_offer(peer_id, sdp).await,
            SignalMessage::Answer { peer_id, sdp } => self.handle_answer(peer_id, sdp).await,
            SignalMessage::IceCandidate { peer_id, candidate } => {
                self.handle_candidate(peer_id, candidate).await
            }
            SignalMessage::Close { peer_id } => self.handle_close(peer_id).await,
        }
    }

    async fn handle_offer(&mut self, peer_id: String, sdp: String) {
        if !self.sessions.contains_key(&peer_id) {
            // first offer from an unknown peer creates the responder session
            let engine = match self.factory.create(&peer_id).await {
                Ok(engine) => engine,
                Err(e) => {
                    error!(peer_id = %peer_id, error = %e, "engine acquisition for inbound offer failed");
                    self.emit(ManagerEvent::MessageRejected {
                        peer_id,
                        error: e,
                    });
                    return;
                }
            };
            self.forward_local_candidates(&peer_id, engine.clone());
            self.sessions
                .insert(peer_id.clone(), Session::new(peer_id.clone(), Role::Responder, engine));
        }

        let Some(session) = self.sessions.get_mut(&peer_id) else {
            return;
        };
        match session.handle_offer(sdp).await {
            Ok(answer) => {
                if let Err(e) = self.transport.send(&answer).await {
                    // delivery is best effort; the peer times out and retries
                    // the call at its own pace
                    warn!(peer_id = %peer_id, error = %e, "failed to send answer");
                }
                self.emit(ManagerEvent::SessionConnected { peer_id });
            }
            Err(e) => self.reject(peer_id, e),
        }
    }

    async fn handle_answer(&mut self, peer_id: String, sdp: String) {
        let session = match self.sessions.get_mut(&peer_id) {
            Some(session) => session,
            None => {
                warn!(peer_id = %peer_id, "answer for unknown peer dropped");
                return;
            }
        };
        match session.handle_answer(sdp).await {
            Ok(()) => self.emit(ManagerEvent::SessionConnected { peer_id }),
            Err(e) => self.reject(peer_id, e),
        }
    }

    async fn handle_candidate(&mut self, peer_id: String, candidate: CandidateInit) {
        let session = match self.sessions.get_mut(&peer_id) {
            Some(session) => session,
            None => {
                // only an offer may create a session implicitly; buffering
                // for sessions that may never exist would leak
                warn!(peer_id = %peer_id, "candidate for unknown peer dropped");
                return;
            }
        };
        if let Err(e) = session.handle_candidate(candidate).await {
            self.reject(peer_id, e);
        }
    }

    async fn handle_close(&mut self, peer_id: String) {
        match self.sessions.get_mut(&peer_id) {
            Some(session) => {
                session.close().await;
                self.emit(ManagerEvent::SessionClosed { peer_id });
            }
            None => debug!(peer_id = %peer_id, "close for unknown peer ignored"),
        }
    }

    /// Fire-and-forget outbound: locally discovered candidates go to the
    /// peer immediately, in discovery order, unless the session is terminal.
    async fn send_local_candidate(&mut self, peer_id: String, candidate: CandidateInit) {
        let live = self
            .sessions
            .get(&peer_id)
            .map(|s| !s.state().is_terminal())
            .unwrap_or(false);
        if !live {
            debug!(peer_id = %peer_id, "discarding local candidate for terminal session");
            return;
        }
        let message = SignalMessage::IceCandidate { peer_id: peer_id.clone(), candidate };
        if let Err(e) = self.transport.send(&message).await {
            warn!(peer_id = %peer_id, error = %e, "failed to send local candidate");
        }
    }

    /// Bridge an engine's discovery stream into the coordinator loop
    fn forward_local_candidates(
        &self,
        peer_id: &str,
        engine: Arc<dyn crate::engine::MediaEngine>,
    ) {
        let Some(mut rx) = engine.take_local_candidates() else {
            return;
        };
        let tx = self.local_candidates_tx.clone();
        let peer_id = peer_id.to_string();
        tokio::spawn(async move {
            while let Some(candidate) = rx.recv().await {
                if tx.send((peer_id.clone(), candidate)).is_err() {
                    break;
                }
            }
        });
    }

    /// Surface a rejection; protocol violations have already moved the
    /// session to `Failed`
    fn reject(&mut self, peer_id: String, error: Error) {
        match &error {
            Error::ProtocolViolation { message, .. } => {
                self.emit(ManagerEvent::SessionFailed {
                    peer_id,
                    reason: message.clone(),
                });
            }
            _ => {
                self.emit(ManagerEvent::MessageRejected { peer_id, error });
            }
        }
    }

    async fn shutdown_all(&mut self) {
        info!(sessions = self.sessions.len(), "coordinator shutting down");
        let peer_ids: Vec<String> = self.sessions.keys().cloned().collect();
        for peer_id in peer_ids {
            self.stop_session(&peer_id).await;
        }
        self.transport.close().await;
    }

    fn emit(&self, event: ManagerEvent) {
        if self.events.send(event).is_err() {
            debug!("manager event receiver dropped");
        }
    }
}
