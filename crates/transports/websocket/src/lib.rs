//! WebSocket signaling transport
//!
//! Owns the single duplex connection to the relay. A writer task drains an
//! outbound channel into the socket; a reader task forwards text frames to
//! the subscriber in arrival order and surfaces unexpected closure as a
//! [`TransportEvent::Disconnected`]. No automatic reconnection: that policy
//! belongs to the lifecycle layer.

pub mod config;

pub use config::WebSocketConfig;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use peercall_core::{Error, Result, SignalMessage, SignalingTransport, TransportEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Signaling transport over a single WebSocket connection
pub struct WebSocketTransport {
    config: WebSocketConfig,
    connected: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WebSocketTransport {
    /// Create a transport for the relay at `config.url`; does not connect
    pub fn new(config: WebSocketConfig) -> Result<Self> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            connected: AtomicBool::new(false),
            outbound: Mutex::new(None),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Convenience constructor from a relay URL
    pub fn from_url(url: impl Into<String>) -> Result<Self> {
        Self::new(WebSocketConfig {
            url: url.into(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl SignalingTransport for WebSocketTransport {
    async fn connect(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let (stream, response) =
            tokio::time::timeout(timeout, connect_async(self.config.url.as_str()))
                .await
                .map_err(|_| {
                    Error::Transport(format!(
                        "connect to {} timed out after {:?}",
                        self.config.url, timeout
                    ))
                })?
                .map_err(|e| Error::Transport(format!("connect failed: {}", e)))?;
        debug!(status = %response.status(), "websocket handshake complete");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        // Writer: drain the outbound channel into the socket; a close frame
        // is the goodbye and ends the task.
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    warn!(error = %e, "websocket send failed");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        // Reader: forward text frames in arrival order, answer pings,
        // surface closure exactly once.
        let events_tx = self.events_tx.clone();
        let pong_tx = outbound_tx.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if events_tx.send(TransportEvent::Message(text)).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        let _ = pong_tx.send(Message::Pong(data));
                    }
                    Ok(Message::Close(_)) => {
                        debug!("websocket closed by relay");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
            let _ = events_tx.send(TransportEvent::Disconnected);
        });

        *self.outbound.lock().unwrap() = Some(outbound_tx);
        self.tasks.lock().unwrap().extend([writer, reader]);
        self.connected.store(true, Ordering::SeqCst);
        info!(url = %self.config.url, "connected to signaling relay");
        Ok(())
    }

    async fn send(&self, message: &SignalMessage) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::Transport(
                "send before connect; call connect() first".to_string(),
            ));
        }
        let json = message.to_json()?;
        let sender = self
            .outbound
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Transport("connection is closed".to_string()))?;
        sender
            .send(Message::Text(json))
            .map_err(|_| Error::Transport("connection is closed".to_string()))
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    async fn close(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        // the close frame flushes behind any queued messages and ends the
        // writer
        if let Some(sender) = self.outbound.lock().unwrap().take() {
            let _ = sender.send(Message::Close(None));
        }
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }
        info!("signaling connection closed");
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}
