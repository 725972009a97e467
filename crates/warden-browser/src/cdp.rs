//! Chrome DevTools Protocol client over a WebSocket.
//!
//! One connection is held against the browser-level DevTools endpoint.
//! Commands get auto-incrementing IDs and their responses are correlated
//! back to the caller; events fan out on a broadcast channel so each page
//! execution can follow its own session. Session-scoped commands carry a
//! `sessionId` (flat session mode).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{BrowserError, BrowserResult};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// A DevTools event received from the browser.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    /// Event method name (e.g. `Runtime.consoleAPICalled`).
    pub method: String,
    /// Event parameters.
    pub params: Value,
    /// The session the event belongs to; `None` for browser-level events.
    pub session_id: Option<String>,
}

/// A response correlated to a sent command.
#[derive(Debug, Clone)]
struct CdpResponse {
    result: Option<Value>,
    error: Option<CdpResponseError>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct CdpResponseError {
    code: i64,
    message: String,
}

/// How many events the broadcast channel buffers before lagging slow
/// subscribers.
const EVENT_BUFFER: usize = 1024;

/// A live DevTools connection.
pub struct CdpConnection {
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>>,
    writer: Mutex<WsSink>,
    events: broadcast::Sender<CdpEvent>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl CdpConnection {
    /// Connect to a DevTools WebSocket endpoint.
    pub async fn connect(ws_url: &str) -> BrowserResult<Self> {
        tracing::info!(url = ws_url, "connecting to DevTools WebSocket");

        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| BrowserError::ConnectionFailed {
                url: ws_url.to_string(),
                reason: e.to_string(),
            })?;

        let (writer, reader) = ws_stream.split();
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        let reader_pending = Arc::clone(&pending);
        let reader_events = event_tx.clone();
        let reader_handle = tokio::spawn(async move {
            Self::read_loop(reader, reader_pending, reader_events).await;
        });

        Ok(Self {
            next_id: AtomicU64::new(1),
            pending,
            writer: Mutex::new(writer),
            events: event_tx,
            reader_handle,
        })
    }

    /// Subscribe to the event stream. Each page execution takes its own
    /// receiver and filters by session.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Send a command and wait for its response.
    pub async fn send(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> BrowserResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let mut command = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let (Some(session), Some(map)) = (session_id, command.as_object_mut()) {
            map.insert("sessionId".to_string(), json!(session));
        }
        let text = command.to_string();

        tracing::debug!(id, method, session = ?session_id, "sending CDP command");

        // Register before sending so a fast response can't race the insert.
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        let sent = {
            let mut writer = self.writer.lock().await;
            writer.send(Message::Text(text.into())).await
        };
        if let Err(e) = sent {
            let mut pending = self.pending.lock().await;
            pending.remove(&id);
            return Err(BrowserError::Protocol(format!(
                "failed to send WebSocket message: {e}"
            )));
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(BrowserError::Protocol(
                    "response channel closed unexpectedly".to_string(),
                ));
            }
            Err(_) => {
                let mut pending = self.pending.lock().await;
                pending.remove(&id);
                return Err(BrowserError::Timeout {
                    method: method.to_string(),
                    timeout,
                });
            }
        };

        if let Some(err) = response.error {
            return Err(BrowserError::Cdp {
                code: err.code,
                message: err.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Drop the connection, stopping the reader task.
    pub async fn shutdown(&self) {
        self.reader_handle.abort();
        let mut writer = self.writer.lock().await;
        let _ = writer.send(Message::Close(None)).await;
    }

    /// Reader task: messages with an `id` are responses to pending
    /// commands, messages with a `method` are events.
    async fn read_loop(
        mut reader: WsSource,
        pending: Arc<Mutex<HashMap<u64, oneshot::Sender<CdpResponse>>>>,
        events: broadcast::Sender<CdpEvent>,
    ) {
        while let Some(message) = reader.next().await {
            let text = match message {
                Ok(Message::Text(t)) => t.to_string(),
                Ok(Message::Close(_)) => {
                    tracing::info!("DevTools WebSocket closed by remote");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket read error, stopping reader");
                    break;
                }
            };

            let Ok(message) = serde_json::from_str::<Value>(&text) else {
                tracing::warn!("discarding non-JSON DevTools message");
                continue;
            };

            if let Some(id) = message.get("id").and_then(Value::as_u64) {
                let response = CdpResponse {
                    result: message.get("result").cloned(),
                    error: message
                        .get("error")
                        .and_then(|e| serde_json::from_value(e.clone()).ok()),
                };
                let mut pending = pending.lock().await;
                if let Some(tx) = pending.remove(&id) {
                    let _ = tx.send(response);
                } else {
                    tracing::debug!(id, "response for unknown command id");
                }
            } else if let Some(event) = parse_event(&message) {
                // No subscribers is fine; the event is simply dropped.
                let _ = events.send(event);
            }
        }

        // Fail every in-flight command when the connection drops.
        let mut pending = pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(CdpResponse {
                result: None,
                error: Some(CdpResponseError {
                    code: -1,
                    message: "WebSocket connection closed".to_string(),
                }),
            });
        }
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

impl std::fmt::Debug for CdpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdpConnection")
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Parse an event message (`method` present, `id` absent).
fn parse_event(message: &Value) -> Option<CdpEvent> {
    if message.get("id").is_some() {
        return None;
    }
    Some(CdpEvent {
        method: message.get("method")?.as_str()?.to_string(),
        params: message.get("params").cloned().unwrap_or(Value::Null),
        session_id: message
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}
