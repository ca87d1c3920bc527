//! WebSocket handler for real-time lifecycle events
//!
//! Forwards [`LifecycleEvent`]s from the lifecycle manager to connected clients.
//! Clients may narrow the stream by event type or by account id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::api::server::AppState;
use crate::context::LifecycleEvent;

/// Unique client identifier
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Connection-level events that are not tied to an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ControlEvent {
    /// Sent once to each new client
    Connected {
        client_id: u64,
        server_version: String,
    },

    /// Keepalive
    Ping { timestamp: u64 },

    /// Answer to a client `Ping` command
    Pong { timestamp: u64 },
}

/// Commands that can be received via WebSocket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WebSocketCommand {
    /// Add event types and/or accounts to the client's filter
    Subscribe {
        #[serde(default)]
        events: Vec<String>,
        #[serde(default)]
        accounts: Vec<String>,
    },

    /// Remove event types and/or accounts from the client's filter
    Unsubscribe {
        #[serde(default)]
        events: Vec<String>,
        #[serde(default)]
        accounts: Vec<String>,
    },

    /// Ping request
    Ping { timestamp: u64 },
}

/// Anything the server writes to a socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Lifecycle(LifecycleEvent),
    Control(ControlEvent),
}

/// Connected client information
#[derive(Debug)]
struct ClientInfo {
    id: u64,
    /// Empty means every event type
    subscribed_events: Vec<String>,
    /// Empty means every account
    subscribed_accounts: Vec<String>,
    tx: mpsc::Sender<OutboundMessage>,
}

impl ClientInfo {
    fn wants(&self, event: &LifecycleEvent) -> bool {
        let type_name = event_type_name(event);
        let type_ok = self.subscribed_events.is_empty()
            || self.subscribed_events.iter().any(|e| e == "*" || e == type_name);
        let account_ok = self.subscribed_accounts.is_empty()
            || self
                .subscribed_accounts
                .iter()
                .any(|a| a == event.account_id());
        type_ok && account_ok
    }
}

/// Type name used for subscription filters; matches the serialized `type` tag.
pub fn event_type_name(event: &LifecycleEvent) -> &'static str {
    match event {
        LifecycleEvent::ContextStarting { .. } => "ContextStarting",
        LifecycleEvent::ContextRunning { .. } => "ContextRunning",
        LifecycleEvent::ContextStopped { .. } => "ContextStopped",
        LifecycleEvent::ContextFailed { .. } => "ContextFailed",
        LifecycleEvent::ProfileUpdated { .. } => "ProfileUpdated",
        LifecycleEvent::LowQuality { .. } => "LowQuality",
        LifecycleEvent::DocumentInstrumented { .. } => "DocumentInstrumented",
    }
}

fn encode(message: &OutboundMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Failed to encode WebSocket message: {}", e);
            None
        }
    }
}

fn unix_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// WebSocket handler for managing connections and broadcasting events
pub struct WebSocketHandler {
    clients: RwLock<HashMap<u64, ClientInfo>>,
    ping_interval: Duration,
}

impl WebSocketHandler {
    pub fn new() -> Self {
        Self::with_ping_interval(Duration::from_secs(30))
    }

    /// Create a new WebSocket handler with custom ping interval
    pub fn with_ping_interval(ping_interval: Duration) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            ping_interval,
        }
    }

    /// Deliver a lifecycle event to every client whose filter accepts it
    pub async fn broadcast(&self, event: LifecycleEvent) {
        let clients = self.clients.read().await;
        for client in clients.values().filter(|c| c.wants(&event)) {
            if let Err(e) = client
                .tx
                .send(OutboundMessage::Lifecycle(event.clone()))
                .await
            {
                warn!("Failed to send event to client {}: {}", client.id, e);
            }
        }
    }

    /// Pump events from the lifecycle manager until its channel closes
    pub fn spawn_forwarder(
        self: Arc<Self>,
        mut events: broadcast::Receiver<LifecycleEvent>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.broadcast(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Event forwarder lagged, {} events dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Event forwarder finished");
        })
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    async fn add_client(&self, tx: mpsc::Sender<OutboundMessage>) -> u64 {
        let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::SeqCst);

        let client = ClientInfo {
            id: client_id,
            subscribed_events: vec![],
            subscribed_accounts: vec![],
            tx,
        };

        self.clients.write().await.insert(client_id, client);

        info!("WebSocket client {} connected", client_id);

        client_id
    }

    async fn remove_client(&self, client_id: u64) {
        self.clients.write().await.remove(&client_id);
        info!("WebSocket client {} disconnected", client_id);
    }

    async fn send_to(&self, client_id: u64, message: OutboundMessage) {
        let tx = self
            .clients
            .read()
            .await
            .get(&client_id)
            .map(|c| c.tx.clone());
        if let Some(tx) = tx {
            let _ = tx.send(message).await;
        }
    }

    async fn subscribe_client(&self, client_id: u64, events: Vec<String>, accounts: Vec<String>) {
        if let Some(client) = self.clients.write().await.get_mut(&client_id) {
            for event in events {
                if !client.subscribed_events.contains(&event) {
                    client.subscribed_events.push(event);
                }
            }
            for account in accounts {
                if !client.subscribed_accounts.contains(&account) {
                    client.subscribed_accounts.push(account);
                }
            }
            debug!(
                "Client {} subscribed to events {:?}, accounts {:?}",
                client_id, client.subscribed_events, client.subscribed_accounts
            );
        }
    }

    async fn unsubscribe_client(&self, client_id: u64, events: Vec<String>, accounts: Vec<String>) {
        if let Some(client) = self.clients.write().await.get_mut(&client_id) {
            client.subscribed_events.retain(|e| !events.contains(e));
            client.subscribed_accounts.retain(|a| !accounts.contains(a));
            debug!(
                "Client {} unsubscribed, now events {:?}, accounts {:?}",
                client_id, client.subscribed_events, client.subscribed_accounts
            );
        }
    }

    async fn handle_command(&self, client_id: u64, command: WebSocketCommand) {
        match command {
            WebSocketCommand::Subscribe { events, accounts } => {
                self.subscribe_client(client_id, events, accounts).await;
            }
            WebSocketCommand::Unsubscribe { events, accounts } => {
                self.unsubscribe_client(client_id, events, accounts).await;
            }
            WebSocketCommand::Ping { timestamp } => {
                self.send_to(client_id, OutboundMessage::Control(ControlEvent::Pong { timestamp }))
                    .await;
            }
        }
    }
}

impl Default for WebSocketHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler for `GET /events`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);
    let client_id = state.ws_handler.add_client(tx).await;

    let connected = OutboundMessage::Control(ControlEvent::Connected {
        client_id,
        server_version: env!("CARGO_PKG_VERSION").to_string(),
    });
    let delivered = match encode(&connected) {
        Some(text) => sender.send(Message::Text(text)).await.is_ok(),
        None => false,
    };
    if !delivered {
        state.ws_handler.remove_client(client_id).await;
        return;
    }

    let ping_interval = state.ws_handler.ping_interval;

    let mut send_task = tokio::spawn(async move {
        let mut ping_timer = tokio::time::interval(ping_interval);

        loop {
            let message = tokio::select! {
                Some(message) = rx.recv() => message,
                _ = ping_timer.tick() => {
                    OutboundMessage::Control(ControlEvent::Ping { timestamp: unix_millis() })
                }
            };

            let Some(text) = encode(&message) else {
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let ws_handler_recv = state.ws_handler.clone();

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<WebSocketCommand>(&text) {
                    Ok(command) => ws_handler_recv.handle_command(client_id, command).await,
                    Err(e) => debug!("Failed to parse WebSocket command: {}", e),
                },
                Message::Binary(_) => {
                    debug!("Received unsupported binary message");
                }
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(_) => break,
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    state.ws_handler.remove_client(client_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped(account: &str) -> LifecycleEvent {
        LifecycleEvent::ContextStopped {
            account_id: account.to_string(),
        }
    }

    #[test]
    fn test_outbound_serialization() {
        let json = serde_json::to_string(&OutboundMessage::Lifecycle(stopped("a1"))).unwrap();
        assert_eq!(json, r#"{"type":"ContextStopped","data":{"account_id":"a1"}}"#);

        let json =
            serde_json::to_string(&OutboundMessage::Control(ControlEvent::Pong { timestamp: 5 }))
                .unwrap();
        assert_eq!(json, r#"{"type":"Pong","data":{"timestamp":5}}"#);
    }

    #[test]
    fn test_command_deserialization() {
        let json = r#"{"type":"Subscribe","data":{"events":["LowQuality"],"accounts":["a1"]}}"#;
        let cmd: WebSocketCommand = serde_json::from_str(json).unwrap();

        match cmd {
            WebSocketCommand::Subscribe { events, accounts } => {
                assert_eq!(events, vec!["LowQuality".to_string()]);
                assert_eq!(accounts, vec!["a1".to_string()]);
            }
            _ => panic!("Expected Subscribe command"),
        }
    }

    #[tokio::test]
    async fn test_broadcast_respects_filters() {
        let handler = WebSocketHandler::new();
        let (tx_all, mut rx_all) = mpsc::channel(8);
        let (tx_a1, mut rx_a1) = mpsc::channel(8);
        let _all = handler.add_client(tx_all).await;
        let only_a1 = handler.add_client(tx_a1).await;
        handler
            .subscribe_client(only_a1, vec![], vec!["a1".to_string()])
            .await;

        handler.broadcast(stopped("a2")).await;
        handler.broadcast(stopped("a1")).await;

        assert_eq!(rx_all.recv().await, Some(OutboundMessage::Lifecycle(stopped("a2"))));
        assert_eq!(rx_all.recv().await, Some(OutboundMessage::Lifecycle(stopped("a1"))));
        assert_eq!(rx_a1.recv().await, Some(OutboundMessage::Lifecycle(stopped("a1"))));
        assert!(rx_a1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_forwarder_relays_manager_events() {
        let handler = Arc::new(WebSocketHandler::new());
        let (tx, mut rx) = mpsc::channel(8);
        handler.add_client(tx).await;

        let (events, receiver) = broadcast::channel(8);
        let forwarder = handler.clone().spawn_forwarder(receiver);
        events.send(stopped("a1")).unwrap();

        assert_eq!(rx.recv().await, Some(OutboundMessage::Lifecycle(stopped("a1"))));
        drop(events);
        forwarder.await.unwrap();
    }
}
