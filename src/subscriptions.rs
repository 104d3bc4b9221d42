//! Server-pushed updates over the `graphql-ws` WebSocket protocol.
//!
//! One connection carries the `UserAdded`, `MessageAdded` and `ChatAdded`
//! subscriptions. Each payload becomes a [`CachePatch`] applied through the
//! same path as mutation results, then an [`Event`] on the bus.

use crate::live::LiveCache;
use crate::session::SessionManager;
use chatcore::cache::CachePatch;
use chatcore::events::{CoreEventBus, Event};
use chatcore::graphql::{
    CHAT_ADDED, ChatAddedData, GraphQLRequest, MESSAGE_ADDED, MessageAddedData, NoVariables,
    Operation, USER_ADDED, UserAddedData,
};
use chatcore::net::{AUTHORIZATION, Transport, TransportEvent, TransportFactory};
use chatcore::ws::{ClientMessage, DataPayload, ServerMessage, WsProtocolError};
use log::{debug, info, trace, warn};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] WsProtocolError),
    #[error("connection closed before it was acknowledged")]
    Closed,
    #[error("subscription task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

static SUBSCRIPTIONS: [(&str, Operation); 3] =
    [("1", USER_ADDED), ("2", MESSAGE_ADDED), ("3", CHAT_ADDED)];

fn operation_for(id: &str) -> Option<&'static Operation> {
    SUBSCRIPTIONS
        .iter()
        .find(|(sub_id, _)| *sub_id == id)
        .map(|(_, op)| op)
}

/// Turns one subscription payload into the cache patch and event it implies.
/// `None` when the payload carried no record.
pub fn patch_for(
    operation: &Operation,
    data: Value,
) -> Result<Option<(CachePatch, Event)>, serde_json::Error> {
    let update = match operation.name {
        "UserAdded" => serde_json::from_value::<UserAddedData>(data)?
            .user_added
            .map(|user| (CachePatch::UserAdded(user.clone()), Event::UserAdded(user))),
        "MessageAdded" => serde_json::from_value::<MessageAddedData>(data)?
            .message_added
            .map(|message| {
                (
                    CachePatch::MessageAdded(message.clone()),
                    Event::MessageAdded(message),
                )
            }),
        "ChatAdded" => serde_json::from_value::<ChatAddedData>(data)?
            .chat_added
            .map(|chat| (CachePatch::ChatAdded(chat.clone()), Event::ChatAdded(chat))),
        _ => None,
    };
    Ok(update)
}

pub struct SubscriptionManager {
    factory: Arc<dyn TransportFactory>,
    url: String,
    session: Arc<SessionManager>,
    cache: Arc<LiveCache>,
}

/// A running subscription connection. Dropping the handle closes it.
pub struct SubscriptionHandle {
    shutdown: watch::Sender<bool>,
    // Closed when the worker exits, for whatever reason.
    done: watch::Receiver<()>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub async fn stop(self) -> Result<(), SubscriptionError> {
        let _ = self.shutdown.send(true);
        self.task.await?;
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Resolves once the worker has exited. Unlike [`join`](Self::join) this
    /// borrows the handle, so it can sit in a `select!` next to other
    /// branches and the handle can still be stopped afterwards.
    pub async fn finished(&self) {
        let mut done = self.done.clone();
        while done.changed().await.is_ok() {}
    }

    /// Waits until the connection ends on its own.
    pub async fn join(self) -> Result<(), SubscriptionError> {
        let SubscriptionHandle { shutdown, task, .. } = self;
        task.await?;
        drop(shutdown);
        Ok(())
    }
}

impl SubscriptionManager {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        url: impl Into<String>,
        session: Arc<SessionManager>,
        cache: Arc<LiveCache>,
    ) -> Self {
        Self {
            factory,
            url: url.into(),
            session,
            cache,
        }
    }

    /// Connects, completes the `connection_init` handshake and starts every
    /// subscription. Updates are processed on a spawned task.
    pub async fn start(&self) -> Result<SubscriptionHandle, SubscriptionError> {
        info!(target: "Subscriptions", "Connecting to {}", self.url);
        let (transport, mut events) = self.factory.create_transport(&self.url).await?;

        let payload = self
            .session
            .auth_header()
            .map(|header| json!({ AUTHORIZATION: header }));
        send(&*transport, &ClientMessage::ConnectionInit { payload }).await?;
        wait_for_ack(&mut events).await?;

        for (id, operation) in &SUBSCRIPTIONS {
            let start = ClientMessage::Start {
                id: (*id).to_string(),
                payload: GraphQLRequest::new(operation, NoVariables {})
                    .map_err(WsProtocolError::Malformed)?,
            };
            send(&*transport, &start).await?;
        }

        let event_bus = self.session.event_bus().clone();
        event_bus.dispatch(&Event::SubscriptionConnected);
        info!(target: "Subscriptions", "Subscribed to {} operations", SUBSCRIPTIONS.len());

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (alive, done) = watch::channel(());
        let worker = Worker {
            transport,
            cache: self.cache.clone(),
            event_bus,
            _alive: alive,
        };
        let task = tokio::spawn(worker.run(events, shutdown_rx));
        Ok(SubscriptionHandle {
            shutdown,
            done,
            task,
        })
    }
}

async fn send(transport: &dyn Transport, message: &ClientMessage) -> Result<(), SubscriptionError> {
    let text = message.to_text()?;
    trace!(target: "Subscriptions/Send", "{text}");
    transport.send_text(&text).await?;
    Ok(())
}

async fn wait_for_ack(events: &mut mpsc::Receiver<TransportEvent>) -> Result<(), SubscriptionError> {
    while let Some(event) = events.recv().await {
        let text = match event {
            TransportEvent::TextReceived(text) => text,
            TransportEvent::Connected => continue,
            TransportEvent::Disconnected => break,
        };
        match ServerMessage::parse(&text)? {
            ServerMessage::ConnectionAck => return Ok(()),
            ServerMessage::KeepAlive => continue,
            ServerMessage::ConnectionError { payload } => {
                let reason = payload.map(|p| p.to_string()).unwrap_or_default();
                return Err(WsProtocolError::ConnectionRejected(reason).into());
            }
            other => return Err(WsProtocolError::NotAcknowledged(other.kind()).into()),
        }
    }
    Err(SubscriptionError::Closed)
}

struct Worker {
    transport: Arc<dyn Transport>,
    cache: Arc<LiveCache>,
    event_bus: CoreEventBus,
    _alive: watch::Sender<()>,
}

impl Worker {
    async fn run(
        self,
        mut events: mpsc::Receiver<TransportEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!(target: "Subscriptions", "Shutdown requested, closing subscriptions");
                    self.close().await;
                    return;
                }
                event = events.recv() => match event {
                    Some(TransportEvent::TextReceived(text)) => self.handle_frame(&text),
                    Some(TransportEvent::Connected) => debug!("Transport connected event received"),
                    Some(TransportEvent::Disconnected) | None => {
                        info!(target: "Subscriptions", "Subscription connection closed");
                        self.event_bus.dispatch(&Event::SubscriptionDisconnected);
                        return;
                    }
                }
            }
        }
    }

    async fn close(&self) {
        for (id, _) in &SUBSCRIPTIONS {
            let stop = ClientMessage::Stop {
                id: (*id).to_string(),
            };
            if let Err(e) = send(&*self.transport, &stop).await {
                warn!(target: "Subscriptions", "Failed to stop subscription {id}: {e}");
            }
        }
        if let Err(e) = send(&*self.transport, &ClientMessage::ConnectionTerminate).await {
            warn!(target: "Subscriptions", "Failed to terminate connection: {e}");
        }
        self.transport.disconnect().await;
        self.event_bus.dispatch(&Event::SubscriptionDisconnected);
    }

    fn handle_frame(&self, text: &str) {
        let message = match ServerMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(target: "Subscriptions", "Ignoring frame: {e}");
                return;
            }
        };

        match message {
            ServerMessage::Data { id, payload } => self.handle_data(&id, payload),
            ServerMessage::Error { id, payload } => {
                warn!(target: "Subscriptions", "Subscription {id} failed: {payload:?}");
            }
            ServerMessage::Complete { id } => {
                info!(target: "Subscriptions", "Server completed subscription {id}");
            }
            ServerMessage::KeepAlive => trace!(target: "Subscriptions", "ka"),
            other => debug!(target: "Subscriptions", "Unexpected {} frame", other.kind()),
        }
    }

    fn handle_data(&self, id: &str, payload: DataPayload) {
        let Some(operation) = operation_for(id) else {
            warn!(target: "Subscriptions", "Data for unknown subscription {id}");
            return;
        };
        for error in &payload.errors {
            warn!(target: "Subscriptions", "{} error: {error}", operation.name);
        }
        let Some(data) = payload.data else {
            return;
        };

        match patch_for(operation, data) {
            Ok(Some((patch, event))) => {
                debug!(target: "Subscriptions", "{} update", operation.name);
                self.cache.apply(&patch);
                self.event_bus.dispatch(&event);
            }
            Ok(None) => {}
            Err(e) => warn!(target: "Subscriptions", "Malformed {} payload: {e}", operation.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::logged_in_session;
    use async_trait::async_trait;
    use chatcore::events::EventHandler;
    use chatcore::types::Chat;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Value>>,
        disconnected: Mutex<bool>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_text(&self, text: &str) -> Result<(), anyhow::Error> {
            self.sent.lock().unwrap().push(serde_json::from_str(text)?);
            Ok(())
        }

        async fn disconnect(&self) {
            *self.disconnected.lock().unwrap() = true;
        }
    }

    impl RecordingTransport {
        fn sent_types(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|v| v["type"].as_str().unwrap_or_default().to_string())
                .collect()
        }
    }

    struct ScriptedFactory {
        transport: Arc<RecordingTransport>,
        events: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    }

    #[async_trait]
    impl TransportFactory for ScriptedFactory {
        async fn create_transport(
            &self,
            _url: &str,
        ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
            let events = self
                .events
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow::anyhow!("already connected"))?;
            Ok((self.transport.clone(), events))
        }
    }

    #[derive(Default)]
    struct Seen(Mutex<Vec<String>>);

    impl EventHandler for Seen {
        fn handle_event(&self, event: &Event) {
            let name = format!("{event:?}");
            let name = name.split([' ', '(']).next().unwrap_or_default().to_string();
            self.0.lock().unwrap().push(name);
        }
    }

    struct Harness {
        transport: Arc<RecordingTransport>,
        server: mpsc::Sender<TransportEvent>,
        cache: Arc<LiveCache>,
        seen: Arc<Seen>,
        manager: SubscriptionManager,
    }

    async fn harness() -> Harness {
        let (server, events) = mpsc::channel(16);
        let transport = Arc::new(RecordingTransport::default());
        let factory = Arc::new(ScriptedFactory {
            transport: transport.clone(),
            events: Mutex::new(Some(events)),
        });
        let session = logged_in_session("me").await;
        let seen = Arc::new(Seen::default());
        session.event_bus().add_handler(seen.clone());
        let cache = Arc::new(LiveCache::new());
        let manager =
            SubscriptionManager::new(factory, "ws://test/graphql", session, cache.clone());
        Harness {
            transport,
            server,
            cache,
            seen,
            manager,
        }
    }

    async fn push(server: &mpsc::Sender<TransportEvent>, frame: Value) {
        server
            .send(TransportEvent::TextReceived(frame.to_string()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_handshake_then_subscribe() {
        let h = harness().await;
        push(&h.server, json!({"type": "connection_ack"})).await;

        let handle = h.manager.start().await.unwrap();
        assert_eq!(
            h.transport.sent_types(),
            ["connection_init", "start", "start", "start"]
        );
        let sent = h.transport.sent.lock().unwrap().clone();
        assert_eq!(sent[0]["payload"]["Authorization"], "Basic bWU6cGFzcw==");
        assert_eq!(sent[2]["payload"]["operationName"], "MessageAdded");

        handle.stop().await.unwrap();
        assert_eq!(
            &h.transport.sent_types()[4..],
            ["stop", "stop", "stop", "connection_terminate"]
        );
        assert!(*h.transport.disconnected.lock().unwrap());
        assert_eq!(
            *h.seen.0.lock().unwrap(),
            ["SubscriptionConnected", "SubscriptionDisconnected"]
        );
    }

    #[tokio::test]
    async fn test_rejected_connection() {
        let h = harness().await;
        push(
            &h.server,
            json!({"type": "connection_error", "payload": {"message": "bad auth"}}),
        )
        .await;

        let err = h.manager.start().await.err().unwrap();
        assert!(matches!(
            err,
            SubscriptionError::Protocol(WsProtocolError::ConnectionRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_data_frames_patch_cache_and_dispatch() {
        let h = harness().await;
        h.cache
            .write(|c| c.write_chat_list(&[Chat::new("1"), Chat::new("2")], Some(3)));
        push(&h.server, json!({"type": "connection_ack"})).await;
        let handle = h.manager.start().await.unwrap();
        let mut chats = h.cache.watch_chats();

        push(&h.server, json!({"type": "ka"})).await;
        push(
            &h.server,
            json!({"type": "data", "id": "2", "payload": {"data": {"messageAdded": {
                "id": "9",
                "chat": {"id": "2"},
                "sender": {"id": "b"},
                "content": "pushed",
                "createdAt": "1546300800000"
            }}}}),
        )
        .await;

        let list = chats.changed().await.unwrap().unwrap();
        assert_eq!(list[0].id, "2");
        assert_eq!(list[0].messages[0].content, "pushed");

        h.server.send(TransportEvent::Disconnected).await.unwrap();
        handle.join().await.unwrap();
        assert_eq!(
            *h.seen.0.lock().unwrap(),
            [
                "SubscriptionConnected",
                "MessageAdded",
                "SubscriptionDisconnected"
            ]
        );
    }

    #[tokio::test]
    async fn test_finished_wakes_when_server_drops_connection() {
        let h = harness().await;
        push(&h.server, json!({"type": "connection_ack"})).await;
        let handle = h.manager.start().await.unwrap();

        let pending = tokio::time::timeout(Duration::from_millis(50), handle.finished()).await;
        assert!(pending.is_err());

        h.server.send(TransportEvent::Disconnected).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle.finished())
            .await
            .unwrap();

        // Already exited: finished() keeps resolving and stop() is harmless.
        handle.finished().await;
        handle.stop().await.unwrap();
        assert_eq!(
            *h.seen.0.lock().unwrap(),
            ["SubscriptionConnected", "SubscriptionDisconnected"]
        );
    }

    #[test]
    fn test_patch_for_user_added() {
        let (patch, event) = patch_for(
            &USER_ADDED,
            json!({"userAdded": {"id": "7", "name": "New"}}),
        )
        .unwrap()
        .unwrap();
        assert!(matches!(patch, CachePatch::UserAdded(ref u) if u.id == "7"));
        assert!(matches!(event, Event::UserAdded(_)));

        assert!(patch_for(&USER_ADDED, json!({"userAdded": null})).unwrap().is_none());
        assert!(patch_for(&CHAT_ADDED, json!({"chatAdded": 5})).is_err());
    }
}
