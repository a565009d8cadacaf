//! Subscriptions over the `graphql-transport-ws` protocol.
//!
//! One connection carries any number of subscriptions. A background task
//! reads server frames and routes each `next`/`error`/`complete` to the
//! channel of the subscription with that id; a second task owns the write
//! half and sends whatever the handles queue.

use crate::error::{ClientError, ErrorCode};
use crate::operation::{GraphqlError, GraphqlOperation, OperationKind, Request, Response};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// The WebSocket subprotocol spoken by [`WebSocketClient`].
pub const PROTOCOL: &str = "graphql-transport-ws";

const ACK_TIMEOUT: Duration = Duration::from_secs(10);

type Item = Result<Response<Value>, ClientError>;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage<'a> {
    ConnectionInit {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<&'a Value>,
    },
    Subscribe {
        id: &'a str,
        payload: &'a Request,
    },
    Complete {
        id: &'a str,
    },
    Pong,
}

impl ClientMessage<'_> {
    fn to_message(&self) -> Result<Message, ClientError> {
        serde_json::to_string(self)
            .map(Message::Text)
            .map_err(|error| ClientError::serialize(error.to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    ConnectionAck,
    Next { id: String, payload: Response<Value> },
    Error { id: String, payload: Vec<GraphqlError> },
    Complete { id: String },
    Ping,
    Pong,
}

struct Entry {
    sender: mpsc::UnboundedSender<Item>,
    closed: AtomicBool,
}

/// State shared by the connection tasks and every subscription handle.
struct Hub {
    outgoing: mpsc::UnboundedSender<Message>,
    subscriptions: Mutex<HashMap<String, Arc<Entry>>>,
    next_id: AtomicU64,
}

impl Hub {
    fn subscriptions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Entry>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, id: &str) -> Option<Arc<Entry>> {
        self.subscriptions().get(id).cloned()
    }

    /// Stops a subscription from the client side. Closing twice is a no-op.
    fn close(&self, id: &str) {
        let Some(entry) = self.subscriptions().remove(id) else {
            return;
        };
        if entry.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(id, "closing subscription");
        if let Ok(message) = (ClientMessage::Complete { id }).to_message() {
            let _ = self.outgoing.send(message);
        }
    }

    /// Ends a subscription the server finished; nothing is sent back.
    fn finish(&self, id: &str) {
        if let Some(entry) = self.subscriptions().remove(id) {
            entry.closed.store(true, Ordering::Release);
        }
    }

    fn dispatch(&self, message: ServerMessage) {
        match message {
            ServerMessage::Next { id, payload } => match self.entry(&id) {
                Some(entry) => {
                    let _ = entry.sender.send(Ok(payload));
                }
                None => tracing::debug!(%id, "dropping result for unknown subscription"),
            },
            ServerMessage::Error { id, payload } => {
                if let Some(entry) = self.entry(&id) {
                    let _ = entry.sender.send(Err(ClientError::graphql(payload)));
                }
                self.finish(&id);
            }
            ServerMessage::Complete { id } => self.finish(&id),
            ServerMessage::Ping => {
                if let Ok(message) = ClientMessage::Pong.to_message() {
                    let _ = self.outgoing.send(message);
                }
            }
            ServerMessage::ConnectionAck | ServerMessage::Pong => {}
        }
    }

    /// Fails every open subscription; used when the connection is lost.
    fn disconnect(&self, reason: &str) {
        let entries: Vec<_> = self.subscriptions().drain().collect();
        for (id, entry) in entries {
            if !entry.closed.swap(true, Ordering::AcqRel) {
                let _ = entry.sender.send(Err(ClientError::new(
                    ErrorCode::SubscriptionClosed,
                    format!("subscription {id}: {reason}"),
                )));
            }
        }
    }
}

/// A `graphql-transport-ws` connection.
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct WebSocketClient {
    hub: Arc<Hub>,
}

impl WebSocketClient {
    /// Connects to `url` (a `ws://` or `wss://` URL) and completes the
    /// connection handshake.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        Self::connect_with_payload(url, None).await
    }

    /// Like [`connect`](Self::connect), sending `payload` in
    /// `connection_init`.
    pub async fn connect_with_payload(
        url: &str,
        payload: Option<Value>,
    ) -> Result<Self, ClientError> {
        let mut request = url.into_client_request()?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(PROTOCOL));
        let (stream, _) = tokio_tungstenite::connect_async(request).await?;
        tracing::debug!(url, "websocket connected");
        Self::from_stream(stream, payload).await
    }

    /// Runs the protocol over an already upgraded stream.
    pub async fn from_stream<S>(
        mut stream: WebSocketStream<S>,
        payload: Option<Value>,
    ) -> Result<Self, ClientError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let init = ClientMessage::ConnectionInit {
            payload: payload.as_ref(),
        };
        stream.send(init.to_message()?).await?;
        tokio::time::timeout(ACK_TIMEOUT, wait_for_ack(&mut stream))
            .await
            .map_err(|_| ClientError::new(ErrorCode::Timeout, "no connection_ack from server"))??;

        let (mut sink, mut source) = stream.split();
        let (outgoing, mut queued) = mpsc::unbounded_channel::<Message>();
        let hub = Arc::new(Hub {
            outgoing,
            subscriptions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });

        tokio::spawn(async move {
            while let Some(message) = queued.recv().await {
                if let Err(error) = sink.send(message).await {
                    tracing::warn!(%error, "websocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // The reader holds the hub weakly so dropping every handle shuts the
        // writer down, which closes the connection.
        let reader = Arc::downgrade(&hub);
        tokio::spawn(async move {
            let reason = loop {
                let message = match source.next().await {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break "connection closed".to_string(),
                    Some(Ok(_)) => continue,
                    Some(Err(error)) => break error.to_string(),
                };
                let Some(hub) = reader.upgrade() else {
                    return;
                };
                match serde_json::from_str::<ServerMessage>(&message) {
                    Ok(message) => hub.dispatch(message),
                    Err(error) => tracing::warn!(%error, "ignoring malformed server message"),
                }
            };
            tracing::debug!(%reason, "websocket reader stopped");
            if let Some(hub) = reader.upgrade() {
                hub.disconnect(&reason);
            }
        });

        Ok(Self { hub })
    }

    /// Starts subscription `O`.
    pub fn subscribe<O: GraphqlOperation>(
        &self,
        variables: &O::Variables,
    ) -> Result<Subscription<O::ResponseData>, ClientError> {
        if O::KIND != OperationKind::Subscription {
            return Err(ClientError::new(
                ErrorCode::UnsupportedOperation,
                format!("{} is not a subscription", O::NAME),
            ));
        }
        let request = Request::new::<O>(variables)?;
        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.hub.subscriptions().insert(
            id.clone(),
            Arc::new(Entry {
                sender,
                closed: AtomicBool::new(false),
            }),
        );

        let message = ClientMessage::Subscribe {
            id: &id,
            payload: &request,
        }
        .to_message()?;
        if self.hub.outgoing.send(message).is_err() {
            self.hub.finish(&id);
            return Err(ClientError::new(
                ErrorCode::SubscriptionClosed,
                "connection closed",
            ));
        }
        tracing::debug!(operation = O::NAME, %id, "subscribed");

        Ok(Subscription {
            id,
            receiver,
            hub: Arc::clone(&self.hub),
            _data: PhantomData,
        })
    }

    /// Number of subscriptions still open.
    pub fn active(&self) -> usize {
        self.hub.subscriptions().len()
    }
}

async fn wait_for_ack<S>(stream: &mut WebSocketStream<S>) -> Result<(), ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(message) = stream.next().await {
        let Message::Text(text) = message? else {
            continue;
        };
        match serde_json::from_str::<ServerMessage>(&text) {
            Ok(ServerMessage::ConnectionAck) => return Ok(()),
            Ok(ServerMessage::Ping) => stream.send(ClientMessage::Pong.to_message()?).await?,
            Ok(_) => {}
            Err(error) => return Err(ClientError::protocol(format!("bad handshake frame: {error}"))),
        }
    }
    Err(ClientError::protocol("connection closed during handshake"))
}

/// An open subscription. Dropping it sends `complete` to the server.
pub struct Subscription<T> {
    id: String,
    receiver: mpsc::UnboundedReceiver<Item>,
    hub: Arc<Hub>,
    _data: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Subscription<T> {
    /// Waits for the next result. Returns `None` once the subscription is
    /// complete.
    pub async fn next(&mut self) -> Option<Result<Response<T>, ClientError>> {
        let item = self.receiver.recv().await?;
        Some(item.and_then(|response| response.decode()))
    }
}

impl<T> Subscription<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stops the subscription. Results already received stay readable.
    pub fn close(&self) {
        self.hub.close(&self.id);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.hub.close(&self.id);
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> (Hub, mpsc::UnboundedReceiver<Message>) {
        let (outgoing, queued) = mpsc::unbounded_channel();
        let hub = Hub {
            outgoing,
            subscriptions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        };
        (hub, queued)
    }

    fn open(hub: &Hub, id: &str) -> mpsc::UnboundedReceiver<Item> {
        let (sender, receiver) = mpsc::unbounded_channel();
        hub.subscriptions().insert(
            id.to_string(),
            Arc::new(Entry {
                sender,
                closed: AtomicBool::new(false),
            }),
        );
        receiver
    }

    fn text(message: Message) -> Value {
        match message {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_client_messages() {
        let init = ClientMessage::ConnectionInit { payload: None };
        assert_eq!(
            text(init.to_message().unwrap()),
            serde_json::json!({"type": "connection_init"})
        );
        assert_eq!(
            text(ClientMessage::Pong.to_message().unwrap()),
            serde_json::json!({"type": "pong"})
        );
    }

    #[test]
    fn test_server_messages() {
        let message: ServerMessage = serde_json::from_str(
            r#"{"type": "next", "id": "1", "payload": {"data": {"ticks": 1}}}"#,
        )
        .unwrap();
        assert!(matches!(message, ServerMessage::Next { ref id, .. } if id == "1"));

        let message: ServerMessage =
            serde_json::from_str(r#"{"type": "connection_ack", "payload": {}}"#).unwrap();
        assert!(matches!(message, ServerMessage::ConnectionAck));
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_id() {
        let (hub, _queued) = hub();
        let mut first = open(&hub, "1");
        let mut second = open(&hub, "2");

        hub.dispatch(ServerMessage::Next {
            id: "2".to_string(),
            payload: serde_json::from_value(serde_json::json!({"data": 2})).unwrap(),
        });
        hub.dispatch(ServerMessage::Complete { id: "1".to_string() });

        assert!(first.recv().await.is_none());
        let item = second.recv().await.unwrap().unwrap();
        assert_eq!(item.data, Some(serde_json::json!(2)));
        assert_eq!(hub.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn test_error_ends_subscription() {
        let (hub, _queued) = hub();
        let mut receiver = open(&hub, "1");

        hub.dispatch(ServerMessage::Error {
            id: "1".to_string(),
            payload: vec![GraphqlError::new("boom")],
        });

        let error = receiver.recv().await.unwrap().unwrap_err();
        assert_eq!(error.code, ErrorCode::Graphql);
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (hub, mut queued) = hub();
        let _receiver = open(&hub, "7");

        hub.close("7");
        hub.close("7");

        assert_eq!(
            text(queued.recv().await.unwrap()),
            serde_json::json!({"type": "complete", "id": "7"})
        );
        assert!(queued.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_after_server_complete_sends_nothing() {
        let (hub, mut queued) = hub();
        let _receiver = open(&hub, "3");

        hub.dispatch(ServerMessage::Complete { id: "3".to_string() });
        hub.close("3");

        assert!(queued.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_fails_open_subscriptions() {
        let (hub, _queued) = hub();
        let mut receiver = open(&hub, "1");

        hub.disconnect("connection closed");

        let error = receiver.recv().await.unwrap().unwrap_err();
        assert_eq!(error.code, ErrorCode::SubscriptionClosed);
        assert_eq!(hub.subscriptions().len(), 0);
    }

    #[tokio::test]
    async fn test_ping_is_answered() {
        let (hub, mut queued) = hub();
        hub.dispatch(ServerMessage::Ping);
        assert_eq!(
            text(queued.recv().await.unwrap()),
            serde_json::json!({"type": "pong"})
        );
    }
}
