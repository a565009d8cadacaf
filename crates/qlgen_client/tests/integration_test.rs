//! Integration tests for qlgen_client against local HTTP and WebSocket servers.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use qlgen_client::{
    execute, Client, ClientConfig, ClientError, ErrorCode, GraphqlOperation, HttpClient,
    OperationKind, Request, Response, WebSocketClient,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as HandshakeRequest, Response as HandshakeResponse,
};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

// Operations written the way the generator emits them.

struct GetUser;

#[derive(Serialize)]
struct GetUserVariables {
    id: String,
}

#[derive(Debug, PartialEq, Deserialize)]
struct GetUserResponse {
    user: Option<GetUserUser>,
}

#[derive(Debug, PartialEq, Deserialize)]
struct GetUserUser {
    id: String,
    name: String,
}

impl GraphqlOperation for GetUser {
    type Variables = GetUserVariables;
    type ResponseData = GetUserResponse;
    const NAME: &'static str = "GetUser";
    const KIND: OperationKind = OperationKind::Query;
    const DOCUMENT: &'static str = "query GetUser($id: ID!) { user(id: $id) { id name } }";
}

struct Ticks;

#[derive(Debug, PartialEq, Deserialize)]
struct TicksResponse {
    ticks: i32,
}

impl GraphqlOperation for Ticks {
    type Variables = ();
    type ResponseData = TicksResponse;
    const NAME: &'static str = "Ticks";
    const KIND: OperationKind = OperationKind::Subscription;
    const DOCUMENT: &'static str = "subscription Ticks { ticks }";
}

// ============================================
// HTTP
// ============================================

/// Answers one request per entry of `responses`, forwarding each request
/// body to the returned channel.
async fn http_server(
    responses: Vec<(u16, &'static str)>,
) -> (String, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (requests, received) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_http_body(&mut stream).await;
            let _ = requests.send(serde_json::from_slice(&request).unwrap_or(Value::Null));
            let response = format!(
                "HTTP/1.1 {status} Status\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        }
    });

    (format!("http://{address}/graphql"), received)
}

async fn read_http_body(stream: &mut TcpStream) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let read = stream.read(&mut chunk).await.unwrap();
        if read == 0 {
            return Vec::new();
        }
        buffer.extend_from_slice(&chunk[..read]);

        let Some(end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buffer[..end]).to_lowercase();
        let length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .map_or(0, |value| value.trim().parse::<usize>().unwrap());
        let start = end + 4;
        if buffer.len() >= start + length {
            return buffer[start..start + length].to_vec();
        }
    }
}

#[tokio::test]
async fn test_execute_query() {
    let (url, mut requests) = http_server(vec![(
        200,
        r#"{"data": {"user": {"id": "1", "name": "Alice"}}}"#,
    )])
    .await;
    let client = HttpClient::new(url).unwrap();

    let response = execute::<GetUser, _>(
        &client,
        GetUserVariables {
            id: "1".to_string(),
        },
    )
    .await
    .unwrap();

    assert_eq!(
        response.into_result().unwrap(),
        GetUserResponse {
            user: Some(GetUserUser {
                id: "1".to_string(),
                name: "Alice".to_string(),
            }),
        }
    );

    let request = requests.recv().await.unwrap();
    assert_eq!(request["operationName"], "GetUser");
    assert_eq!(request["variables"], json!({"id": "1"}));
    assert_eq!(request["query"], GetUser::DOCUMENT);
}

#[tokio::test]
async fn test_graphql_errors_with_error_status() {
    let (url, _requests) = http_server(vec![(
        400,
        r#"{"data": null, "errors": [{"message": "Variable \"$id\" is required", "locations": [{"line": 1, "column": 15}]}]}"#,
    )])
    .await;
    let client = HttpClient::new(url).unwrap();

    let response = execute::<GetUser, _>(
        &client,
        GetUserVariables {
            id: String::new(),
        },
    )
    .await
    .unwrap();

    assert!(response.data.is_none());
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].locations[0].column, 15);

    let error = response.into_result().unwrap_err();
    assert_eq!(error.code, ErrorCode::Graphql);
}

#[tokio::test]
async fn test_non_graphql_error_body() {
    let (url, _requests) = http_server(vec![(502, "bad gateway")]).await;
    let client = HttpClient::new(url).unwrap();

    let error = execute::<GetUser, _>(
        &client,
        GetUserVariables {
            id: "1".to_string(),
        },
    )
    .await
    .unwrap_err();

    assert_eq!(error.code, ErrorCode::HttpStatus);
    assert!(error.message.contains("bad gateway"));
}

#[tokio::test]
async fn test_undecodable_data() {
    let (url, _requests) = http_server(vec![(200, r#"{"data": {"user": {"id": 1}}}"#)]).await;
    let client = HttpClient::new(url).unwrap();

    let error = execute::<GetUser, _>(
        &client,
        GetUserVariables {
            id: "1".to_string(),
        },
    )
    .await
    .unwrap_err();

    assert_eq!(error.code, ErrorCode::Deserialize);
}

#[tokio::test]
async fn test_connection_refused_after_retries() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig::new(format!("http://{address}/graphql"))
        .max_retries(2)
        .retry_delay(Duration::from_millis(1));
    let client = HttpClient::with_config(config).unwrap();

    let error = execute::<GetUser, _>(
        &client,
        GetUserVariables {
            id: "1".to_string(),
        },
    )
    .await
    .unwrap_err();

    assert_eq!(error.code, ErrorCode::Network);
    assert!(error.is_retryable());
}

struct Canned(Value);

#[async_trait]
impl Client for Canned {
    async fn post(&self, request: &Request) -> Result<Response<Value>, ClientError> {
        assert_eq!(request.operation_name, "GetUser");
        Ok(serde_json::from_value(self.0.clone()).unwrap())
    }
}

#[tokio::test]
async fn test_custom_transport() {
    let client = Canned(json!({"data": {"user": null}}));

    let response = execute::<GetUser, _>(
        &client,
        GetUserVariables {
            id: "9".to_string(),
        },
    )
    .await
    .unwrap();

    assert_eq!(response.into_result().unwrap(), GetUserResponse { user: None });
}

#[tokio::test]
async fn test_execute_rejects_subscriptions() {
    let client = Canned(Value::Null);
    let error = execute::<Ticks, _>(&client, ()).await.unwrap_err();
    assert_eq!(error.code, ErrorCode::UnsupportedOperation);
}

// ============================================
// WebSocket
// ============================================

type ServerSocket = WebSocketStream<TcpStream>;

/// Accepts one connection, completes the handshake, and hands the socket to
/// `script`.
async fn ws_server<F, Fut>(script: F) -> (String, tokio::task::JoinHandle<Vec<Value>>)
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Vec<Value>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_hdr_async(
            stream,
            |_: &HandshakeRequest, mut response: HandshakeResponse| -> Result<HandshakeResponse, ErrorResponse> {
                response.headers_mut().insert(
                    "Sec-WebSocket-Protocol",
                    HeaderValue::from_static("graphql-transport-ws"),
                );
                Ok(response)
            },
        )
        .await
        .unwrap();

        let init = receive(&mut socket).await;
        assert_eq!(init["type"], "connection_init");
        send(&mut socket, json!({"type": "connection_ack"})).await;

        script(socket).await
    });

    (format!("ws://{address}/graphql"), handle)
}

async fn send(socket: &mut ServerSocket, message: Value) {
    socket.send(Message::Text(message.to_string())).await.unwrap();
}

async fn receive(socket: &mut ServerSocket) -> Value {
    loop {
        match socket.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Close(_) => return Value::Null,
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_subscription_receives_results() {
    let (url, server) = ws_server(|mut socket| async move {
        let subscribe = receive(&mut socket).await;
        let id = subscribe["id"].clone();
        send(&mut socket, json!({"type": "next", "id": id, "payload": {"data": {"ticks": 1}}})).await;
        send(&mut socket, json!({"type": "next", "id": id, "payload": {"data": {"ticks": 2}}})).await;
        send(&mut socket, json!({"type": "complete", "id": id})).await;
        vec![subscribe]
    })
    .await;

    let client = WebSocketClient::connect(&url).await.unwrap();
    let mut ticks = client.subscribe::<Ticks>(&()).unwrap();

    let first = ticks.next().await.unwrap().unwrap();
    assert_eq!(first.data, Some(TicksResponse { ticks: 1 }));
    let second = ticks.next().await.unwrap().unwrap();
    assert_eq!(second.data, Some(TicksResponse { ticks: 2 }));
    assert!(ticks.next().await.is_none());
    assert_eq!(client.active(), 0);

    let received = server.await.unwrap();
    assert_eq!(received[0]["type"], "subscribe");
    assert_eq!(received[0]["payload"]["operationName"], "Ticks");
    assert_eq!(received[0]["payload"]["query"], Ticks::DOCUMENT);
}

#[tokio::test]
async fn test_subscription_error() {
    let (url, _server) = ws_server(|mut socket| async move {
        let subscribe = receive(&mut socket).await;
        send(
            &mut socket,
            json!({"type": "error", "id": subscribe["id"], "payload": [{"message": "not allowed"}]}),
        )
        .await;
        // Keep the connection open until the client goes away.
        let _ = receive(&mut socket).await;
        Vec::new()
    })
    .await;

    let client = WebSocketClient::connect(&url).await.unwrap();
    let mut ticks = client.subscribe::<Ticks>(&()).unwrap();

    let error = ticks.next().await.unwrap().unwrap_err();
    assert_eq!(error.code, ErrorCode::Graphql);
    assert_eq!(error.errors[0].message, "not allowed");
    assert!(ticks.next().await.is_none());
}

#[tokio::test]
async fn test_dropping_subscription_sends_complete() {
    let (url, server) = ws_server(|mut socket| async move {
        let subscribe = receive(&mut socket).await;
        send(
            &mut socket,
            json!({"type": "next", "id": subscribe["id"], "payload": {"data": {"ticks": 1}}}),
        )
        .await;
        let complete = receive(&mut socket).await;
        vec![subscribe, complete]
    })
    .await;

    let client = WebSocketClient::connect(&url).await.unwrap();
    let mut ticks = client.subscribe::<Ticks>(&()).unwrap();
    let first = ticks.next().await.unwrap().unwrap();
    assert_eq!(first.data, Some(TicksResponse { ticks: 1 }));

    ticks.close();
    drop(ticks);

    let received = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received[1], json!({"type": "complete", "id": received[0]["id"]}));
}

#[tokio::test]
async fn test_subscribe_rejects_queries() {
    let (url, _server) = ws_server(|mut socket| async move {
        let _ = receive(&mut socket).await;
        Vec::new()
    })
    .await;

    let client = WebSocketClient::connect(&url).await.unwrap();
    let error = client
        .subscribe::<GetUser>(&GetUserVariables {
            id: "1".to_string(),
        })
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::UnsupportedOperation);
}
