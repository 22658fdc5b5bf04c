// WebSocket endpoint for the Runway gateway

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use runway_common::messages::{GatewayMessage, ResultEvent};
use serde::Deserialize;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{Authenticator, Claims};
use crate::registry::{ConnectionRegistry, UserConnection, WorkerConnection};

pub const CLOSE_TOKEN_MISSING: u16 = 4001;
pub const CLOSE_FORBIDDEN: u16 = 4003;

#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<ConnectionRegistry>,
    pub auth: Arc<Authenticator>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "workerSecret")]
    pub worker_secret: Option<String>,
}

#[derive(Debug)]
pub enum Role {
    User(Claims),
    Worker,
}

#[derive(Debug, PartialEq)]
pub struct Rejection {
    pub code: u16,
    pub reason: &'static str,
}

/// A worker secret takes precedence over a token; with neither the socket is refused.
pub fn authenticate(params: &ConnectParams, auth: &Authenticator) -> Result<Role, Rejection> {
    let present = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

    if let Some(secret) = present(&params.worker_secret) {
        return if auth.verify_worker_secret(&secret) {
            Ok(Role::Worker)
        } else {
            Err(Rejection {
                code: CLOSE_FORBIDDEN,
                reason: "Invalid worker secret",
            })
        };
    }

    match present(&params.token) {
        None => Err(Rejection {
            code: CLOSE_TOKEN_MISSING,
            reason: "Token not provided",
        }),
        Some(token) => auth.verify_token(&token).map(Role::User).map_err(|_| Rejection {
            code: CLOSE_FORBIDDEN,
            reason: "Invalid token",
        }),
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<GatewayState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

/// GET /health - Live connection counts
async fn health_check(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "users": state.registry.user_count().await,
        "userConnections": state.registry.user_connection_count().await,
        "guestConnections": state.registry.guest_connection_count().await,
        "workers": state.registry.worker_count().await,
    }))
}

async fn handle_socket(mut socket: WebSocket, params: ConnectParams, state: GatewayState) {
    match authenticate(&params, &state.auth) {
        Ok(Role::User(claims)) => serve_user(socket, claims, state).await,
        Ok(Role::Worker) => serve_worker(socket, state).await,
        Err(rejection) => {
            warn!(code = rejection.code, reason = rejection.reason, "Connection refused");
            let close = Message::Close(Some(CloseFrame {
                code: rejection.code,
                reason: Cow::Borrowed(rejection.reason),
            }));
            if let Err(e) = socket.send(close).await {
                debug!(error = %e, "Failed to send close frame");
            }
        }
    }
}

/// Drain a connection's outbound channel into its socket
fn spawn_writer(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    })
}

async fn serve_user(socket: WebSocket, claims: Claims, state: GatewayState) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = spawn_writer(sink, rx);

    let connection_id = Uuid::new_v4().to_string();
    state
        .registry
        .add_user(UserConnection {
            connection_id: connection_id.clone(),
            user_id: claims.user_id.clone(),
            name: claims.name.clone(),
            is_guest: claims.is_guest,
            sender: tx.clone(),
        })
        .await;
    info!(
        user_id = %claims.user_id,
        connection_id = %connection_id,
        is_guest = claims.is_guest,
        "User connected"
    );

    let _ = tx.send(GatewayMessage::connected_user(&claims.user_id).to_json());

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match GatewayMessage::parse(&text) {
                // Echo the exact text so clients can match their own heartbeat
                Ok(GatewayMessage::Heartbeat) => {
                    let _ = tx.send(text);
                }
                Ok(other) => debug!(user_id = %claims.user_id, frame = ?other, "Ignoring user frame"),
                Err(e) => debug!(user_id = %claims.user_id, error = %e, "Unparseable user frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(user_id = %claims.user_id, error = %e, "User socket error");
                break;
            }
        }
    }

    if let Some(removed) = state.registry.remove_user(&claims.user_id, &connection_id).await {
        info!(
            user_id = %removed.user_id,
            name = %removed.name,
            connection_id = %removed.connection_id,
            "User disconnected"
        );
    }
    drop(tx);
    writer.abort();
}

async fn serve_worker(socket: WebSocket, state: GatewayState) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = spawn_writer(sink, rx);

    let worker_id = Uuid::new_v4().to_string();
    state
        .registry
        .add_worker(WorkerConnection {
            worker_id: worker_id.clone(),
            sender: tx,
        })
        .await;
    info!(worker_id = %worker_id, "Worker connected");

    state
        .registry
        .send_to_worker(&worker_id, &GatewayMessage::connected_worker(&worker_id).to_json())
        .await;

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match GatewayMessage::parse(&text) {
                Ok(GatewayMessage::UpdateUser { payload }) => {
                    route_result(&state.registry, &worker_id, payload).await
                }
                Ok(GatewayMessage::Heartbeat) => {
                    state.registry.send_to_worker(&worker_id, &text).await;
                }
                Ok(other) => debug!(worker_id = %worker_id, frame = ?other, "Ignoring worker frame"),
                Err(e) => warn!(worker_id = %worker_id, error = %e, "Unparseable worker frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(worker_id = %worker_id, error = %e, "Worker socket error");
                break;
            }
        }
    }

    state.registry.remove_worker(&worker_id).await;
    info!(worker_id = %worker_id, "Worker disconnected");
    writer.abort();
}

/// Forward only the `result` of a worker's update to the addressed user
async fn route_result(registry: &ConnectionRegistry, worker_id: &str, payload: serde_json::Value) {
    let event: ResultEvent = match serde_json::from_value(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(worker_id = %worker_id, error = %e, "UPDATE_USER without userId/result");
            return;
        }
    };

    let frame = GatewayMessage::UpdateUser {
        payload: event.result,
    }
    .to_json();
    let delivered = registry.send_to_user(&event.user_id, &frame).await;
    debug!(user_id = %event.user_id, delivered, "Result routed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::sign;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    const JWT_SECRET: &str = "test-jwt-secret";
    const WORKER_SECRET: &str = "test-worker-secret";

    async fn start() -> (String, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let state = GatewayState {
            registry: registry.clone(),
            auth: Arc::new(Authenticator::new(JWT_SECRET, WORKER_SECRET)),
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        (format!("ws://{}", addr), registry)
    }

    fn token(user_id: &str) -> String {
        sign(
            JWT_SECRET,
            &Claims {
                user_id: user_id.into(),
                name: "Ada".into(),
                is_guest: false,
                exp: None,
            },
        )
    }

    async fn connect(url: String) -> Client {
        let (stream, _) = connect_async(url).await.unwrap();
        stream
    }

    async fn next_text(client: &mut Client) -> String {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("frame in time")
                .expect("stream open")
                .unwrap();
            match frame {
                WsMessage::Text(text) => return text,
                WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
                other => panic!("unexpected frame: {:?}", other),
            }
        }
    }

    async fn close_code(client: &mut Client) -> u16 {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("frame in time")
                .expect("stream open")
                .unwrap();
            if let WsMessage::Close(Some(close)) = frame {
                return u16::from(close.code);
            }
        }
    }

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_authenticate_roles() {
        let auth = Authenticator::new(JWT_SECRET, WORKER_SECRET);

        let none = ConnectParams::default();
        assert_eq!(authenticate(&none, &auth).unwrap_err().code, CLOSE_TOKEN_MISSING);

        let worker = ConnectParams {
            token: Some(token("u1")),
            worker_secret: Some(WORKER_SECRET.into()),
        };
        assert!(matches!(authenticate(&worker, &auth), Ok(Role::Worker)));

        // A worker secret is never a user token
        let swapped = ConnectParams {
            token: Some(WORKER_SECRET.into()),
            worker_secret: None,
        };
        assert_eq!(
            authenticate(&swapped, &auth).unwrap_err(),
            Rejection { code: CLOSE_FORBIDDEN, reason: "Invalid token" }
        );
    }

    #[tokio::test]
    async fn test_missing_token_closes_4001() {
        let (url, registry) = start().await;
        let mut client = connect(format!("{}/", url)).await;
        assert_eq!(close_code(&mut client).await, 4001);
        assert_eq!(registry.user_connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_token_closes_4003() {
        let (url, _) = start().await;
        let mut client = connect(format!("{}/?token=garbage", url)).await;
        assert_eq!(close_code(&mut client).await, 4003);
    }

    #[tokio::test]
    async fn test_invalid_worker_secret_registers_nothing() {
        let (url, registry) = start().await;
        let mut client = connect(format!("{}/?workerSecret=wrong", url)).await;
        assert_eq!(close_code(&mut client).await, 4003);
        assert_eq!(registry.worker_count().await, 0);
    }

    #[tokio::test]
    async fn test_user_connect_and_heartbeat_echo() {
        let (url, registry) = start().await;
        let mut user = connect(format!("{}/?token={}", url, token("u1"))).await;

        let connected: Value = serde_json::from_str(&next_text(&mut user).await).unwrap();
        assert_eq!(connected, json!({"type": "CONNECTED", "payload": "u1"}));
        assert_eq!(registry.user_connection_count().await, 1);

        let heartbeat = r#"{ "type": "HEARTBEAT" }"#;
        user.send(WsMessage::Text(heartbeat.into())).await.unwrap();
        assert_eq!(next_text(&mut user).await, heartbeat);
    }

    #[tokio::test]
    async fn test_only_heartbeats_are_echoed_to_users() {
        let (url, _) = start().await;
        let mut user = connect(format!("{}/?token={}", url, token("u1"))).await;
        next_text(&mut user).await;

        for ignored in [
            r#"{"type":"UPDATE_USER","payload":{"userId":"u2","result":"spoofed"}}"#,
            r#"{"type":"CONNECTED","payload":"u1"}"#,
            "not json at all",
        ] {
            user.send(WsMessage::Text(ignored.into())).await.unwrap();
        }
        let heartbeat = r#"{"type":"HEARTBEAT"}"#;
        user.send(WsMessage::Text(heartbeat.into())).await.unwrap();

        // Frames are answered in order, so anything echoed earlier would come first
        assert_eq!(next_text(&mut user).await, heartbeat);
        let quiet = tokio::time::timeout(Duration::from_millis(200), user.next()).await;
        assert!(quiet.is_err(), "unexpected frame after heartbeat: {:?}", quiet);
    }

    #[tokio::test]
    async fn test_worker_result_reaches_every_user_connection() {
        let (url, registry) = start().await;
        let user_url = format!("{}/ws?token={}", url, token("u1"));
        let mut tab_one = connect(user_url.clone()).await;
        let mut tab_two = connect(user_url).await;
        next_text(&mut tab_one).await;
        next_text(&mut tab_two).await;

        let mut worker = connect(format!("{}/?workerSecret={}", url, WORKER_SECRET)).await;
        let connected: Value = serde_json::from_str(&next_text(&mut worker).await).unwrap();
        assert_eq!(connected["type"], "CONNECTED");
        assert!(connected["workerId"].as_str().is_some());
        assert_eq!(registry.worker_count().await, 1);

        let update = json!({"type": "UPDATE_USER", "payload": {"userId": "u1", "result": "Hello, World!\n"}});
        worker.send(WsMessage::Text(update.to_string())).await.unwrap();

        let expected = json!({"type": "UPDATE_USER", "payload": "Hello, World!\n"});
        for tab in [&mut tab_one, &mut tab_two] {
            let got: Value = serde_json::from_str(&next_text(tab).await).unwrap();
            assert_eq!(got, expected);
        }
    }

    #[tokio::test]
    async fn test_result_for_absent_user_is_dropped() {
        let (url, _) = start().await;
        let mut worker = connect(format!("{}/?workerSecret={}", url, WORKER_SECRET)).await;
        next_text(&mut worker).await;

        let update = json!({"type": "UPDATE_USER", "payload": {"userId": "ghost", "result": "x"}});
        worker.send(WsMessage::Text(update.to_string())).await.unwrap();
        worker.send(WsMessage::Text("not json".into())).await.unwrap();

        // Connection survives both frames
        let heartbeat = r#"{"type":"HEARTBEAT"}"#;
        worker.send(WsMessage::Text(heartbeat.into())).await.unwrap();
        assert_eq!(next_text(&mut worker).await, heartbeat);
    }

    #[tokio::test]
    async fn test_disconnect_removes_connection() {
        let (url, registry) = start().await;
        let mut user = connect(format!("{}/?token={}", url, token("u1"))).await;
        next_text(&mut user).await;
        assert_eq!(registry.user_count().await, 1);

        user.close(None).await.unwrap();
        let registry_ref = registry.clone();
        eventually(move || {
            let registry = registry_ref.clone();
            async move { registry.user_count().await == 0 }
        })
        .await;
        assert_eq!(registry.send_to_user("u1", "late").await, 0);
    }
}
