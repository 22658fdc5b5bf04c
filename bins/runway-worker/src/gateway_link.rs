//! Worker side of the realtime gateway connection.
//!
//! One supervised task owns the socket. The dispatcher only ever touches the
//! unbounded sender, so a slow or absent gateway never stalls job processing.
//! A frame whose write fails is kept and sent first after the next connect.

use futures_util::{SinkExt, StreamExt};
use runway_common::messages::{GatewayMessage, ResultEvent};
use runway_common::reconnect::ReconnectPolicy;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Gateway URL with the worker credential attached
pub fn worker_url(base: &str, worker_secret: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut().append_pair("workerSecret", worker_secret);
    Ok(url)
}

/// Start the link. Dropping every clone of the returned sender stops it once
/// the queued frames are written.
pub fn spawn(url: Url, policy: ReconnectPolicy) -> (UnboundedSender<ResultEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(supervise(url, policy, rx));
    (tx, handle)
}

enum PumpEnd {
    Disconnected,
    Finished,
}

async fn supervise(url: Url, policy: ReconnectPolicy, mut updates: UnboundedReceiver<ResultEvent>) {
    let host = url.host_str().unwrap_or("unknown").to_string();
    let mut pending: Option<String> = None;
    let mut attempt = 0u32;

    loop {
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                attempt = 0;
                info!(gateway = %host, "Connected to gateway");
                match pump(socket, &mut updates, &mut pending).await {
                    PumpEnd::Finished => {
                        info!("Gateway link stopped");
                        return;
                    }
                    PumpEnd::Disconnected => warn!(gateway = %host, "Gateway connection lost"),
                }
            }
            Err(e) => warn!(gateway = %host, error = %e, "Failed to connect to gateway"),
        }

        attempt += 1;
        let Some(delay) = policy.next_delay(attempt) else {
            error!(attempts = attempt, "Giving up on gateway connection");
            return;
        };
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting to gateway");
        tokio::time::sleep(delay).await;
    }
}

async fn pump(
    socket: Socket,
    updates: &mut UnboundedReceiver<ResultEvent>,
    pending: &mut Option<String>,
) -> PumpEnd {
    let (mut sink, mut source) = socket.split();

    if let Some(frame) = pending.take() {
        if let Err(e) = sink.send(Message::Text(frame.clone())).await {
            warn!(error = %e, "Failed to resend pending update");
            *pending = Some(frame);
            return PumpEnd::Disconnected;
        }
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(event) = update else {
                    let _ = sink.close().await;
                    return PumpEnd::Finished;
                };
                let frame = GatewayMessage::result_event(&event).to_json();
                if let Err(e) = sink.send(Message::Text(frame.clone())).await {
                    warn!(user_id = %event.user_id, error = %e, "Failed to send update");
                    *pending = Some(frame);
                    return PumpEnd::Disconnected;
                }
            }
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => match GatewayMessage::parse(&text) {
                    Ok(GatewayMessage::Connected { worker_id, .. }) => {
                        info!(worker_id = ?worker_id, "CONNECTED");
                    }
                    Ok(other) => debug!(frame = ?other, "Ignoring gateway frame"),
                    Err(e) => debug!(error = %e, "Unparseable gateway frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    warn!(close = ?frame, "Gateway closed the connection");
                    return PumpEnd::Disconnected;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Gateway socket error");
                    return PumpEnd::Disconnected;
                }
                None => return PumpEnd::Disconnected,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::{accept_async, accept_hdr_async};

    async fn next_text(socket: &mut WebSocketStream<TcpStream>) -> Value {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("socket ended")
                .unwrap();
            if let Message::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[test]
    fn test_worker_url_carries_secret() {
        let url = worker_url("ws://127.0.0.1:8080", "s3cret&x").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8080/?workerSecret=s3cret%26x");
        assert!(worker_url("not a url", "x").is_err());
    }

    #[tokio::test]
    async fn test_updates_are_forwarded_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("ws://{}", listener.local_addr().unwrap());
        let (tx, _link) = spawn(worker_url(&base, "worker-secret").unwrap(), ReconnectPolicy::fixed(Duration::from_millis(10)));

        let (stream, _) = listener.accept().await.unwrap();
        let mut query = None;
        let mut socket = accept_hdr_async(stream, |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            query = req.uri().query().map(str::to_string);
            Ok(resp)
        })
        .await
        .unwrap();
        assert_eq!(query.as_deref(), Some("workerSecret=worker-secret"));

        tx.send(ResultEvent::new("u1", "Executing Code")).unwrap();
        tx.send(ResultEvent::new("u1", "Hello\n")).unwrap();

        assert_eq!(
            next_text(&mut socket).await,
            json!({ "type": "UPDATE_USER", "payload": { "userId": "u1", "result": "Executing Code" } })
        );
        assert_eq!(next_text(&mut socket).await["payload"]["result"], "Hello\n");
    }

    #[tokio::test]
    async fn test_reconnects_after_gateway_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("ws://{}", listener.local_addr().unwrap());
        let (tx, _link) = spawn(worker_url(&base, "worker-secret").unwrap(), ReconnectPolicy::fixed(Duration::from_millis(10)));

        let (stream, _) = listener.accept().await.unwrap();
        let first = accept_async(stream).await.unwrap();
        drop(first);

        let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
            .await
            .expect("link did not reconnect")
            .unwrap();
        let mut second = accept_async(stream).await.unwrap();

        tx.send(ResultEvent::new("u2", "after reconnect")).unwrap();
        assert_eq!(next_text(&mut second).await["payload"]["userId"], "u2");
    }

    #[tokio::test]
    async fn test_link_stops_when_senders_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("ws://{}", listener.local_addr().unwrap());
        let (tx, link) = spawn(worker_url(&base, "worker-secret").unwrap(), ReconnectPolicy::default());

        let (stream, _) = listener.accept().await.unwrap();
        let _socket = accept_async(stream).await.unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), link)
            .await
            .expect("link kept running")
            .unwrap();
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let policy = ReconnectPolicy::fixed(Duration::from_millis(5)).with_max_attempts(2);
        let (_tx, link) = spawn(worker_url(&base, "worker-secret").unwrap(), policy);

        tokio::time::timeout(Duration::from_secs(5), link)
            .await
            .expect("link kept retrying")
            .unwrap();
    }
}
