// Follow a user's result stream on the realtime gateway
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use runway_common::messages::GatewayMessage;
use runway_common::reconnect::ReconnectPolicy;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// What to do when the heartbeat interval elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    SendHeartbeat,
    /// The previous heartbeat was never answered
    Reconnect,
}

/// Tracks one outstanding heartbeat per interval
#[derive(Debug, Default)]
pub struct HeartbeatMonitor {
    awaiting_reply: bool,
}

impl HeartbeatMonitor {
    pub fn on_tick(&mut self) -> Tick {
        if self.awaiting_reply {
            return Tick::Reconnect;
        }
        self.awaiting_reply = true;
        Tick::SendHeartbeat
    }

    pub fn on_reply(&mut self) {
        self.awaiting_reply = false;
    }
}

pub fn user_url(base: &str, token: &str) -> Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("Invalid gateway URL {}", base))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

enum SessionEnd {
    Stale,
    Closed(String),
}

/// Connect, print results, and reconnect per `policy` until it gives up
pub async fn watch(gateway: &str, token: &str, interval: Duration, policy: ReconnectPolicy) -> Result<()> {
    let url = user_url(gateway, token)?;
    let mut attempt = 0u32;

    loop {
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                attempt = 0;
                match session(socket, interval).await {
                    SessionEnd::Stale => println!("⚠️  Heartbeat missed, reconnecting"),
                    SessionEnd::Closed(reason) => println!("⚠️  Connection closed: {}", reason),
                }
            }
            Err(e) => println!("❌ Failed to connect: {}", e),
        }

        attempt += 1;
        let Some(delay) = policy.next_delay(attempt) else {
            anyhow::bail!("Gave up after {} reconnect attempts", attempt - 1);
        };
        tokio::time::sleep(delay).await;
    }
}

async fn session<S>(socket: S, interval: Duration) -> SessionEnd
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut source) = socket.split();
    let mut monitor = HeartbeatMonitor::default();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    let heartbeat = GatewayMessage::Heartbeat.to_json();

    loop {
        tokio::select! {
            _ = ticker.tick() => match monitor.on_tick() {
                Tick::SendHeartbeat => {
                    if let Err(e) = sink.send(Message::Text(heartbeat.clone())).await {
                        return SessionEnd::Closed(e.to_string());
                    }
                }
                Tick::Reconnect => return SessionEnd::Stale,
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => match GatewayMessage::parse(&text) {
                    Ok(GatewayMessage::Heartbeat) => monitor.on_reply(),
                    Ok(GatewayMessage::Connected { payload, .. }) => {
                        println!("🔌 Connected as {}", payload.unwrap_or_default());
                    }
                    Ok(GatewayMessage::UpdateUser { payload }) => match payload.as_str() {
                        Some(text) => println!("{}", text),
                        None => println!("{}", payload),
                    },
                    Err(_) => println!("? {}", text),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "no reason".to_string());
                    return SessionEnd::Closed(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Closed(e.to_string()),
                None => return SessionEnd::Closed("stream ended".to_string()),
            }
        }
    }
}
