//! # Feed Client Integration Probe
//!
//! Stands up a local feed endpoint and drives the full client stack against
//! it: connect, subscribe, delivery, and automatic resubscription after the
//! server drops the first connection. Self-contained; no backend needed.

use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::Message;

use lib_livefeed::model::Session;
use lib_livefeed::wire::SESSIONS_TOPIC;
use lib_livefeed::{ClientFrame, EventType, FeedService, ReconnectPolicy, WsTransport};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    println!("feed endpoint listening on {addr}");

    // The first connection gets one event and is then dropped abruptly to
    // force a reconnect; the second stays up until the client closes it.
    let server = tokio::spawn(async move {
        let mut connection = 0u32;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            connection += 1;
            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(_) => continue,
            };
            let (mut write, mut read) = ws.split();

            let Some(Ok(message)) = read.next().await else {
                continue;
            };
            let Ok(frame) = serde_json::from_str::<ClientFrame>(message.to_text().unwrap_or(""))
            else {
                continue;
            };
            let ClientFrame::Subscribe { topic, .. } = frame else {
                continue;
            };

            let event = json!({
                "topic": topic,
                "body": {
                    "eventType": "SESSION_CREATED",
                    "payload": {
                        "sessionId": "8f14e45f-ceea-4b07-8f4c-0ce2f6b0a7c1",
                        "userId": format!("conn-{connection}"),
                        "startTime": "2025-11-03T09:00:00",
                        "status": "ACTIVE"
                    }
                }
            });
            let _ = write.send(Message::Text(event.to_string().into())).await;

            if connection == 1 {
                // Drop the socket without a close frame.
                continue;
            }

            while let Some(Ok(message)) = read.next().await {
                if matches!(message, Message::Close(_)) {
                    break;
                }
            }
            break;
        }
    });

    let transport = WsTransport::new(&format!("ws://{addr}"), "/ws", Duration::from_millis(4000))?;
    let policy = ReconnectPolicy::new(
        Duration::from_millis(200),
        Duration::from_millis(2000),
        10,
    );
    let feed = FeedService::new(transport, policy);

    feed.connect().await?;
    check("connect", true);

    let mut sub = feed.subscribe(SESSIONS_TOPIC).await?;
    let first = next_event(&mut sub).await?;
    check("first delivery", first.event_type == EventType::SessionCreated);
    let session: Session = first.decode()?;
    check("first connection payload", session.user_id == "conn-1");

    // The server killed the first connection after one event; the next
    // delivery proves reconnect and resubscribe happened on their own.
    let second = next_event(&mut sub).await?;
    check("delivery after reconnect", second.event_type == EventType::SessionCreated);
    let session: Session = second.decode()?;
    check("second connection payload", session.user_id == "conn-2");

    feed.disconnect().await?;
    server.await?;

    println!("{}", "all feed probes passed".green().bold());
    Ok(())
}

async fn next_event(sub: &mut lib_livefeed::Subscription) -> Result<lib_livefeed::EventEnvelope> {
    tokio::time::timeout(Duration::from_secs(10), sub.next())
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for an event"))?
        .ok_or_else(|| anyhow::anyhow!("subscription ended early"))
}

fn check(name: &str, ok: bool) {
    if ok {
        println!("{} {name}", "PASS".green());
    } else {
        println!("{} {name}", "FAIL".red());
        std::process::exit(1);
    }
}
