//! Transport adapter: a message-framed, bidirectional link to the feed
//! endpoint.
//!
//! The connection driver never touches sockets. [`Transport::connect`] hands
//! it a [`TransportLink`], a pair of channels bridged to the wire by a pump
//! task that owns the actual stream. The link signals loss of the connection
//! by emitting [`TransportEvent::Closed`] and then closing the inbound
//! channel; whether to reconnect is the driver's decision, not the
//! transport's.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::error::FeedError;
use crate::wire::{ClientFrame, ServerFrame};

/// Inbound capacity before the pump stops reading from the socket. Applies
/// back-pressure to the wire instead of buffering without bound.
const INBOUND_CHANNEL_CAPACITY: usize = 1024;

/// Signals delivered to the connection driver.
#[derive(Debug)]
pub enum TransportEvent {
    /// One routed server frame.
    Frame(ServerFrame),
    /// The connection is gone. No further frames will arrive on this link.
    Closed { reason: String },
}

/// One established connection: frames out, events in. Dropping the outbound
/// sender closes the wire connection.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<ClientFrame>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// A connectable feed transport. Implementations run their own I/O; each
/// successful call yields a fresh, independent link.
pub trait Transport: Send + Sync + 'static {
    fn connect(&self) -> impl Future<Output = Result<TransportLink, FeedError>> + Send;
}

/// Maps the dashboard base URL onto the feed endpoint: `http`/`https` become
/// `ws`/`wss`, the path is replaced, query and fragment are stripped.
pub fn feed_url(base_url: &str, path: &str) -> Result<Url, FeedError> {
    let mut url = Url::parse(base_url.trim()).map_err(|e| FeedError::Endpoint {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(FeedError::Endpoint {
                url: base_url.to_string(),
                reason: format!("unsupported scheme '{other}'"),
            });
        }
    };
    url.set_scheme(scheme).map_err(|_| FeedError::Endpoint {
        url: base_url.to_string(),
        reason: "scheme rejected".to_string(),
    })?;
    url.set_path(path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Production transport over a websocket.
pub struct WsTransport {
    url: Url,
    heartbeat: Duration,
}

impl WsTransport {
    /// `base_url` accepts the REST base (`http://...`) or a direct feed URL
    /// (`ws://...`); `path` is the feed endpoint path, normally `/ws`.
    /// A zero `heartbeat` disables keepalive pings.
    pub fn new(base_url: &str, path: &str, heartbeat: Duration) -> Result<Self, FeedError> {
        Ok(Self {
            url: feed_url(base_url, path)?,
            heartbeat,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for WsTransport {
    fn connect(&self) -> impl Future<Output = Result<TransportLink, FeedError>> + Send {
        let url = self.url.clone();
        let heartbeat = self.heartbeat;
        async move {
            log::info!("connecting to feed at {url}");
            let (stream, _response) = connect_async(url.as_str())
                .await
                .map_err(|e| FeedError::Transport(e.to_string()))?;
            log::info!("feed connection established");

            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
            tokio::spawn(pump(stream, outbound_rx, inbound_tx, heartbeat));

            Ok(TransportLink {
                outbound: outbound_tx,
                inbound: inbound_rx,
            })
        }
    }
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Owns the websocket for the lifetime of one connection: serializes outbound
/// frames, parses inbound text into [`ServerFrame`]s, answers pings and sends
/// keepalive pings after `heartbeat` of outbound silence.
async fn pump(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outbound: mpsc::UnboundedReceiver<ClientFrame>,
    inbound: mpsc::Sender<TransportEvent>,
    heartbeat: Duration,
) {
    let (mut write, mut read): (WsSink, WsSource) = stream.split();

    let keepalive = !heartbeat.is_zero();
    let period = if keepalive { heartbeat } else { Duration::from_secs(86_400) };
    let mut ping = interval_at(Instant::now() + period, period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            log::error!("failed to serialize client frame: {e}");
                            continue;
                        }
                    };
                    log::debug!("sending frame: {text}");
                    if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                        lost(&inbound, format!("send failed: {e}")).await;
                        return;
                    }
                    ping.reset();
                }
                None => {
                    // The driver dropped the link; close cleanly.
                    let _ = write.close().await;
                    return;
                }
            },
            _ = ping.tick(), if keepalive => {
                if let Err(e) = write.send(WsMessage::Ping(Bytes::new())).await {
                    lost(&inbound, format!("keepalive ping failed: {e}")).await;
                    return;
                }
            }
            message = read.next() => match message {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(frame) => {
                            if inbound.send(TransportEvent::Frame(frame)).await.is_err() {
                                // Driver is gone; nothing left to deliver to.
                                let _ = write.close().await;
                                return;
                            }
                        }
                        Err(e) => log::warn!("dropping unroutable frame: {e}"),
                    }
                }
                Some(Ok(WsMessage::Ping(payload))) => {
                    let _ = write.send(WsMessage::Pong(payload)).await;
                }
                Some(Ok(WsMessage::Close(_))) => {
                    lost(&inbound, "server closed the connection".to_string()).await;
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    lost(&inbound, e.to_string()).await;
                    return;
                }
                None => {
                    lost(&inbound, "stream ended".to_string()).await;
                    return;
                }
            }
        }
    }
}

async fn lost(inbound: &mpsc::Sender<TransportEvent>, reason: String) {
    log::warn!("feed connection lost: {reason}");
    let _ = inbound.send(TransportEvent::Closed { reason }).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_url_maps_http_schemes() {
        assert_eq!(
            feed_url("http://localhost:8080", "/ws").unwrap().as_str(),
            "ws://localhost:8080/ws"
        );
        assert_eq!(
            feed_url("https://monitor.example.com", "/ws").unwrap().as_str(),
            "wss://monitor.example.com/ws"
        );
    }

    #[test]
    fn feed_url_keeps_ws_schemes() {
        assert_eq!(
            feed_url("ws://127.0.0.1:9002", "/ws").unwrap().as_str(),
            "ws://127.0.0.1:9002/ws"
        );
    }

    #[test]
    fn feed_url_strips_query_and_fragment() {
        assert_eq!(
            feed_url("http://localhost:8080/app?x=1#top", "/ws").unwrap().as_str(),
            "ws://localhost:8080/ws"
        );
    }

    #[test]
    fn feed_url_rejects_other_schemes() {
        assert!(feed_url("ftp://example.com", "/ws").is_err());
        assert!(feed_url("not a url", "/ws").is_err());
    }
}
