//! Connection manager: one driver task owns the connection state machine,
//! both subscription maps and the reconnection policy.
//!
//! Every mutation flows through the driver's command channel, so command
//! handling can never interleave with resubscription or dispatch. The
//! durable map is carried across any number of reconnects; the active map
//! is rebuilt from it after every successful connect and the invariant
//! "active topics are a subset of durable topics" holds by construction.

use tokio::sync::{mpsc, oneshot, watch};

use crate::backoff::ReconnectPolicy;
use crate::dispatch;
use crate::error::FeedError;
use crate::registry::SubscriptionRegistry;
use crate::transport::{Transport, TransportEvent, TransportLink};
use crate::wire::{ClientFrame, EventEnvelope};

/// Lifecycle of the single logical feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

enum Command {
    Connect {
        ack: oneshot::Sender<Result<(), FeedError>>,
    },
    Subscribe {
        topic: String,
        ack: oneshot::Sender<mpsc::UnboundedReceiver<EventEnvelope>>,
    },
    Unsubscribe {
        topic: String,
        ack: oneshot::Sender<()>,
    },
    Disconnect {
        ack: oneshot::Sender<()>,
    },
    Topics {
        ack: oneshot::Sender<Vec<String>>,
    },
}

/// A consumer's end of one topic. The stream ends when the topic is
/// unsubscribed, superseded by a later subscribe, or the service shuts down.
pub struct Subscription {
    topic: String,
    events: mpsc::UnboundedReceiver<EventEnvelope>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receives the next envelope published on this topic.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        self.events.recv().await
    }

    /// Non-blocking variant of [`Subscription::next`]; `None` when no
    /// envelope is queued right now.
    pub fn try_next(&mut self) -> Option<EventEnvelope> {
        self.events.try_recv().ok()
    }
}

/// Handle to the feed service. Cheap to clone; every view talks to the same
/// driver task. The driver stops once all handles are dropped.
#[derive(Clone)]
pub struct FeedService {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl FeedService {
    /// Constructs the service and spawns its driver task. Must run inside a
    /// tokio runtime. The service starts disconnected; call
    /// [`FeedService::connect`] to bring the feed up.
    pub fn new<T: Transport>(transport: T, policy: ReconnectPolicy) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let driver = Driver {
            transport,
            policy,
            registry: SubscriptionRegistry::new(),
            cmd_rx,
            state_tx,
            pending_connects: Vec::new(),
        };
        tokio::spawn(driver.run());
        Self { cmd_tx, state_rx }
    }

    /// Brings the connection up. Idempotent: resolves immediately when
    /// already connected. Resolves once the connection is established, or
    /// with [`FeedError::ExhaustedRetries`] when the attempt budget runs out.
    pub async fn connect(&self) -> Result<(), FeedError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Connect { ack: tx })
            .map_err(|_| FeedError::Closed)?;
        rx.await.map_err(|_| FeedError::Closed)?
    }

    /// Declares interest in a topic and returns its event stream. The intent
    /// survives reconnects until [`FeedService::unsubscribe`] or
    /// [`FeedService::disconnect`]. Subscribing to a topic that already has a
    /// consumer supersedes the earlier subscription.
    pub async fn subscribe(&self, topic: impl Into<String>) -> Result<Subscription, FeedError> {
        let topic = topic.into();
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Subscribe {
                topic: topic.clone(),
                ack: tx,
            })
            .map_err(|_| FeedError::Closed)?;
        let events = rx.await.map_err(|_| FeedError::Closed)?;
        Ok(Subscription { topic, events })
    }

    /// Withdraws interest in a topic. Idempotent for unknown topics.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), FeedError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Unsubscribe {
                topic: topic.to_string(),
                ack: tx,
            })
            .map_err(|_| FeedError::Closed)?;
        rx.await.map_err(|_| FeedError::Closed)
    }

    /// Tears the feed down: drops every durable subscription, releases the
    /// wire connection and leaves the service disconnected. The only
    /// operation that clears durable subscriptions.
    pub async fn disconnect(&self) -> Result<(), FeedError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Disconnect { ack: tx })
            .map_err(|_| FeedError::Closed)?;
        rx.await.map_err(|_| FeedError::Closed)
    }

    /// The durable topics currently registered, sorted.
    pub async fn topics(&self) -> Result<Vec<String>, FeedError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Topics { ack: tx })
            .map_err(|_| FeedError::Closed)?;
        rx.await.map_err(|_| FeedError::Closed)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// A watch on connection state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

/// Marker for "every service handle is gone"; the driver exits.
struct Shutdown;

/// How one served connection ended.
enum Served {
    /// The transport failed or dropped; the reconnection policy decides next.
    Lost,
    /// Client-initiated disconnect; no retry.
    Stopped,
}

struct Driver<T: Transport> {
    transport: T,
    policy: ReconnectPolicy,
    registry: SubscriptionRegistry,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    pending_connects: Vec<oneshot::Sender<Result<(), FeedError>>>,
}

impl<T: Transport> Driver<T> {
    async fn run(mut self) {
        loop {
            if self.offline().await.is_err() {
                break;
            }
            if self.online().await.is_err() {
                break;
            }
        }
        log::debug!("feed driver stopped");
    }

    /// Disconnected: durable bookkeeping only. Returns `Ok` once a connect
    /// request arrives.
    async fn offline(&mut self) -> Result<(), Shutdown> {
        self.set_state(ConnectionState::Disconnected);
        loop {
            let Some(cmd) = self.cmd_rx.recv().await else {
                return Err(Shutdown);
            };
            match cmd {
                Command::Connect { ack } => {
                    self.pending_connects.push(ack);
                    return Ok(());
                }
                Command::Subscribe { topic, ack } => {
                    let events = self.registry.record(&topic);
                    log::info!("not connected yet, subscription to {topic} will be made upon connection");
                    let _ = ack.send(events);
                }
                Command::Unsubscribe { topic, ack } => {
                    self.registry.remove(&topic);
                    let _ = ack.send(());
                }
                Command::Disconnect { ack } => {
                    self.registry.clear();
                    let _ = ack.send(());
                }
                Command::Topics { ack } => {
                    let _ = ack.send(self.registry.topics());
                }
            }
        }
    }

    /// Drives connect attempts with backoff and serves each established
    /// connection. Returns `Ok` on graceful disconnect or retry exhaustion.
    async fn online(&mut self) -> Result<(), Shutdown> {
        self.policy.reset();
        loop {
            self.set_state(ConnectionState::Connecting);
            let attempt = self.transport.connect().await;
            match attempt {
                Ok(link) => {
                    self.policy.reset();
                    match self.serve(link).await? {
                        Served::Lost => {}
                        Served::Stopped => return Ok(()),
                    }
                }
                Err(e) => log::error!("feed connect attempt failed: {e}"),
            }

            self.set_state(ConnectionState::Disconnected);
            self.registry.clear_active();

            match self.policy.next_delay() {
                Some(delay) => {
                    log::warn!(
                        "reconnecting in {}ms (attempt {}/{})",
                        delay.as_millis(),
                        self.policy.attempts(),
                        self.policy.max_attempts()
                    );
                    if !self.backoff_sleep(delay).await? {
                        return Ok(());
                    }
                }
                None => {
                    log::error!(
                        "giving up on the feed after {} failed attempts; an explicit connect starts over",
                        self.policy.max_attempts()
                    );
                    let err = FeedError::ExhaustedRetries {
                        attempts: self.policy.max_attempts(),
                    };
                    self.fail_pending(err);
                    return Ok(());
                }
            }
        }
    }

    /// Waits out one backoff delay while still serving durable bookkeeping.
    /// Returns `Ok(false)` when a disconnect cancelled the retry sequence.
    async fn backoff_sleep(&mut self, delay: std::time::Duration) -> Result<bool, Shutdown> {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return Ok(true),
                cmd = self.cmd_rx.recv() => match cmd {
                    None => return Err(Shutdown),
                    Some(Command::Connect { ack }) => self.pending_connects.push(ack),
                    Some(Command::Subscribe { topic, ack }) => {
                        let events = self.registry.record(&topic);
                        let _ = ack.send(events);
                    }
                    Some(Command::Unsubscribe { topic, ack }) => {
                        self.registry.remove(&topic);
                        let _ = ack.send(());
                    }
                    Some(Command::Disconnect { ack }) => {
                        self.registry.clear();
                        self.fail_pending(FeedError::Closed);
                        let _ = ack.send(());
                        return Ok(false);
                    }
                    Some(Command::Topics { ack }) => {
                        let _ = ack.send(self.registry.topics());
                    }
                }
            }
        }
    }

    /// Serves one established connection until it is lost or torn down.
    async fn serve(&mut self, mut link: TransportLink) -> Result<Served, Shutdown> {
        self.set_state(ConnectionState::Connected);
        self.resubscribe_all(&link);
        for ack in self.pending_connects.drain(..) {
            let _ = ack.send(Ok(()));
        }

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    None => {
                        drop(link);
                        return Err(Shutdown);
                    }
                    Some(Command::Connect { ack }) => {
                        // Already connected.
                        let _ = ack.send(Ok(()));
                    }
                    Some(Command::Subscribe { topic, ack }) => {
                        let events = self.registry.record(&topic);
                        // Release a duplicate's wire subscription before
                        // opening the new one, so the topic never has two
                        // competing deliveries.
                        if let Some(stale) = self.registry.release_active(&topic) {
                            send_frame(&link, ClientFrame::Unsubscribe { id: stale });
                        }
                        let id = self.registry.open_active(&topic);
                        log::info!("subscribed to {topic}");
                        send_frame(&link, ClientFrame::Subscribe { id, topic });
                        let _ = ack.send(events);
                    }
                    Some(Command::Unsubscribe { topic, ack }) => {
                        if let Some(id) = self.registry.remove(&topic) {
                            send_frame(&link, ClientFrame::Unsubscribe { id });
                        }
                        let _ = ack.send(());
                    }
                    Some(Command::Disconnect { ack }) => {
                        self.registry.clear();
                        drop(link);
                        self.set_state(ConnectionState::Disconnected);
                        log::info!("feed disconnected");
                        let _ = ack.send(());
                        return Ok(Served::Stopped);
                    }
                    Some(Command::Topics { ack }) => {
                        let _ = ack.send(self.registry.topics());
                    }
                },
                event = link.inbound.recv() => match event {
                    Some(TransportEvent::Frame(frame)) => {
                        if let Some(stale) = dispatch::dispatch(&mut self.registry, frame) {
                            send_frame(&link, ClientFrame::Unsubscribe { id: stale });
                        }
                    }
                    Some(TransportEvent::Closed { reason }) => {
                        log::error!("feed connection lost: {reason}");
                        return Ok(Served::Lost);
                    }
                    None => {
                        log::error!("feed transport ended without a close signal");
                        return Ok(Served::Lost);
                    }
                }
            }
        }
    }

    /// Rebuilds every wire subscription from the durable map. Runs on every
    /// successful connect, before any pending connect caller is resolved.
    fn resubscribe_all(&mut self, link: &TransportLink) {
        if self.registry.is_empty() {
            return;
        }
        let targets = self.registry.rebuild_active();
        log::info!("resubscribing to {} topic(s)", targets.len());
        for (topic, id) in targets {
            send_frame(link, ClientFrame::Subscribe { id, topic });
        }
    }

    fn fail_pending(&mut self, err: FeedError) {
        for ack in self.pending_connects.drain(..) {
            let _ = ack.send(Err(err.clone()));
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            log::debug!("connection state {previous:?} -> {state:?}");
        }
    }
}

/// Hands a frame to the pump. Loss of the pump is reported through the
/// inbound side, so a failed hand-off only means that report is in flight.
fn send_frame(link: &TransportLink, frame: ClientFrame) {
    if link.outbound.send(frame).is_err() {
        log::warn!("feed link is closing; dropped an outbound frame");
    }
}
