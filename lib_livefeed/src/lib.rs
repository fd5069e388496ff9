//! # Live Feed Client
//!
//! The resilient real-time subscription client behind the monitoring
//! dashboard. It keeps one logical connection alive over an unreliable
//! websocket, carries a durable table of topic subscriptions across any
//! number of reconnects, and feeds typed event envelopes to view consumers
//! that reconcile them into filtered, deduplicated collections.
//!
//! ## Core Components:
//!
//! - **`transport`**: the adapter over the message-framed websocket link,
//!   including the production `tokio-tungstenite` implementation and its
//!   pump task.
//!
//! - **`backoff`**: the reconnection policy; exponential delays with a
//!   ceiling and a bounded attempt budget.
//!
//! - **`connection`**: the connection manager. One driver task owns the
//!   `Disconnected/Connecting/Connected` machine, the subscription registry
//!   and the policy, and rebuilds every wire subscription after each
//!   successful connect.
//!
//! - **`registry`** / **`dispatch`**: the durable/active subscription table
//!   and the per-frame routing that turns inbound frames into envelopes on
//!   the right consumer channel.
//!
//! - **`reconcile`**: the idempotent keyed merge primitive every view uses
//!   to apply create/update/delete events against a filtered collection.
//!
//! - **`boards`**: the session list, employee roster and session detail
//!   consumers built on top of it.
//!
//! The REST surface that seeds each view stays outside this crate; the
//! dashboard binary owns it.

pub mod backoff;
pub mod boards;
pub mod connection;
mod dispatch;
pub mod error;
pub mod model;
pub mod reconcile;
mod registry;
pub mod transport;
pub mod wire;

// --- Public API Re-exports ---
pub use backoff::ReconnectPolicy;
pub use connection::{ConnectionState, FeedService, Subscription};
pub use error::FeedError;
pub use transport::{Transport, TransportEvent, TransportLink, WsTransport};
pub use wire::{ClientFrame, EventEnvelope, EventType, ServerFrame};
