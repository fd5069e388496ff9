//! Wire contract for the `/ws` feed endpoint.
//!
//! Client frames carry subscription management; every server frame addresses
//! one topic and wraps an event envelope in its body. Topic strings are
//! opaque to the transport and only used for routing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FeedError;

/// Work-session lifecycle topic.
pub const SESSIONS_TOPIC: &str = "/topic/sessions";
/// Employee roster topic.
pub const EMPLOYEES_TOPIC: &str = "/topic/employees";

/// Per-session activity log topic.
pub fn activity_topic(session_id: &Uuid) -> String {
    format!("/topic/activity/{session_id}")
}

/// Per-session screenshot topic.
pub fn screenshots_topic(session_id: &Uuid) -> String {
    format!("/topic/screenshots/{session_id}")
}

/// Frames sent by the client. `id` is the wire subscription handle: it is
/// allocated per open subscription and identifies it in the unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Subscribe { id: u64, topic: String },
    #[serde(rename_all = "camelCase")]
    Unsubscribe { id: u64 },
}

/// One inbound message: the topic it was published on plus the raw event
/// body. The body stays unparsed until dispatch so a malformed event can be
/// dropped without touching the routing layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerFrame {
    pub topic: String,
    pub body: serde_json::Value,
}

/// The closed set of event types the backend publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    SessionCreated,
    SessionUpdated,
    SessionStopped,
    ActivityLogged,
    ScreenshotUploaded,
    EmployeeCreated,
    EmployeeUpdated,
    EmployeeDeleted,
}

/// The `{eventType, payload}` wrapper every event arrives in. The payload is
/// a full entity or a bare entity id depending on the event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_type: EventType,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Deserializes the payload into a domain type.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, FeedError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            FeedError::Protocol(format!("bad {:?} payload: {e}", self.event_type))
        })
    }
}
