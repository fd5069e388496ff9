//! Domain entities mirrored from the dashboard backend's REST and feed
//! payloads. Field names follow the backend's camelCase JSON; timestamps are
//! zone-less the way the backend emits them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::reconcile::Keyed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Stopped,
}

/// One tracked work session, keyed by `sessionId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: Uuid,
    pub user_id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub job_role: Option<String>,
    pub start_time: NaiveDateTime,
    #[serde(default)]
    pub end_time: Option<NaiveDateTime>,
    pub status: SessionStatus,
}

impl Keyed for Session {
    type Key = Uuid;

    fn key(&self) -> Uuid {
        self.session_id
    }
}

/// One employee record, keyed by the numeric `id`. The login-rule fields are
/// plain data carried through from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: i64,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub job_role: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub login_rule_id: Option<i64>,
    #[serde(default)]
    pub login_rule_name: Option<String>,
}

impl Keyed for Employee {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    Active,
    Idle,
}

/// One activity log entry within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: i64,
    pub session_id: Uuid,
    pub logged_at: NaiveDateTime,
    pub activity_status: ActivityStatus,
    #[serde(default)]
    pub metadata: Option<String>,
}

impl Keyed for ActivityLog {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

/// Screenshot metadata within a session. The image bytes themselves are
/// fetched separately over REST and never travel through the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    pub id: i64,
    pub session_id: Uuid,
    pub captured_at: NaiveDateTime,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub metadata: Option<String>,
}

impl Keyed for Screenshot {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}
