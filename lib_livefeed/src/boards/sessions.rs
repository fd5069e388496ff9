//! The work-session list: filtered by user and status, newest first.

use crate::model::{Session, SessionStatus};
use crate::reconcile::{Applied, Change, InsertPosition, LiveList};
use crate::wire::{EventEnvelope, EventType};

/// The locally selected session filter. Both fields optional; an empty
/// filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionFilter {
    pub user_id: Option<String>,
    pub status: Option<SessionStatus>,
}

impl SessionFilter {
    pub fn matches(&self, session: &Session) -> bool {
        if let Some(user_id) = &self.user_id {
            if session.user_id != *user_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if session.status != status {
                return false;
            }
        }
        true
    }
}

/// Reconciled list of work sessions for the dashboard's main view.
pub struct SessionBoard {
    list: LiveList<Session>,
}

impl SessionBoard {
    pub fn new(filter: SessionFilter) -> Self {
        Self {
            list: LiveList::with_filter(InsertPosition::Head, move |session: &Session| {
                filter.matches(session)
            }),
        }
    }

    /// Seeds the board from a REST snapshot, newest start time first.
    pub fn seed(&mut self, mut sessions: Vec<Session>) {
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        self.list.reset(sessions);
    }

    /// Replaces the filter. The caller must follow up with [`Self::seed`]
    /// from a fresh fetch; sessions discarded under the old filter are not
    /// retained locally.
    pub fn set_filter(&mut self, filter: SessionFilter) {
        self.list
            .set_filter(move |session: &Session| filter.matches(session));
    }

    /// Merges one feed envelope. A session stopping is an update; the filter
    /// re-check removes it from status-filtered boards.
    pub fn apply(&mut self, envelope: &EventEnvelope) -> Applied {
        let change = match envelope.event_type {
            EventType::SessionCreated => envelope.decode::<Session>().map(Change::Created),
            EventType::SessionUpdated | EventType::SessionStopped => {
                envelope.decode::<Session>().map(Change::Updated)
            }
            other => {
                log::debug!("ignoring {other:?} on the session board");
                return Applied::Ignored;
            }
        };
        match change {
            Ok(change) => self.list.apply(change),
            Err(e) => {
                log::warn!("{e}");
                Applied::Ignored
            }
        }
    }

    pub fn sessions(&self) -> &[Session] {
        self.list.items()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}
