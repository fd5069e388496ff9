//! The single-session view: the session itself plus its activity log and
//! screenshot collections, each append-ordered and deduplicated by id.

use uuid::Uuid;

use crate::model::{ActivityLog, Screenshot, Session};
use crate::reconcile::{Applied, Change, InsertPosition, LiveList};
use crate::wire::{EventEnvelope, EventType};

pub struct SessionDetail {
    session_id: Uuid,
    session: Option<Session>,
    activity: LiveList<ActivityLog>,
    screenshots: LiveList<Screenshot>,
}

impl SessionDetail {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            session: None,
            activity: LiveList::new(InsertPosition::Tail),
            screenshots: LiveList::new(InsertPosition::Tail),
        }
    }

    pub fn seed(
        &mut self,
        session: Session,
        activity: Vec<ActivityLog>,
        screenshots: Vec<Screenshot>,
    ) {
        self.session = Some(session);
        self.activity.reset(activity);
        self.screenshots.reset(screenshots);
    }

    /// Session lifecycle events arrive on the shared sessions topic; only
    /// those for the watched session replace the held entity.
    pub fn apply_session(&mut self, envelope: &EventEnvelope) -> Applied {
        match envelope.event_type {
            EventType::SessionCreated | EventType::SessionUpdated | EventType::SessionStopped => {
                match envelope.decode::<Session>() {
                    Ok(session) if session.session_id == self.session_id => {
                        self.session = Some(session);
                        Applied::Replaced
                    }
                    Ok(_) => Applied::Ignored,
                    Err(e) => {
                        log::warn!("{e}");
                        Applied::Ignored
                    }
                }
            }
            other => {
                log::debug!("ignoring {other:?} on the session detail");
                Applied::Ignored
            }
        }
    }

    pub fn apply_activity(&mut self, envelope: &EventEnvelope) -> Applied {
        if envelope.event_type != EventType::ActivityLogged {
            log::debug!("ignoring {:?} on the activity feed", envelope.event_type);
            return Applied::Ignored;
        }
        match envelope.decode::<ActivityLog>() {
            Ok(entry) => self.activity.apply(Change::Created(entry)),
            Err(e) => {
                log::warn!("{e}");
                Applied::Ignored
            }
        }
    }

    pub fn apply_screenshot(&mut self, envelope: &EventEnvelope) -> Applied {
        if envelope.event_type != EventType::ScreenshotUploaded {
            log::debug!("ignoring {:?} on the screenshot feed", envelope.event_type);
            return Applied::Ignored;
        }
        match envelope.decode::<Screenshot>() {
            Ok(screenshot) => self.screenshots.apply(Change::Created(screenshot)),
            Err(e) => {
                log::warn!("{e}");
                Applied::Ignored
            }
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn activity(&self) -> &[ActivityLog] {
        self.activity.items()
    }

    pub fn screenshots(&self) -> &[Screenshot] {
        self.screenshots.items()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_type: &str, payload: serde_json::Value) -> EventEnvelope {
        serde_json::from_value(json!({"eventType": event_type, "payload": payload})).unwrap()
    }

    #[test]
    fn session_events_for_other_sessions_are_ignored() {
        let watched = Uuid::new_v4();
        let mut detail = SessionDetail::new(watched);
        let applied = detail.apply_session(&envelope(
            "SESSION_UPDATED",
            json!({
                "sessionId": Uuid::new_v4(),
                "userId": "u1",
                "startTime": "2025-11-03T09:00:00",
                "status": "ACTIVE"
            }),
        ));
        assert_eq!(applied, Applied::Ignored);
        assert!(detail.session().is_none());
    }

    #[test]
    fn stop_events_replace_the_watched_session() {
        let watched = Uuid::new_v4();
        let mut detail = SessionDetail::new(watched);
        let applied = detail.apply_session(&envelope(
            "SESSION_STOPPED",
            json!({
                "sessionId": watched,
                "userId": "u1",
                "startTime": "2025-11-03T09:00:00",
                "endTime": "2025-11-03T10:00:00",
                "status": "STOPPED"
            }),
        ));
        assert_eq!(applied, Applied::Replaced);
        assert!(detail.session().unwrap().end_time.is_some());
    }

    #[test]
    fn duplicate_activity_entries_are_dropped() {
        let watched = Uuid::new_v4();
        let mut detail = SessionDetail::new(watched);
        let entry = json!({
            "id": 10,
            "sessionId": watched,
            "loggedAt": "2025-11-03T09:05:00",
            "activityStatus": "ACTIVE"
        });
        assert_eq!(
            detail.apply_activity(&envelope("ACTIVITY_LOGGED", entry.clone())),
            Applied::Inserted
        );
        assert_eq!(
            detail.apply_activity(&envelope("ACTIVITY_LOGGED", entry)),
            Applied::Ignored
        );
        assert_eq!(detail.activity().len(), 1);
    }

    #[test]
    fn screenshots_append_in_arrival_order() {
        let watched = Uuid::new_v4();
        let mut detail = SessionDetail::new(watched);
        for id in [4, 9] {
            detail.apply_screenshot(&envelope(
                "SCREENSHOT_UPLOADED",
                json!({
                    "id": id,
                    "sessionId": watched,
                    "capturedAt": "2025-11-03T09:10:00"
                }),
            ));
        }
        let ids: Vec<i64> = detail.screenshots().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![4, 9]);
    }
}
