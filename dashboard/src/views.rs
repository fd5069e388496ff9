//! One task per live view: seed from REST, subscribe, reconcile incoming
//! events, and release the topics on the way out.
//!
//! A topic has at most one consumer, so the boards and the detail view are
//! never run at the same time; the composition root picks one mode, the way
//! the original dashboard shows one screen at a time.

use anyhow::Result;
use tokio::sync::broadcast;
use uuid::Uuid;

use lib_livefeed::FeedService;
use lib_livefeed::boards::{EmployeeRoster, SessionBoard, SessionDetail, SessionFilter};
use lib_livefeed::wire::{EMPLOYEES_TOPIC, SESSIONS_TOPIC, activity_topic, screenshots_topic};

use crate::api::ApiClient;

pub async fn session_board(
    feed: FeedService,
    api: ApiClient,
    filter: SessionFilter,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let seed = api.sessions(&filter).await?;
    let mut board = SessionBoard::new(filter);
    board.seed(seed);
    log::info!("session board seeded with {} session(s)", board.len());

    let mut sub = feed.subscribe(SESSIONS_TOPIC).await?;
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            envelope = sub.next() => match envelope {
                Some(envelope) => {
                    let applied = board.apply(&envelope);
                    log::info!(
                        "sessions: {:?} {:?}, {} session(s) shown",
                        envelope.event_type,
                        applied,
                        board.len()
                    );
                }
                None => {
                    log::warn!("session stream ended");
                    break;
                }
            }
        }
    }

    feed.unsubscribe(SESSIONS_TOPIC).await?;
    Ok(())
}

pub async fn employee_roster(
    feed: FeedService,
    api: ApiClient,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let seed = api.employees().await?;
    let mut roster = EmployeeRoster::new();
    roster.seed(seed);
    log::info!("employee roster seeded with {} employee(s)", roster.len());

    let mut sub = feed.subscribe(EMPLOYEES_TOPIC).await?;
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            envelope = sub.next() => match envelope {
                Some(envelope) => {
                    let applied = roster.apply(&envelope);
                    log::info!(
                        "employees: {:?} {:?}, {} listed",
                        envelope.event_type,
                        applied,
                        roster.len()
                    );
                }
                None => {
                    log::warn!("employee stream ended");
                    break;
                }
            }
        }
    }

    feed.unsubscribe(EMPLOYEES_TOPIC).await?;
    Ok(())
}

pub async fn session_detail(
    feed: FeedService,
    api: ApiClient,
    session_id: Uuid,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let session = api.session(&session_id).await?;
    let activity = api.activity_logs(&session_id).await?;
    let screenshots = api.screenshots(&session_id).await?;

    let mut detail = SessionDetail::new(session_id);
    log::info!(
        "watching session {session_id}: {} activity entries, {} screenshot(s)",
        activity.len(),
        screenshots.len()
    );
    detail.seed(session, activity, screenshots);

    let activity_dest = activity_topic(&session_id);
    let screenshots_dest = screenshots_topic(&session_id);
    let mut sessions_sub = feed.subscribe(SESSIONS_TOPIC).await?;
    let mut activity_sub = feed.subscribe(activity_dest.clone()).await?;
    let mut screenshots_sub = feed.subscribe(screenshots_dest.clone()).await?;

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            envelope = sessions_sub.next() => match envelope {
                Some(envelope) => {
                    if detail.apply_session(&envelope) != lib_livefeed::reconcile::Applied::Ignored {
                        let status = detail.session().map(|s| s.status);
                        log::info!("watched session updated, status {status:?}");
                    }
                }
                None => break,
            },
            envelope = activity_sub.next() => match envelope {
                Some(envelope) => {
                    detail.apply_activity(&envelope);
                    log::info!("activity feed: {} entr(ies)", detail.activity().len());
                }
                None => break,
            },
            envelope = screenshots_sub.next() => match envelope {
                Some(envelope) => {
                    detail.apply_screenshot(&envelope);
                    log::info!("screenshot feed: {} item(s)", detail.screenshots().len());
                }
                None => break,
            },
        }
    }

    feed.unsubscribe(&activity_dest).await?;
    feed.unsubscribe(&screenshots_dest).await?;
    feed.unsubscribe(SESSIONS_TOPIC).await?;
    Ok(())
}
