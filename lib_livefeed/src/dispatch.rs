//! Routes one inbound frame to the consumer registered for its topic.

use crate::registry::SubscriptionRegistry;
use crate::wire::{EventEnvelope, ServerFrame};

/// Parses the frame body and delivers the envelope to the topic's channel.
///
/// Frames for topics without a live subscription are dropped. A malformed
/// body is logged and dropped; it never aborts the dispatch loop and is never
/// retried. When delivery finds the consumer's receiver gone without an
/// explicit unsubscribe, the entry is pruned and the stale wire handle is
/// returned so the caller can release it.
pub(crate) fn dispatch(registry: &mut SubscriptionRegistry, frame: ServerFrame) -> Option<u64> {
    if registry.active_handle(&frame.topic).is_none() {
        log::debug!("dropping frame for inactive topic {}", frame.topic);
        return None;
    }

    let envelope: EventEnvelope = match serde_json::from_value(frame.body) {
        Ok(envelope) => envelope,
        Err(e) => {
            log::warn!("dropping malformed event on {}: {e}", frame.topic);
            return None;
        }
    };

    let Some(sender) = registry.sender(&frame.topic) else {
        // Active implies durable; an open handle without a sender would be a
        // bookkeeping bug.
        log::error!("active subscription for {} has no consumer", frame.topic);
        return registry.release_active(&frame.topic);
    };

    if sender.send(envelope).is_err() {
        log::info!("consumer for {} is gone, pruning subscription", frame.topic);
        return registry.remove(&frame.topic);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(topic: &str, body: serde_json::Value) -> ServerFrame {
        ServerFrame {
            topic: topic.to_string(),
            body,
        }
    }

    #[test]
    fn routes_to_the_registered_consumer() {
        let mut registry = SubscriptionRegistry::new();
        let mut rx = registry.record("/topic/employees");
        registry.open_active("/topic/employees");

        let released = dispatch(
            &mut registry,
            frame(
                "/topic/employees",
                json!({"eventType": "EMPLOYEE_DELETED", "payload": 5}),
            ),
        );
        assert_eq!(released, None);

        let envelope = rx.try_recv().expect("envelope should be delivered");
        assert_eq!(envelope.decode::<i64>().unwrap(), 5);
    }

    #[test]
    fn malformed_bodies_are_dropped_and_later_frames_still_deliver() {
        let mut registry = SubscriptionRegistry::new();
        let mut rx = registry.record("/topic/employees");
        registry.open_active("/topic/employees");

        dispatch(&mut registry, frame("/topic/employees", json!("garbage")));
        dispatch(
            &mut registry,
            frame(
                "/topic/employees",
                json!({"eventType": "NOT_A_REAL_EVENT", "payload": {}}),
            ),
        );
        assert!(rx.try_recv().is_err(), "nothing was delivered");

        dispatch(
            &mut registry,
            frame(
                "/topic/employees",
                json!({"eventType": "EMPLOYEE_DELETED", "payload": 9}),
            ),
        );
        assert!(rx.try_recv().is_ok(), "valid frames still flow");
    }

    #[test]
    fn frames_for_inactive_topics_are_dropped() {
        let mut registry = SubscriptionRegistry::new();
        let mut rx = registry.record("/topic/sessions");
        // Durable but not active: nothing may be delivered.

        dispatch(
            &mut registry,
            frame(
                "/topic/sessions",
                json!({"eventType": "SESSION_CREATED", "payload": {}}),
            ),
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dead_consumers_are_pruned_and_their_handle_released() {
        let mut registry = SubscriptionRegistry::new();
        let rx = registry.record("/topic/sessions");
        let handle = registry.open_active("/topic/sessions");
        drop(rx);

        let released = dispatch(
            &mut registry,
            frame(
                "/topic/sessions",
                json!({"eventType": "SESSION_CREATED", "payload": {}}),
            ),
        );
        assert_eq!(released, Some(handle));
        assert!(registry.is_empty());
    }
}
