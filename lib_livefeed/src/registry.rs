//! The two-level subscription table.
//!
//! The durable map records which topics have a consumer and where their
//! events go; it survives any number of reconnects and is cleared only by an
//! explicit disconnect. The active map tracks the wire subscription handle
//! per topic for the current connection; it is invalidated wholesale on every
//! connection loss and rebuilt from the durable map on the next connect.
//! Active keys are always a subset of durable keys.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::wire::EventEnvelope;

pub(crate) struct SubscriptionRegistry {
    durable: HashMap<String, mpsc::UnboundedSender<EventEnvelope>>,
    active: HashMap<String, u64>,
    next_handle: u64,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            durable: HashMap::new(),
            active: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Records the durable entry for `topic`, superseding any prior one, and
    /// returns the consumer's receiving half. Superseding drops the previous
    /// sender, which ends the previous consumer's stream.
    pub(crate) fn record(&mut self, topic: &str) -> mpsc::UnboundedReceiver<EventEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.durable.insert(topic.to_string(), tx).is_some() {
            log::debug!("subscription to {topic} supersedes an earlier one");
        }
        rx
    }

    /// Removes the durable entry and returns the active handle to release,
    /// if one was open. A no-op for unknown topics.
    pub(crate) fn remove(&mut self, topic: &str) -> Option<u64> {
        self.durable.remove(topic);
        self.active.remove(topic)
    }

    /// Takes the active handle for `topic` out of the table without touching
    /// the durable entry.
    pub(crate) fn release_active(&mut self, topic: &str) -> Option<u64> {
        self.active.remove(topic)
    }

    /// Allocates a wire handle for `topic` and marks it active. Only durable
    /// topics can be activated.
    pub(crate) fn open_active(&mut self, topic: &str) -> u64 {
        debug_assert!(self.durable.contains_key(topic));
        let handle = self.next_handle;
        self.next_handle += 1;
        self.active.insert(topic.to_string(), handle);
        handle
    }

    /// Drops every active handle (the connection that backed them is gone)
    /// and assigns a fresh handle to every durable topic, returning the
    /// `(topic, handle)` pairs to subscribe over the new connection. The
    /// iteration order across topics carries no meaning.
    pub(crate) fn rebuild_active(&mut self) -> Vec<(String, u64)> {
        self.active.clear();
        let topics: Vec<String> = self.durable.keys().cloned().collect();
        topics
            .into_iter()
            .map(|topic| {
                let handle = self.open_active(&topic);
                (topic, handle)
            })
            .collect()
    }

    /// Invalidates all active handles without touching durable entries.
    pub(crate) fn clear_active(&mut self) {
        self.active.clear();
    }

    /// Full teardown: durable and active state both go.
    pub(crate) fn clear(&mut self) {
        self.durable.clear();
        self.active.clear();
    }

    pub(crate) fn active_handle(&self, topic: &str) -> Option<u64> {
        self.active.get(topic).copied()
    }

    pub(crate) fn sender(&self, topic: &str) -> Option<&mpsc::UnboundedSender<EventEnvelope>> {
        self.durable.get(topic)
    }

    pub(crate) fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.durable.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.durable.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn active_len(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_supersedes_and_closes_the_old_channel() {
        let mut registry = SubscriptionRegistry::new();
        let mut first = registry.record("/topic/sessions");
        let _second = registry.record("/topic/sessions");

        // The first receiver's sender was dropped by the supersede.
        assert!(first.try_recv().is_err());
        assert_eq!(registry.topics(), vec!["/topic/sessions".to_string()]);
    }

    #[test]
    fn rebuild_assigns_one_fresh_handle_per_durable_topic() {
        let mut registry = SubscriptionRegistry::new();
        let _a = registry.record("/topic/sessions");
        let _b = registry.record("/topic/employees");
        let stale = registry.open_active("/topic/sessions");

        let rebuilt = registry.rebuild_active();
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(registry.active_len(), 2);
        assert!(
            rebuilt.iter().all(|(_, handle)| *handle != stale),
            "stale handles must not be reused"
        );
    }

    #[test]
    fn remove_returns_the_open_handle_exactly_once() {
        let mut registry = SubscriptionRegistry::new();
        let _rx = registry.record("/topic/employees");
        let handle = registry.open_active("/topic/employees");

        assert_eq!(registry.remove("/topic/employees"), Some(handle));
        assert_eq!(registry.remove("/topic/employees"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_active_keeps_durable_entries() {
        let mut registry = SubscriptionRegistry::new();
        let _rx = registry.record("/topic/sessions");
        registry.open_active("/topic/sessions");

        registry.clear_active();
        assert_eq!(registry.active_handle("/topic/sessions"), None);
        assert!(registry.sender("/topic/sessions").is_some());
    }
}
