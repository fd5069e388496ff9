//! Idempotent reconciliation of feed events into a local collection.
//!
//! Every view keeps an ordered, filtered list of entities that must stay
//! consistent under duplicated and late events. The merge rules live here
//! once instead of being rewritten per view:
//!
//! - a create for a key that is already present is ignored;
//! - an update replaces the entity in place and re-checks the filter,
//!   removing the entity when it no longer matches;
//! - an update or delete for an unknown key is ignored;
//! - entities that never matched the filter are dropped, not parked.
//!
//! Changing the filter therefore requires a fresh authoritative snapshot:
//! swap the predicate with [`LiveList::set_filter`] and re-seed the list via
//! [`LiveList::reset`] from the REST surface.

use std::fmt;

/// Entities that carry a stable identity usable for deduplication.
pub trait Keyed {
    type Key: Eq + Clone + fmt::Debug;

    fn key(&self) -> Self::Key;
}

/// One reconcilable change. Deletes carry only the key; the backend sends a
/// bare id for those events.
#[derive(Debug, Clone)]
pub enum Change<T: Keyed> {
    Created(T),
    Updated(T),
    Deleted(T::Key),
}

/// Where create-class events insert. Recency-ordered views prepend, plain
/// chronological views append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Head,
    Tail,
}

/// What applying a change did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Replaced,
    Removed,
    Ignored,
}

type Filter<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// An ordered collection of entities keyed by a stable id, with an optional
/// filter predicate. Holds exactly the entities matching the predicate, each
/// at most once, each reflecting the most recently applied event.
pub struct LiveList<T: Keyed> {
    items: Vec<T>,
    position: InsertPosition,
    filter: Option<Filter<T>>,
}

impl<T: Keyed> LiveList<T> {
    pub fn new(position: InsertPosition) -> Self {
        Self {
            items: Vec::new(),
            position,
            filter: None,
        }
    }

    pub fn with_filter<F>(position: InsertPosition, filter: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            items: Vec::new(),
            position,
            filter: Some(Box::new(filter)),
        }
    }

    fn matches(&self, item: &T) -> bool {
        self.filter.as_ref().map_or(true, |f| f(item))
    }

    fn index_of(&self, key: &T::Key) -> Option<usize> {
        self.items.iter().position(|item| item.key() == *key)
    }

    /// Replaces the whole collection from an authoritative snapshot. Incoming
    /// order is preserved; entries failing the filter or repeating a key are
    /// dropped.
    pub fn reset(&mut self, items: Vec<T>) {
        let mut seen: Vec<T::Key> = Vec::with_capacity(items.len());
        self.items = items
            .into_iter()
            .filter(|item| {
                if !self.matches(item) || seen.contains(&item.key()) {
                    return false;
                }
                seen.push(item.key());
                true
            })
            .collect();
    }

    /// Swaps the filter predicate. The current contents are untouched; the
    /// caller must follow up with [`LiveList::reset`] from a fresh fetch,
    /// since entities discarded under the old filter cannot be recovered
    /// locally.
    pub fn set_filter<F>(&mut self, filter: F)
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(filter));
    }

    /// Merges one change, idempotently.
    pub fn apply(&mut self, change: Change<T>) -> Applied {
        match change {
            Change::Created(item) => {
                if self.index_of(&item.key()).is_some() {
                    log::debug!("ignoring duplicate create for {:?}", item.key());
                    return Applied::Ignored;
                }
                if !self.matches(&item) {
                    return Applied::Ignored;
                }
                match self.position {
                    InsertPosition::Head => self.items.insert(0, item),
                    InsertPosition::Tail => self.items.push(item),
                }
                Applied::Inserted
            }
            Change::Updated(item) => match self.index_of(&item.key()) {
                Some(index) => {
                    if self.matches(&item) {
                        self.items[index] = item;
                        Applied::Replaced
                    } else {
                        self.items.remove(index);
                        Applied::Removed
                    }
                }
                None => Applied::Ignored,
            },
            Change::Deleted(key) => match self.index_of(&key) {
                Some(index) => {
                    self.items.remove(index);
                    Applied::Removed
                }
                None => Applied::Ignored,
            },
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.items.iter().find(|item| item.key() == *key)
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.index_of(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Keyed + fmt::Debug> fmt::Debug for LiveList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveList")
            .field("items", &self.items)
            .field("position", &self.position)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: u32,
        status: &'static str,
    }

    impl Keyed for Row {
        type Key = u32;

        fn key(&self) -> u32 {
            self.id
        }
    }

    fn row(id: u32, status: &'static str) -> Row {
        Row { id, status }
    }

    #[test]
    fn duplicate_create_is_ignored() {
        let mut list = LiveList::new(InsertPosition::Tail);
        assert_eq!(list.apply(Change::Created(row(1, "ACTIVE"))), Applied::Inserted);
        assert_eq!(list.apply(Change::Created(row(1, "ACTIVE"))), Applied::Ignored);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn create_outside_the_filter_is_discarded() {
        let mut list = LiveList::with_filter(InsertPosition::Tail, |r: &Row| r.status == "ACTIVE");
        assert_eq!(list.apply(Change::Created(row(1, "STOPPED"))), Applied::Ignored);
        assert!(list.is_empty());
    }

    #[test]
    fn update_that_leaves_the_filter_removes_the_entity() {
        let mut list = LiveList::with_filter(InsertPosition::Head, |r: &Row| r.status == "ACTIVE");
        list.apply(Change::Created(row(1, "ACTIVE")));
        assert_eq!(list.apply(Change::Updated(row(1, "STOPPED"))), Applied::Removed);
        assert!(list.is_empty());
    }

    #[test]
    fn update_for_an_unknown_key_is_ignored() {
        let mut list: LiveList<Row> = LiveList::new(InsertPosition::Tail);
        assert_eq!(list.apply(Change::Updated(row(9, "ACTIVE"))), Applied::Ignored);
    }

    #[test]
    fn delete_is_idempotent() {
        let mut list = LiveList::new(InsertPosition::Tail);
        list.apply(Change::Created(row(1, "ACTIVE")));
        assert_eq!(list.apply(Change::Deleted(1)), Applied::Removed);
        assert_eq!(list.apply(Change::Deleted(1)), Applied::Ignored);
    }

    #[test]
    fn head_inserts_put_newest_first() {
        let mut list = LiveList::new(InsertPosition::Head);
        list.apply(Change::Created(row(1, "ACTIVE")));
        list.apply(Change::Created(row(2, "ACTIVE")));
        let ids: Vec<u32> = list.items().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn duplicated_event_stream_matches_the_deduplicated_one() {
        // A create, then updates, then deletes, with every event doubled,
        // must land on the same membership as applying each exactly once.
        let events = [
            Change::Created(row(1, "ACTIVE")),
            Change::Updated(row(1, "ACTIVE")),
            Change::Deleted(1),
        ];

        let mut once = LiveList::new(InsertPosition::Tail);
        for event in events.clone() {
            once.apply(event);
        }

        let mut doubled = LiveList::new(InsertPosition::Tail);
        for event in events {
            doubled.apply(event.clone());
            doubled.apply(event);
        }

        assert_eq!(once.items(), doubled.items());
        assert!(doubled.is_empty());
    }

    #[test]
    fn reset_applies_filter_and_deduplicates() {
        let mut list = LiveList::with_filter(InsertPosition::Tail, |r: &Row| r.status == "ACTIVE");
        list.reset(vec![
            row(1, "ACTIVE"),
            row(2, "STOPPED"),
            row(1, "ACTIVE"),
            row(3, "ACTIVE"),
        ]);
        let ids: Vec<u32> = list.items().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn filter_change_takes_effect_after_reset() {
        let mut list = LiveList::with_filter(InsertPosition::Tail, |r: &Row| r.status == "ACTIVE");
        list.reset(vec![row(1, "ACTIVE"), row(2, "STOPPED")]);
        assert_eq!(list.len(), 1);

        list.set_filter(|r: &Row| r.status == "STOPPED");
        // The re-fetch is the caller's job; reset stands in for it here.
        list.reset(vec![row(1, "ACTIVE"), row(2, "STOPPED")]);
        let ids: Vec<u32> = list.items().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2]);
    }
}
