//! Producer side of a link.
//!
//! A producer holds two consumer tables. Watched consumers are held strongly
//! so that invalidation always reaches them. Unwatched consumers are held
//! through a [`Weak`] so a derived value nobody observes can still be dropped;
//! a dead entry is treated as a stale link and removed the next time the table
//! is walked.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use super::consumer::{unlink_if_needed, ConsumerNode};
use super::node::{NodeId, SignalNode};
use crate::error::Result;

/// Consumer entry that keeps its consumer alive.
struct WatchedLink {
    consumer: Rc<dyn ConsumerNode>,
    compute_version: u64,
}

/// Consumer entry that tolerates its consumer being dropped.
struct UnwatchedLink {
    consumer: Weak<dyn ConsumerNode>,
    compute_version: u64,
}

/// The consumers of one producer, split by watched status.
///
/// Each entry records the consumer's compute version at the time it read the
/// producer. A mismatch with the consumer's live compute version means the
/// consumer has re-run without reading this producer again.
#[derive(Default)]
pub(crate) struct ConsumerLinks {
    watched: RefCell<IndexMap<NodeId, WatchedLink>>,
    unwatched: RefCell<IndexMap<NodeId, UnwatchedLink>>,
}

impl ConsumerLinks {
    /// The compute version recorded for `id`, from whichever table holds it.
    pub(crate) fn recorded_version(&self, id: NodeId) -> Option<u64> {
        if let Some(link) = self.watched.borrow().get(&id) {
            return Some(link.compute_version);
        }
        self.unwatched.borrow().get(&id).map(|link| link.compute_version)
    }

    pub(crate) fn insert_watched(&self, consumer: Rc<dyn ConsumerNode>, compute_version: u64) {
        let id = consumer.id();
        self.unwatched.borrow_mut().shift_remove(&id);
        self.watched.borrow_mut().insert(
            id,
            WatchedLink {
                consumer,
                compute_version,
            },
        );
    }

    pub(crate) fn insert_unwatched(&self, consumer: &Rc<dyn ConsumerNode>, compute_version: u64) {
        let id = consumer.id();
        self.watched.borrow_mut().shift_remove(&id);
        self.unwatched.borrow_mut().insert(
            id,
            UnwatchedLink {
                consumer: Rc::downgrade(consumer),
                compute_version,
            },
        );
    }

    /// Move an existing unwatched entry into the watched table.
    pub(crate) fn promote(&self, consumer: Rc<dyn ConsumerNode>) {
        let id = consumer.id();
        let Some(link) = self.unwatched.borrow_mut().shift_remove(&id) else {
            return;
        };
        self.watched.borrow_mut().insert(
            id,
            WatchedLink {
                consumer,
                compute_version: link.compute_version,
            },
        );
    }

    /// Move an existing watched entry into the unwatched table.
    pub(crate) fn demote(&self, id: NodeId) {
        let Some(link) = self.watched.borrow_mut().shift_remove(&id) else {
            return;
        };
        self.unwatched.borrow_mut().insert(
            id,
            UnwatchedLink {
                consumer: Rc::downgrade(&link.consumer),
                compute_version: link.compute_version,
            },
        );
    }

    /// Overwrite the recorded compute version if it currently equals `from`.
    pub(crate) fn restamp(&self, id: NodeId, from: u64, to: u64) {
        if let Some(link) = self.watched.borrow_mut().get_mut(&id) {
            if link.compute_version == from {
                link.compute_version = to;
            }
            return;
        }
        if let Some(link) = self.unwatched.borrow_mut().get_mut(&id) {
            if link.compute_version == from {
                link.compute_version = to;
            }
        }
    }

    pub(crate) fn remove(&self, id: NodeId) {
        self.watched.borrow_mut().shift_remove(&id);
        self.unwatched.borrow_mut().shift_remove(&id);
    }

    pub(crate) fn watched_len(&self) -> usize {
        self.watched.borrow().len()
    }

    pub(crate) fn len(&self) -> usize {
        self.watched_len() + self.unwatched.borrow().len()
    }

    fn watched_snapshot(&self) -> SmallVec<[Rc<dyn ConsumerNode>; 4]> {
        self.watched
            .borrow()
            .values()
            .map(|link| Rc::clone(&link.consumer))
            .collect()
    }

    fn unwatched_snapshot(&self) -> SmallVec<[(NodeId, Weak<dyn ConsumerNode>, u64); 4]> {
        self.unwatched
            .borrow()
            .iter()
            .map(|(id, link)| (*id, link.consumer.clone(), link.compute_version))
            .collect()
    }
}

/// Value-version and consumer bookkeeping embedded in every producer.
#[derive(Default)]
pub(crate) struct ProducerCore {
    value_version: Cell<u64>,
    consumers: ConsumerLinks,
}

impl ProducerCore {
    pub(crate) fn consumers(&self) -> &ConsumerLinks {
        &self.consumers
    }

    pub(crate) fn value_version(&self) -> u64 {
        self.value_version.get()
    }

    pub(crate) fn bump_value_version(&self) {
        self.value_version.set(self.value_version.get() + 1);
    }
}

/// A node that exposes a cached value to dependents.
pub(crate) trait ProducerNode: SignalNode {
    fn producer(&self) -> &ProducerCore;

    /// Bring the value and value version up to date with the node's inputs.
    fn resolve_value(&self) -> Result<()>;

    /// The consumer half of a dual-role node, if there is one.
    fn as_consumer(&self) -> Option<&dyn ConsumerNode> {
        None
    }

    fn value_version(&self) -> u64 {
        self.producer().value_version()
    }

    fn consumers(&self) -> &ConsumerLinks {
        self.producer().consumers()
    }
}

/// Decide whether `new` is a meaningful change from `old`.
///
/// An absent old value always counts as a change. The comparator runs with no
/// active consumer, so signals it happens to read are not recorded.
pub(crate) fn would_change<T>(
    equals: &dyn Fn(&T, &T) -> bool,
    old: Option<&T>,
    new: &T,
) -> bool {
    match old {
        None => true,
        Some(old) => !crate::reactive::untracked(|| equals(old, new)),
    }
}

/// Tell every live consumer of `producer` that it may need to re-evaluate.
///
/// Links that have gone stale, or whose consumer no longer exists, are
/// removed instead of notified. A consumer refusing the notification (because
/// it is mid-evaluation) does not stop the walk: every other consumer is still
/// invalidated, and the first refusal is returned once all have been visited.
pub(crate) fn notify_consumers(producer: &dyn ProducerNode) -> Result<()> {
    let mut outcome = Ok(());

    for (id, consumer, recorded) in producer.consumers().unwatched_snapshot() {
        match consumer.upgrade() {
            Some(consumer) if consumer.compute_version() == recorded => {
                keep_first_error(&mut outcome, consumer.invalidate());
            }
            Some(consumer) => {
                trace!(producer = %producer.id(), consumer = %id, "pruning stale link");
                producer.consumers().remove(id);
                consumer.consumer().forget(producer.id());
            }
            None => {
                trace!(producer = %producer.id(), consumer = %id, "pruning dropped consumer");
                producer.consumers().remove(id);
            }
        }
    }

    for consumer in producer.consumers().watched_snapshot() {
        if !unlink_if_needed(producer, &*consumer) {
            keep_first_error(&mut outcome, consumer.invalidate());
        }
    }
    outcome
}

fn keep_first_error(outcome: &mut Result<()>, next: Result<()>) {
    if outcome.is_ok() {
        *outcome = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_value_always_changes() {
        let eq = |a: &i32, b: &i32| a == b;
        assert!(would_change(&eq, None, &1));
        assert!(!would_change(&eq, Some(&1), &1));
        assert!(would_change(&eq, Some(&1), &2));
    }

    #[test]
    fn value_version_bumps() {
        let core = ProducerCore::default();
        assert_eq!(core.value_version(), 0);
        core.bump_value_version();
        core.bump_value_version();
        assert_eq!(core.value_version(), 2);
        assert_eq!(core.consumers().len(), 0);
    }
}
