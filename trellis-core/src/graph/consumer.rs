//! Consumer side of a link.
//!
//! A consumer remembers every producer it read during its last evaluation,
//! together with the producer's value version at the time. Comparing those
//! versions is how a stale consumer finds out whether it actually has to run
//! again.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use super::node::{Flags, NodeId, SignalNode};
use super::producer::ProducerNode;
use super::watch::release_if_unobserved;

/// A producer as last seen by a consumer.
#[derive(Clone)]
pub(crate) struct Dependency {
    pub(crate) producer: Rc<dyn ProducerNode>,
    pub(crate) seen_version: u64,
}

/// Compute-version and producer bookkeeping embedded in every consumer.
#[derive(Default)]
pub(crate) struct ConsumerCore {
    compute_version: Cell<u64>,
    producers: RefCell<IndexMap<NodeId, Dependency>>,
}

impl ConsumerCore {
    pub(crate) fn compute_version(&self) -> u64 {
        self.compute_version.get()
    }

    /// Start an evaluation. Returns the new compute version.
    pub(crate) fn begin(&self) -> u64 {
        let next = self.compute_version.get() + 1;
        self.compute_version.set(next);
        next
    }

    /// Undo [`begin`](Self::begin) after a failed evaluation.
    pub(crate) fn rollback(&self) {
        let current = self.compute_version.get();
        debug_assert!(current > 0, "compute version rolled back below zero");
        self.compute_version.set(current.saturating_sub(1));
    }

    pub(crate) fn producer_count(&self) -> usize {
        self.producers.borrow().len()
    }

    pub(crate) fn forget(&self, producer: NodeId) {
        self.producers.borrow_mut().shift_remove(&producer);
    }

    pub(crate) fn snapshot(&self) -> SmallVec<[Dependency; 4]> {
        self.producers.borrow().values().cloned().collect()
    }

    fn record(&self, producer: &Rc<dyn ProducerNode>) {
        self.producers.borrow_mut().insert(
            producer.id(),
            Dependency {
                producer: Rc::clone(producer),
                seen_version: producer.value_version(),
            },
        );
    }

    fn take_all(&self) -> IndexMap<NodeId, Dependency> {
        std::mem::take(&mut *self.producers.borrow_mut())
    }
}

/// A node that reads producers and must be told when they change.
pub(crate) trait ConsumerNode: SignalNode {
    fn consumer(&self) -> &ConsumerCore;

    /// A weak handle to this node, for producers that must not keep it alive.
    fn downgrade(&self) -> Weak<dyn ConsumerNode>;

    /// Forget the result of an evaluation that did not complete.
    fn abandon(&self) {}

    fn compute_version(&self) -> u64 {
        self.consumer().compute_version()
    }

    fn upgrade(&self) -> Option<Rc<dyn ConsumerNode>> {
        self.downgrade().upgrade()
    }
}

/// One run of a consumer's function.
///
/// Created right before the function is called. Dropping it without calling
/// [`commit`](Self::commit), whether through an early return or a panic, rolls
/// the compute version back so the failed run leaves no trace in the version
/// history. Links the failed run touched are kept, re-stamped to the restored
/// version, and the node forgets its result so the next read or run
/// evaluates again unconditionally.
pub(crate) struct Evaluation<'a> {
    consumer: &'a dyn ConsumerNode,
    version: u64,
    committed: bool,
}

impl<'a> Evaluation<'a> {
    pub(crate) fn begin(consumer: &'a dyn ConsumerNode) -> Self {
        let version = consumer.consumer().begin();
        consumer.set_flags(Flags::COMPUTING);
        trace!(node = %consumer.id(), kind = ?consumer.kind(), version, "evaluating");
        Self {
            consumer,
            version,
            committed: false,
        }
    }

    /// Accept the run. Links it did not refresh are dropped.
    ///
    /// Returns the number of producers the consumer now depends on.
    pub(crate) fn commit(mut self) -> usize {
        self.committed = true;
        self.consumer.clear_flags(Flags::COMPUTING);
        for dependency in self.consumer.consumer().snapshot() {
            unlink_if_needed(&*dependency.producer, self.consumer);
        }
        self.consumer.consumer().producer_count()
    }
}

impl Drop for Evaluation<'_> {
    fn drop(&mut self) {
        self.consumer.clear_flags(Flags::COMPUTING);
        if self.committed {
            return;
        }
        trace!(node = %self.consumer.id(), version = self.version, "evaluation aborted");
        self.consumer.consumer().rollback();
        restamp_links(self.consumer, self.version);
        self.consumer.abandon();
    }
}

/// Record that `consumer` just read `producer`.
///
/// The link goes into the producer's watched table when the consumer is
/// watched, and into the weak table otherwise.
pub(crate) fn record_access(consumer: &Rc<dyn ConsumerNode>, producer: &Rc<dyn ProducerNode>) {
    consumer.consumer().record(producer);

    let compute_version = consumer.compute_version();
    if consumer.is_watched() {
        producer
            .consumers()
            .insert_watched(Rc::clone(consumer), compute_version);
    } else {
        producer.consumers().insert_unwatched(consumer, compute_version);
    }
}

/// Drop the link between `producer` and `consumer` if the consumer has
/// re-evaluated since the link was recorded.
///
/// Returns `true` if the link was removed.
pub(crate) fn unlink_if_needed(producer: &dyn ProducerNode, consumer: &dyn ConsumerNode) -> bool {
    let recorded = producer.consumers().recorded_version(consumer.id());
    if recorded == Some(consumer.compute_version()) {
        return false;
    }

    trace!(producer = %producer.id(), consumer = %consumer.id(), "unlinking stale dependency");
    consumer.consumer().forget(producer.id());
    producer.consumers().remove(consumer.id());
    release_if_unobserved(producer);
    true
}

/// Whether any producer `consumer` depends on has a different value than
/// the one it last saw.
///
/// Producers whose version still matches are resolved first, since a stale
/// computed only learns its new version by recomputing. A producer that fails
/// to resolve counts as changed: the consumer runs again and meets the error
/// in its own function, where it can be handled or passed on. Stale links are
/// pruned along the way.
pub(crate) fn any_producers_have_changed(consumer: &dyn ConsumerNode) -> bool {
    for dependency in consumer.consumer().snapshot() {
        let producer = &*dependency.producer;
        if unlink_if_needed(producer, consumer) {
            continue;
        }

        if producer.value_version() != dependency.seen_version {
            return true;
        }
        if let Err(err) = producer.resolve_value() {
            trace!(producer = %producer.id(), consumer = %consumer.id(), %err, "producer failed to resolve");
            return true;
        }
        if producer.value_version() != dependency.seen_version {
            return true;
        }
    }
    false
}

/// Give links touched by a failed evaluation back to the rolled-back
/// compute version, so the consumer keeps hearing about every producer it
/// read before failing.
fn restamp_links(consumer: &dyn ConsumerNode, aborted: u64) {
    let current = consumer.compute_version();
    for dependency in consumer.consumer().snapshot() {
        dependency
            .producer
            .consumers()
            .restamp(consumer.id(), aborted, current);
    }
}

/// Remove every link `consumer` holds, on both sides.
pub(crate) fn detach(consumer: &dyn ConsumerNode) {
    for (_, dependency) in consumer.consumer().take_all() {
        dependency.producer.consumers().remove(consumer.id());
        release_if_unobserved(&*dependency.producer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_and_rollback_are_symmetric() {
        let core = ConsumerCore::default();
        assert_eq!(core.begin(), 1);
        assert_eq!(core.begin(), 2);
        core.rollback();
        assert_eq!(core.compute_version(), 1);
        assert_eq!(core.producer_count(), 0);
    }
}
