//! Effect Queue
//!
//! The graph never runs an effect by itself: it only tells the effect's
//! enqueue callback that the effect is pending. `EffectQueue` is a plain
//! in-process scheduler built on that callback. Pending effects are kept in
//! insertion order with duplicates collapsed, and [`EffectQueue::flush`] runs
//! each of them once.
//!
//! Effects that become pending while a flush is in progress (because one
//! effect wrote a signal another effect reads) are left for the next flush.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use super::effect::Effect;
use crate::error::Result;
use crate::graph::NodeId;

/// A FIFO of pending effects.
///
/// Cloning an `EffectQueue` produces another handle to the same queue.
/// Effects created through the queue only hold it weakly, so dropping every
/// handle drops the queue and any effects still waiting in it.
#[derive(Clone, Default)]
pub struct EffectQueue {
    pending: Rc<RefCell<IndexMap<NodeId, Effect>>>,
}

impl EffectQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an effect scheduled on this queue.
    pub fn effect<F>(&self, body: F) -> Effect
    where
        F: FnMut() -> Result<()> + 'static,
    {
        Effect::new(body, self.enqueuer())
    }

    /// An enqueue callback suitable for [`Effect::new`].
    pub fn enqueuer(&self) -> impl Fn(&Effect) + 'static {
        let pending = Rc::downgrade(&self.pending);
        move |effect: &Effect| {
            if let Some(pending) = pending.upgrade() {
                pending
                    .borrow_mut()
                    .entry(effect.id())
                    .or_insert_with(|| effect.clone());
            }
        }
    }

    /// Add `effect` to the queue unless it is already waiting.
    pub fn enqueue(&self, effect: &Effect) {
        self.pending
            .borrow_mut()
            .entry(effect.id())
            .or_insert_with(|| effect.clone());
    }

    /// Number of effects waiting to run.
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Whether `effect` is waiting in this queue.
    pub fn contains(&self, effect: &Effect) -> bool {
        self.pending.borrow().contains_key(&effect.id())
    }

    /// Run every effect that was pending when the flush started.
    ///
    /// Returns how many effects were taken off the queue. If one of them
    /// fails, the flush stops there: the effects after it go back on the
    /// queue (ahead of anything enqueued meanwhile) and the error is
    /// returned. The failed effect itself is re-queued the next time one of
    /// its dependencies changes.
    pub fn flush(&self) -> Result<usize> {
        let batch: Vec<Effect> = std::mem::take(&mut *self.pending.borrow_mut())
            .into_values()
            .collect();
        debug!(count = batch.len(), "flushing effects");

        for (index, effect) in batch.iter().enumerate() {
            if let Err(err) = effect.run() {
                let mut pending = self.pending.borrow_mut();
                let newcomers = std::mem::take(&mut *pending);
                for rest in &batch[index + 1..] {
                    pending.insert(rest.id(), rest.clone());
                }
                for (id, effect) in newcomers {
                    pending.entry(id).or_insert(effect);
                }
                debug!(
                    failed = %effect.id(),
                    requeued = pending.len(),
                    "flush aborted"
                );
                return Err(err);
            }
        }
        Ok(batch.len())
    }
}

impl std::fmt::Debug for EffectQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectQueue")
            .field("pending", &self.len())
            .finish()
    }
}
