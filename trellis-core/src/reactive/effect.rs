//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs when the signals it
//! read last time change.
//!
//! # How Effects Work
//!
//! 1. Creating an effect hands it to its enqueue callback straight away, so
//!    the first run (which discovers its dependencies) happens on the next
//!    flush of whatever queue owns it.
//!
//! 2. When a dependency changes, the effect is invalidated and enqueued
//!    again. It does not run by itself; the scheduler decides when.
//!
//! 3. When the scheduler calls [`Effect::run`], the effect first checks
//!    whether any dependency really changed. A change that was undone, or one
//!    absorbed by an intermediate computed value, does not trigger the body.
//!
//! # Differences from Computed
//!
//! - Computed values return a value; effects do not.
//! - Computed values are pulled by readers; effects are pushed to a queue.
//! - Effects are always watched. Everything they read, directly or through
//!   computed values, is held through strong links until the effect is
//!   disposed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use super::context::ReactiveContext;
use crate::error::{ReactiveError, Result};
use crate::graph::{
    any_producers_have_changed, detach, ConsumerCore, ConsumerNode, Evaluation, Flags, NodeCore,
    NodeId, NodeKind, SignalNode,
};

type BodyFn = Box<dyn FnMut() -> Result<()>>;
type EnqueueFn = Box<dyn Fn(&Effect)>;

struct EffectNode {
    core: NodeCore,
    consumer: ConsumerCore,
    this: Weak<EffectNode>,
    body: RefCell<BodyFn>,
    enqueue: EnqueueFn,
    disposed: Cell<bool>,
    /// Set until the first successful run, and again after a failed one.
    forced: Cell<bool>,
}

impl EffectNode {
    fn schedule(&self) {
        if let Some(node) = self.this.upgrade() {
            debug!(node = %self.id(), "effect enqueued");
            (self.enqueue)(&Effect { node });
        }
    }
}

impl SignalNode for EffectNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn invalidate(&self) -> Result<()> {
        if self.has_flags(Flags::COMPUTING) {
            return Err(ReactiveError::MutationDuringComputation);
        }
        if self.disposed.get() || self.has_flags(Flags::STALE) {
            return Ok(());
        }
        self.set_flags(Flags::STALE);
        self.schedule();
        Ok(())
    }
}

impl ConsumerNode for EffectNode {
    fn consumer(&self) -> &ConsumerCore {
        &self.consumer
    }

    fn downgrade(&self) -> Weak<dyn ConsumerNode> {
        self.this.clone()
    }

    fn abandon(&self) {
        self.forced.set(true);
    }
}

/// A schedulable side effect that depends on up-to-date signal values.
///
/// Cloning an `Effect` produces another handle to the same effect.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use trellis_core::{EffectQueue, State};
///
/// let queue = EffectQueue::new();
/// let count = State::new(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let _effect = queue.effect({
///     let (count, seen) = (count.clone(), seen.clone());
///     move || {
///         seen.set(count.get());
///         Ok(())
///     }
/// });
///
/// queue.flush().unwrap();
/// assert_eq!(seen.get(), 0);
///
/// count.set(5).unwrap();
/// queue.flush().unwrap();
/// assert_eq!(seen.get(), 5);
/// ```
#[derive(Clone)]
pub struct Effect {
    node: Rc<EffectNode>,
}

impl Effect {
    /// Create an effect and hand it to `enqueue`.
    ///
    /// `enqueue` is called now and every time the effect becomes pending
    /// again. It should arrange for [`run`](Self::run) to be called later; it
    /// must not run the effect itself.
    pub fn new<F, Q>(body: F, enqueue: Q) -> Self
    where
        F: FnMut() -> Result<()> + 'static,
        Q: Fn(&Effect) + 'static,
    {
        let node = Rc::new_cyclic(|this| EffectNode {
            core: NodeCore::new(NodeKind::Effect, Flags::STALE | Flags::WATCHED),
            consumer: ConsumerCore::default(),
            this: this.clone(),
            body: RefCell::new(Box::new(body)),
            enqueue: Box::new(enqueue),
            disposed: Cell::new(false),
            forced: Cell::new(true),
        });
        node.schedule();
        Self { node }
    }

    /// Get the node ID.
    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    /// Run the body if it has never run, or if a dependency has changed since
    /// the last run.
    ///
    /// Errors from the body (including a write to a signal the body itself
    /// depends on) are returned as is, and the effect stays due to run again.
    pub fn run(&self) -> Result<()> {
        let node = &*self.node;
        if node.disposed.get() {
            return Ok(());
        }
        if node.has_flags(Flags::COMPUTING) {
            return Err(ReactiveError::CircularDependency);
        }

        node.clear_flags(Flags::STALE);
        if !node.forced.get() && !any_producers_have_changed(node) {
            trace!(node = %node.id(), "effect skipped, nothing changed");
            return Ok(());
        }

        let this: Rc<dyn ConsumerNode> = self.node.clone();
        let evaluation = Evaluation::begin(node);
        {
            let _ctx = ReactiveContext::enter(Some(this));
            let mut body = node.body.borrow_mut();
            (&mut *body)()?;
        }
        let live = evaluation.commit();
        node.forced.set(false);

        if live == 0 {
            warn!(node = %node.id(), "effect read no signals and will never run again");
        }
        Ok(())
    }

    /// Stop the effect for good.
    ///
    /// The effect is no longer run or enqueued, and it lets go of everything
    /// it read. Producers left without another watched consumer become
    /// unwatched, recursively.
    pub fn dispose(&self) {
        let node = &*self.node;
        if node.disposed.replace(true) {
            return;
        }
        debug!(node = %node.id(), "effect disposed");
        node.clear_flags(Flags::WATCHED | Flags::STALE);
        detach(node);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.node.disposed.get()
    }

    /// Whether the effect is waiting to be run.
    pub fn is_pending(&self) -> bool {
        !self.is_disposed() && (self.node.forced.get() || self.node.has_flags(Flags::STALE))
    }

    /// Get the number of times the body has run to completion.
    pub fn run_count(&self) -> u64 {
        self.node.compute_version()
    }

    /// Get the number of signals read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.node.consumer.producer_count()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Shorthand for [`Effect::new`].
pub fn effect<F, Q>(body: F, enqueue: Q) -> Effect
where
    F: FnMut() -> Result<()> + 'static,
    Q: Fn(&Effect) + 'static,
{
    Effect::new(body, enqueue)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
