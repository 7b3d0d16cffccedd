//! Computed Implementation
//!
//! A Computed is a cached derived value. It is both a producer (others read
//! it) and a consumer (it reads others).
//!
//! # How Computed Values Work
//!
//! 1. Creating one runs nothing. The function first runs on the first read.
//!
//! 2. While the function runs, the computed is the active consumer, so every
//!    producer it reads is recorded along with that producer's value version.
//!
//! 3. When a producer changes, the computed is marked stale and passes the
//!    news on to its own consumers. It still does not recompute.
//!
//! 4. On the next read of a stale computed, the recorded producer versions are
//!    compared against the live ones (resolving upstream computed values as
//!    needed). Only if one of them really moved does the function run again.
//!    Otherwise the computed is simply marked clean.
//!
//! 5. After a run, the new value goes through the equality check. An equal
//!    result keeps the old value version, so consumers further down see no
//!    change and skip their own work.
//!
//! # States
//!
//! ```text
//! unresolved --get--> computing --ok--> resolved-clean <--no change-- resolved-stale
//!      ^                  |                   |                            |   ^
//!      +------error-------+                   +-------invalidate-----------+---+
//!                                                     (stale --get, changed--> computing)
//! ```
//!
//! Reading a computed while it is computing is a cycle and fails with
//! [`CircularDependency`](crate::ReactiveError::CircularDependency).

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use super::context::{record_read, untracked, watch_for_reader, ReactiveContext};
use super::ReadSignal;
use crate::error::{ReactiveError, Result};
use crate::graph::{
    any_producers_have_changed, notify_consumers, would_change, ConsumerCore, ConsumerNode,
    Evaluation, Flags, NodeCore, NodeId, NodeKind, ProducerCore, ProducerNode, SignalNode,
};

type ComputeFn<T> = Box<dyn Fn() -> Result<T>>;
type EqualsFn<T> = Box<dyn Fn(&T, &T) -> bool>;

struct ComputedNode<T> {
    core: NodeCore,
    producer: ProducerCore,
    consumer: ConsumerCore,
    this: Weak<ComputedNode<T>>,
    compute: ComputeFn<T>,
    equals: EqualsFn<T>,
    /// `None` until the first successful run, and again after a failed one.
    value: RefCell<Option<T>>,
}

impl<T: 'static> ComputedNode<T> {
    fn evaluate(&self) -> Result<()> {
        let this: Rc<dyn ConsumerNode> = self
            .this
            .upgrade()
            .expect("computed node is alive while it is being read");

        let evaluation = Evaluation::begin(self);
        let value = {
            let _ctx = ReactiveContext::enter(Some(this));
            (self.compute)()?
        };
        let live = evaluation.commit();

        if self.set_if_would_change(value) {
            self.producer.bump_value_version();
        }
        trace!(
            node = %self.id(),
            compute_version = self.compute_version(),
            value_version = self.value_version(),
            "computed"
        );
        if live == 0 {
            warn!(
                node = %self.id(),
                "computed value read no signals and will never recompute"
            );
        }
        Ok(())
    }

    fn set_if_would_change(&self, value: T) -> bool {
        let changed = would_change(&*self.equals, self.value.borrow().as_ref(), &value);
        if changed {
            *self.value.borrow_mut() = Some(value);
        }
        changed
    }

    fn is_resolved(&self) -> bool {
        self.value.borrow().is_some()
    }
}

impl<T: 'static> SignalNode for ComputedNode<T> {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn invalidate(&self) -> Result<()> {
        if self.has_flags(Flags::COMPUTING) {
            return Err(ReactiveError::MutationDuringComputation);
        }
        if self.has_flags(Flags::STALE) {
            return Ok(());
        }
        trace!(node = %self.id(), "computed invalidated");
        self.set_flags(Flags::STALE);
        notify_consumers(self)
    }
}

impl<T: 'static> ProducerNode for ComputedNode<T> {
    fn producer(&self) -> &ProducerCore {
        &self.producer
    }

    fn resolve_value(&self) -> Result<()> {
        if self.has_flags(Flags::COMPUTING) {
            return Err(ReactiveError::CircularDependency);
        }
        if !self.is_resolved()
            || (self.has_flags(Flags::STALE) && any_producers_have_changed(self))
        {
            self.evaluate()?;
        }
        self.clear_flags(Flags::STALE);
        Ok(())
    }

    fn as_consumer(&self) -> Option<&dyn ConsumerNode> {
        Some(self)
    }
}

impl<T: 'static> ConsumerNode for ComputedNode<T> {
    fn consumer(&self) -> &ConsumerCore {
        &self.consumer
    }

    fn downgrade(&self) -> Weak<dyn ConsumerNode> {
        self.this.clone()
    }

    fn abandon(&self) {
        self.value.borrow_mut().take();
        // Unresolved nodes always re-evaluate, so they must keep passing
        // invalidations downstream.
        self.clear_flags(Flags::STALE);
    }
}

/// A cached value derived from other signals.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value.
///
/// The function returns a [`Result`] so that errors from nested reads (a
/// cycle, for instance) propagate with `?`. A failed run leaves the computed
/// unresolved; the next read tries again.
///
/// # Example
///
/// ```rust
/// use trellis_core::{Computed, State};
///
/// let a = State::new(3);
/// let b = State::new(4);
/// let sum = Computed::new({
///     let (a, b) = (a.clone(), b.clone());
///     move || Ok(a.get() + b.get())
/// });
///
/// assert_eq!(sum.get(), Ok(7));
/// ```
pub struct Computed<T: 'static> {
    node: Rc<ComputedNode<T>>,
}

impl<T: PartialEq + 'static> Computed<T> {
    /// Create a computed value compared with `PartialEq`.
    ///
    /// The function is not run until the first read.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> Result<T> + 'static,
    {
        Self::with_equals(compute, |a, b| a == b)
    }
}

impl<T: 'static> Computed<T> {
    /// Create a computed value with a custom notion of "unchanged".
    pub fn with_equals<F, E>(compute: F, equals: E) -> Self
    where
        F: Fn() -> Result<T> + 'static,
        E: Fn(&T, &T) -> bool + 'static,
    {
        let node = Rc::new_cyclic(|this| ComputedNode {
            core: NodeCore::new(NodeKind::Computed, Flags::STALE),
            producer: ProducerCore::default(),
            consumer: ConsumerCore::default(),
            this: this.clone(),
            compute: Box::new(compute),
            equals: Box::new(equals),
            value: RefCell::new(None),
        });
        Self { node }
    }

    /// Get the node ID.
    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a computed value.
    pub fn get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, recomputing if necessary.
    ///
    /// The read is recorded even when resolving fails, so a reader that
    /// handles the error still hears about the next change. A read that hits
    /// a cycle records nothing.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let resolved = self.node.resolve_value();
        if !self.node.has_flags(Flags::COMPUTING) {
            watch_for_reader(&*self.node);
            record_read(self.node.clone());
        }
        resolved?;

        let value = self.node.value.borrow();
        let value = value
            .as_ref()
            .expect("resolved computed holds a value");
        Ok(f(value))
    }

    /// Get the current value without recording a dependency.
    pub fn get_untracked(&self) -> Result<T>
    where
        T: Clone,
    {
        untracked(|| self.get())
    }

    /// Whether the function has produced a value that is still cached.
    pub fn is_resolved(&self) -> bool {
        self.node.is_resolved()
    }

    /// Whether an upstream change may have made the cached value outdated.
    pub fn is_stale(&self) -> bool {
        self.node.has_flags(Flags::STALE)
    }

    /// Whether some live effect depends on this computed value.
    pub fn is_watched(&self) -> bool {
        self.node.is_watched()
    }

    /// Number of times the value has meaningfully changed.
    pub fn value_version(&self) -> u64 {
        self.node.value_version()
    }

    /// Number of successful runs of the function.
    pub fn compute_version(&self) -> u64 {
        self.node.compute_version()
    }

    /// Number of producers read during the last run.
    pub fn producer_count(&self) -> usize {
        self.node.consumer.producer_count()
    }

    /// Number of consumers linked to this computed value, watched or not.
    pub fn consumer_count(&self) -> usize {
        self.node.consumers().len()
    }

    /// Number of consumers holding this computed value through a watched link.
    pub fn watched_consumer_count(&self) -> usize {
        self.node.consumers().watched_len()
    }
}

impl<T: Clone + 'static> ReadSignal<T> for Computed<T> {
    fn read(&self) -> Result<T> {
        self.get()
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id())
            .field("value", &*self.node.value.borrow())
            .field("flags", &self.node.flags())
            .field("compute_version", &self.compute_version())
            .field("value_version", &self.value_version())
            .finish()
    }
}

/// Shorthand for [`Computed::new`].
pub fn computed<T, F>(compute: F) -> Computed<T>
where
    T: PartialEq + 'static,
    F: Fn() -> Result<T> + 'static,
{
    Computed::new(compute)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
