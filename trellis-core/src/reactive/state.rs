//! State Implementation
//!
//! A State is the writable leaf of the graph. It holds a value, hands it out
//! to readers, and tells its consumers when a write actually changes it.
//!
//! # How State Works
//!
//! 1. When read within a reactive context (computed/effect), the reader is
//!    recorded as a consumer of the state.
//!
//! 2. When written, the new value is compared with the old one using the
//!    state's equality function. An equal value is dropped on the floor: no
//!    version bump, no notification.
//!
//! 3. A real change bumps the value version and invalidates every consumer,
//!    which in turn invalidate theirs. Nothing recomputes yet.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use tracing::trace;

use super::context::{record_read, watch_for_reader};
use super::ReadSignal;
use crate::error::{ReactiveError, Result};
use crate::graph::{
    notify_consumers, would_change, NodeCore, NodeId, NodeKind, ProducerCore, ProducerNode,
    SignalNode,
};
use crate::Flags;

type EqualsFn<T> = Box<dyn Fn(&T, &T) -> bool>;

struct StateNode<T> {
    core: NodeCore,
    producer: ProducerCore,
    value: RefCell<T>,
    equals: EqualsFn<T>,
}

impl<T: 'static> StateNode<T> {
    fn set_if_would_change(&self, value: T) -> Result<bool> {
        self.ensure_writable()?;
        let changed = would_change(&*self.equals, Some(&*self.value.borrow()), &value);
        if changed {
            *self.value.borrow_mut() = value;
        }
        Ok(changed)
    }

    /// A write is refused while a reader is still inside `with` or `update`.
    fn ensure_writable(&self) -> Result<()> {
        match self.value.try_borrow_mut() {
            Ok(_) => Ok(()),
            Err(_) => Err(ReactiveError::MutationDuringComputation),
        }
    }

    fn commit(&self) -> Result<()> {
        self.producer.bump_value_version();
        trace!(node = %self.id(), version = self.producer.value_version(), "state changed");
        notify_consumers(self)
    }
}

impl<T: 'static> SignalNode for StateNode<T> {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn invalidate(&self) -> Result<()> {
        notify_consumers(self)
    }
}

impl<T: 'static> ProducerNode for StateNode<T> {
    fn producer(&self) -> &ProducerCore {
        &self.producer
    }

    fn resolve_value(&self) -> Result<()> {
        Ok(())
    }
}

/// A writable reactive value of type `T`.
///
/// Cloning a `State` produces another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use trellis_core::{Computed, State};
///
/// let count = State::new(1);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || Ok(count.get() * 2)
/// });
///
/// assert_eq!(doubled.get(), Ok(2));
/// count.set(5).unwrap();
/// assert_eq!(doubled.get(), Ok(10));
/// ```
pub struct State<T: 'static> {
    node: Rc<StateNode<T>>,
}

impl<T: PartialEq + 'static> State<T> {
    /// Create a new state compared with `PartialEq`.
    pub fn new(value: T) -> Self {
        Self::with_equals(value, |a, b| a == b)
    }
}

impl<T: 'static> State<T> {
    /// Create a new state with a custom notion of "unchanged".
    pub fn with_equals<E>(value: T, equals: E) -> Self
    where
        E: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            node: Rc::new(StateNode {
                core: NodeCore::new(NodeKind::State, Flags::empty()),
                producer: ProducerCore::default(),
                value: RefCell::new(value),
                equals: Box::new(equals),
            }),
        }
    }

    /// Get the node ID.
    pub fn id(&self) -> NodeId {
        self.node.id()
    }

    /// Get a clone of the current value, recording the read if a consumer is
    /// evaluating.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, recording the read like [`get`](Self::get).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        watch_for_reader(&*self.node);
        record_read(self.node.clone());
        f(&*self.node.value.borrow())
    }

    /// Get a clone of the current value without recording a dependency.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.node.value.borrow().clone()
    }

    /// Replace the value and notify consumers if it changed.
    ///
    /// Fails with [`MutationDuringComputation`](crate::ReactiveError::MutationDuringComputation)
    /// if a consumer of this state is evaluating right now, or if the value is
    /// still borrowed by an enclosing [`with`](Self::with) or
    /// [`update`](Self::update) on this state. In the first case the value is
    /// stored and every other consumer is still notified.
    pub fn set(&self, value: T) -> Result<()> {
        if self.node.set_if_would_change(value)? {
            self.node.commit()
        } else {
            Ok(())
        }
    }

    /// Compute a new value from the current one, then [`set`](Self::set) it.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        let next = f(&*self.node.value.borrow());
        self.set(next)
    }

    /// Modify the value in place.
    ///
    /// There is no old value left to compare against, so consumers are
    /// always notified.
    ///
    /// The closure must not read this state; doing so panics.
    pub fn mutate(&self, f: impl FnOnce(&mut T)) -> Result<()> {
        self.node.ensure_writable()?;
        f(&mut *self.node.value.borrow_mut());
        self.node.commit()
    }

    /// Number of times the value has meaningfully changed.
    pub fn value_version(&self) -> u64 {
        self.node.value_version()
    }

    /// Whether some live effect depends on this state.
    pub fn is_watched(&self) -> bool {
        self.node.is_watched()
    }

    /// Number of consumers linked to this state, watched or not.
    pub fn consumer_count(&self) -> usize {
        self.node.consumers().len()
    }

    /// Number of consumers holding this state through a watched link.
    pub fn watched_consumer_count(&self) -> usize {
        self.node.consumers().watched_len()
    }
}

impl<T: Clone + 'static> ReadSignal<T> for State<T> {
    fn read(&self) -> Result<T> {
        Ok(self.get())
    }
}

impl<T: 'static> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<T: Debug + 'static> Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id())
            .field("value", &*self.node.value.borrow())
            .field("value_version", &self.value_version())
            .field("flags", &self.node.flags())
            .field("consumer_count", &self.consumer_count())
            .finish()
    }
}

/// Shorthand for [`State::new`].
pub fn state<T: PartialEq + 'static>(value: T) -> State<T> {
    State::new(value)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
