//! Reactive Context
//!
//! The reactive context tracks which consumer is currently evaluating, so a
//! producer being read can find out who is reading it without any explicit
//! registration call.
//!
//! # Implementation
//!
//! We use a thread-local stack. Evaluating a computed value or running an
//! effect pushes that consumer; the returned guard pops it again when
//! dropped, on normal return, on an early `?` return, and while unwinding.
//! Nested evaluations therefore follow the call stack exactly.
//!
//! An entry may also be empty. [`untracked`] pushes an empty entry so reads
//! inside it are not attributed to whichever consumer is running outside.

use std::cell::RefCell;
use std::rc::Rc;

use crate::graph::{record_access, watch_from, ConsumerNode, NodeId, ProducerNode, SignalNode};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<Rc<dyn ConsumerNode>>>> = RefCell::new(Vec::new());
}

/// Guard that pops the context when dropped.
pub(crate) struct ReactiveContext {
    consumer: Option<NodeId>,
}

impl ReactiveContext {
    /// Make `consumer` the active consumer until the guard is dropped.
    pub(crate) fn enter(consumer: Option<Rc<dyn ConsumerNode>>) -> Self {
        let id = consumer.as_ref().map(|c| c.id());
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(consumer));
        Self { consumer: id }
    }

    /// The active consumer, if any.
    pub(crate) fn current() -> Option<Rc<dyn ConsumerNode>> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.map(|c| c.id()),
                    self.consumer,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}

/// Run `f` with no active consumer.
///
/// Reads inside `f` return current values but record no dependency.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter(None);
    f()
}

/// Whether a read right now would be recorded as a dependency.
pub fn is_tracking() -> bool {
    CONTEXT_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
}

/// ID of the consumer currently evaluating, if any.
pub fn current_consumer() -> Option<NodeId> {
    ReactiveContext::current().map(|c| c.id())
}

/// Called before a producer resolves its value for a read.
pub(crate) fn watch_for_reader(producer: &dyn ProducerNode) {
    if let Some(active) = ReactiveContext::current() {
        watch_from(&*active, producer);
    }
}

/// Called once a producer's value is current and about to be returned.
pub(crate) fn record_read(producer: Rc<dyn ProducerNode>) {
    if let Some(active) = ReactiveContext::current() {
        record_access(&active, &producer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Computed, State};
    use crate::ReactiveError;

    #[test]
    fn no_context_outside_evaluation() {
        assert!(!is_tracking());
        assert!(current_consumer().is_none());
    }

    #[test]
    fn computed_is_active_while_evaluating() {
        let seen = Rc::new(RefCell::new(None));
        let seen_in = seen.clone();
        let memo = Computed::new(move || {
            *seen_in.borrow_mut() = current_consumer();
            Ok(is_tracking())
        });

        assert_eq!(memo.get(), Ok(true));
        assert_eq!(*seen.borrow(), Some(memo.id()));
        assert!(current_consumer().is_none());
    }

    #[test]
    fn untracked_hides_the_active_consumer() {
        let memo = Computed::new(|| Ok(untracked(is_tracking)));
        assert_eq!(memo.get(), Ok(false));
    }

    #[test]
    fn nested_contexts_restore_outer() {
        let inner = Computed::new(|| Ok(current_consumer()));
        let inner_clone = inner.clone();
        let outer = Computed::new(move || {
            let before = current_consumer();
            let from_inner = inner_clone.get()?;
            let after = current_consumer();
            Ok((before, from_inner, after))
        });

        let (before, from_inner, after) = outer.get().unwrap();
        assert_eq!(before, Some(outer.id()));
        assert_eq!(from_inner, Some(inner.id()));
        assert_eq!(after, Some(outer.id()));
    }

    #[test]
    fn context_restored_after_error() {
        let failing = Computed::new(|| -> crate::Result<i32> {
            Err(ReactiveError::aborted("nope"))
        });
        assert!(failing.get().is_err());
        assert!(!is_tracking());
    }

    #[test]
    fn context_restored_after_panic() {
        let state = State::new(1);
        let reader = state.clone();
        let panicking = Computed::new(move || -> crate::Result<i32> {
            reader.get();
            panic!("boom");
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| panicking.get()));
        assert!(result.is_err());
        assert!(current_consumer().is_none());
    }
}
