//! Reactive Primitives
//!
//! This module implements the typed surface of the graph: state, computed
//! values, and effects, plus the context that connects them.
//!
//! # Concepts
//!
//! ## State
//!
//! A State is a container for a value that is set from outside. Reading it
//! while a computed value or effect is evaluating records that consumer as a
//! dependent. Setting it to a value the equality function considers new
//! invalidates every dependent, transitively.
//!
//! ## Computed
//!
//! A Computed is a derived value that caches its result. It never runs on
//! construction and never runs on invalidation: it runs when read, and only if
//! one of the values it read last time actually changed.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs when its
//! dependencies change. It is not run by the graph. Becoming pending hands it
//! to an enqueue callback, and a scheduler such as [`EffectQueue`] runs it.
//!
//! # Implementation Notes
//!
//! Dependencies are detected automatically through a thread-local context
//! stack: a read checks for an active consumer and, if there is one, records
//! a link to it. The link bookkeeping itself lives in [`crate::graph`].

mod computed;
mod constant;
mod context;
mod effect;
mod queue;
mod state;

pub use computed::{computed, Computed};
pub use constant::{constant, Constant};
pub use context::{current_consumer, is_tracking, untracked};
pub use effect::{effect, Effect};
pub use queue::EffectQueue;
pub use state::{state, State};

use crate::error::Result;

/// Anything that can be read for a value of type `T`.
///
/// Reads through this trait are tracked exactly like the inherent `get` of
/// each type. Use it to write code that accepts state, computed values and
/// constants interchangeably.
pub trait ReadSignal<T> {
    fn read(&self) -> Result<T>;
}
