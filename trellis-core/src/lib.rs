//! Trellis Core
//!
//! This crate provides a lazy, incremental reactive graph. It implements:
//!
//! - State cells that are written from outside
//! - Computed values that derive from other nodes and cache their result
//! - Effects that re-run when what they read changes, on a caller-chosen
//!   schedule
//!
//! Writes invalidate eagerly; recomputation is pulled on read. A computed
//! value only re-runs when a value it read last time has actually changed,
//! and nodes that nothing watched depends on are held weakly so they can be
//! dropped.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `graph`: node identity, flags, versions and links, independent of the
//!   values flowing through them
//! - `reactive`: the typed primitives and the active-consumer context
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use trellis_core::{Computed, EffectQueue, State};
//!
//! let count = State::new(1);
//! let doubled = Computed::new({
//!     let count = count.clone();
//!     move || Ok(count.get() * 2)
//! });
//! assert_eq!(doubled.get(), Ok(2));
//!
//! let queue = EffectQueue::new();
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let _effect = queue.effect({
//!     let (doubled, log) = (doubled.clone(), log.clone());
//!     move || {
//!         log.borrow_mut().push(doubled.get()?);
//!         Ok(())
//!     }
//! });
//!
//! queue.flush().unwrap();
//! count.set(5).unwrap();
//! queue.flush().unwrap();
//! assert_eq!(*log.borrow(), vec![2, 10]);
//! ```

pub mod graph;
pub mod reactive;

mod error;

pub use error::{ReactiveError, Result};
pub use graph::{Flags, NodeId, NodeKind};
pub use reactive::{
    computed, constant, current_consumer, effect, is_tracking, state, untracked, Computed,
    Constant, Effect, EffectQueue, ReadSignal, State,
};
