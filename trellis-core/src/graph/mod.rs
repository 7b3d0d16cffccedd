//! Dependency Graph
//!
//! Type-erased bookkeeping shared by every reactive primitive. Nothing in
//! here knows about the values flowing through the graph; it only deals in
//! node identity, status flags, versions, and links.
//!
//! # Links
//!
//! A link between a producer and a consumer is stored on both sides:
//!
//! - the consumer keeps the producer (strongly) with the producer's value
//!   version as last seen;
//! - the producer keeps the consumer with the consumer's compute version at
//!   the time of the read, strongly if the consumer is watched and weakly
//!   otherwise.
//!
//! A link is valid only while the consumer's live compute version matches the
//! one recorded by the producer. Whenever a walk over links finds a mismatch
//! (or a dropped consumer) the link is removed from both sides on the spot.
//!
//! # Versions
//!
//! - `value_version` grows when a producer's value meaningfully changes.
//! - `compute_version` grows when a consumer's function completes a run.
//!
//! Together they let a stale consumer decide whether to run again without
//! running anything that has not actually changed.

mod consumer;
mod node;
mod producer;
mod watch;

pub use node::{Flags, NodeId, NodeKind};

pub(crate) use consumer::{
    any_producers_have_changed, detach, record_access, ConsumerCore, ConsumerNode, Evaluation,
};
pub(crate) use node::{NodeCore, SignalNode};
pub(crate) use producer::{notify_consumers, would_change, ProducerCore, ProducerNode};
pub(crate) use watch::watch_from;
