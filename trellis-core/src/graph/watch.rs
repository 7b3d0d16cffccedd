//! Watch propagation.
//!
//! Effects are watched by construction. Anything an effect reads, directly or
//! through computed values, becomes watched too, and its links move into the
//! strong tables of its producers. When the last watched consumer of a
//! producer goes away the producer becomes unwatched again and releases its
//! own upstream links.

use tracing::debug;

use super::consumer::{unlink_if_needed, ConsumerNode};
use super::node::{Flags, SignalNode};
use super::producer::ProducerNode;

/// Mark `producer` watched because a watched consumer is about to read it.
pub(crate) fn watch_from(reader: &dyn ConsumerNode, producer: &dyn ProducerNode) {
    if reader.is_watched() && !producer.is_watched() {
        watch(producer);
    }
}

fn watch(producer: &dyn ProducerNode) {
    debug!(node = %producer.id(), kind = ?producer.kind(), "watching");
    producer.set_flags(Flags::WATCHED);

    let Some(consumer) = producer.as_consumer() else {
        return;
    };
    let Some(strong) = consumer.upgrade() else {
        return;
    };
    for dependency in consumer.consumer().snapshot() {
        let upstream = &*dependency.producer;
        if unlink_if_needed(upstream, consumer) {
            continue;
        }
        upstream.consumers().promote(strong.clone());
        if !upstream.is_watched() {
            watch(upstream);
        }
    }
}

/// Move every link `consumer` holds into the weak tables, releasing any
/// producer that is left without a watched consumer.
pub(crate) fn unwatch_producers(consumer: &dyn ConsumerNode) {
    for dependency in consumer.consumer().snapshot() {
        let producer = &*dependency.producer;
        if unlink_if_needed(producer, consumer) {
            continue;
        }
        producer.consumers().demote(consumer.id());
        release_if_unobserved(producer);
    }
}

/// Return `producer` to the unwatched state once nothing watched reads it.
///
/// State nodes stop here. Computed nodes recurse into their own producers.
pub(crate) fn release_if_unobserved(producer: &dyn ProducerNode) {
    if !producer.is_watched() || producer.consumers().watched_len() > 0 {
        return;
    }

    debug!(node = %producer.id(), kind = ?producer.kind(), "unwatching");
    producer.clear_flags(Flags::WATCHED);
    if let Some(consumer) = producer.as_consumer() {
        unwatch_producers(consumer);
    }
}
