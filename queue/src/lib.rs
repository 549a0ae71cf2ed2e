//! Admit, page and deliver queue elements under flow control.
//!
//! This crate is the admission-control and delivery core of a persistent point-to-point
//! queue. It bounds the memory used by a queue whose backing [store::Store] may hold
//! far more elements than fit in memory, and it applies back-pressure between producers
//! and a single consumer so that nothing in the pipeline buffers without limit.
//!
//! # Components
//!
//! - [limiter::SizeLimiter]: count/size tracking against a high and low watermark.
//! - [flow::Controller]: admission on behalf of a flow (unconditional `add`, checked `offer`)
//!   and resume notifications for sources that were turned away.
//! - [cursored::Queue]: an ordered, store-backed sequence read by independent cursors that
//!   page elements in and out of memory.
//! - [exclusive::Queue]: a single-consumer queue composing one controller, one paging queue
//!   and one cursor behind a single lock, driven by an external dispatcher.
//!
//! # Status
//!
//! `broker-queue` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

use std::{sync::Arc, time::SystemTime};
use thiserror::Error;

pub mod cursored;
pub mod exclusive;
pub mod flow;
pub mod limiter;
pub mod metrics;
pub mod policy;
pub mod store;

/// Errors that can occur when interacting with a queue.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] store::Error),
}

/// The kind of a queue, as recorded in its [Descriptor].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    Shared = 0,
    SharedPriority = 1,
    Partitioned = 2,
    Exclusive = 4,
    ExclusivePriority = 5,
}

impl Kind {
    /// Returns whether queues of this kind have exactly one consumer.
    pub const fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusivePriority)
    }
}

/// Identity of a queue.
///
/// Stores use the descriptor to address the elements of a queue.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Descriptor {
    name: String,
    kind: Kind,
    parent: Option<String>,
    partition: Option<u32>,
}

impl Descriptor {
    /// Create a descriptor for a top-level queue.
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: None,
            partition: None,
        }
    }

    /// Create a descriptor for partition `partition` of the queue named `parent`.
    pub fn partition_of(name: impl Into<String>, kind: Kind, parent: &str, partition: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            parent: Some(parent.to_string()),
            partition: Some(partition),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn kind(&self) -> Kind {
        self.kind
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub const fn partition(&self) -> Option<u32> {
        self.partition
    }
}

/// Computes the size of an element in the units of a [limiter::SizeLimiter].
pub trait Sizer<E>: Send + Sync {
    fn size(&self, element: &E) -> u64;
}

impl<E, F: Fn(&E) -> u64 + Send + Sync> Sizer<E> for F {
    fn size(&self, element: &E) -> u64 {
        self(element)
    }
}

/// Maps an element to the time after which it should no longer be delivered.
pub trait Expiration<E>: Send + Sync {
    fn expiration(&self, element: &E) -> Option<SystemTime>;
}

impl<E, F: Fn(&E) -> Option<SystemTime> + Send + Sync> Expiration<E> for F {
    fn expiration(&self, element: &E) -> Option<SystemTime> {
        self(element)
    }
}

/// Scheduler that polls a queue once it has reported being ready.
pub trait Dispatcher: Send + Sync {
    /// The queue may have work; schedule a call to its polling entry point.
    fn notify_ready(&self);
}

/// Downstream consumer of the elements a queue dispatches.
pub trait Drain<E>: Send + Sync {
    fn drain(&self, delivery: Delivery<E>);
}

impl<E, F: Fn(Delivery<E>) + Send + Sync> Drain<E> for F {
    fn drain(&self, delivery: Delivery<E>) {
        self(delivery)
    }
}

/// Shared handle to a [Dispatcher].
pub type DispatcherRef = Arc<dyn Dispatcher>;

/// An element handed to the consumer, along with the sequence used to acknowledge it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery<E> {
    sequence: u64,
    element: E,
}

impl<E> Delivery<E> {
    pub(crate) const fn new(sequence: u64, element: E) -> Self {
        Self { sequence, element }
    }

    /// Sequence number to pass back when acknowledging this delivery.
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    pub const fn element(&self) -> &E {
        &self.element
    }

    pub fn into_inner(self) -> E {
        self.element
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor() {
        let descriptor = Descriptor::new("orders", Kind::Exclusive);
        assert_eq!(descriptor.name(), "orders");
        assert!(descriptor.kind().is_exclusive());
        assert!(descriptor.parent().is_none());

        let partition = Descriptor::partition_of("orders.3", Kind::Shared, "orders", 3);
        assert_eq!(partition.parent(), Some("orders"));
        assert_eq!(partition.partition(), Some(3));
        assert!(!partition.kind().is_exclusive());
        assert_eq!(Kind::ExclusivePriority as u8, 5);
    }
}
