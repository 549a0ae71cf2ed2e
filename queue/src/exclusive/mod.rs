//! A single-consumer, flow-controlled queue with paging.
//!
//! [Queue] composes one [Controller](crate::flow::Controller) (producer admission), one
//! [cursored::Queue](crate::cursored::Queue) and exactly one cursor. Because there is a
//! single consumer, elements are delivered strictly in the order they were admitted.
//!
//! # Lifecycle
//!
//! ```text
//!  Uninitialized ──initialize──▶ Stopped ◀──start/stop──▶ Started
//! ```
//!
//! Persistence policy, store and expiration mapper are set while uninitialized.
//! [Queue::initialize] restores counters persisted by a previous instance and opens the
//! cursor. Calling it twice, or calling any mutating operation before it, panics.
//! [Queue::start] and [Queue::stop] only control whether the queue reports readiness and
//! hands out elements; nothing buffered is lost across a stop.
//!
//! # Dispatch
//!
//! The queue never spawns work of its own. When it may have something to deliver it calls
//! [Dispatcher::notify_ready](crate::Dispatcher::notify_ready), and the dispatcher later
//! calls [Queue::polling_dispatch], which hands one element to the connected
//! [Drain](crate::Drain). The consumer acknowledges each [Delivery](crate::Delivery) with
//! [Queue::acknowledge].
//!
//! # Capacity
//!
//! Admitted elements reserve capacity in the queue's flow. With `auto_release` set, that
//! capacity is given back as soon as the element is delivered; otherwise it is held until
//! the element is acknowledged. Producers rejected by [Queue::offer] are told to retry
//! through [Source::resume](crate::flow::Source::resume) once capacity drops below the
//! low watermark.
//!
//! # Concurrency
//!
//! Every operation runs under one lock per queue. Nothing blocks waiting for capacity or
//! elements. Notifications to dispatchers and sources are made after the lock is
//! released, so they may call straight back into the queue.
//!
//! # Example
//!
//! ```rust
//! use broker_queue::{exclusive::{Config, Queue}, Delivery};
//! use prometheus_client::registry::Registry;
//! use std::{num::NonZeroU64, sync::Arc};
//!
//! let mut registry = Registry::default();
//! let queue = Queue::<u64, Vec<u8>>::new(
//!     Config {
//!         name: "orders".to_string(),
//!         capacity: NonZeroU64::new(1024).unwrap(),
//!         resume: NonZeroU64::new(512).unwrap(),
//!         auto_release: false,
//!     },
//!     Arc::new(|element: &Vec<u8>| element.len() as u64),
//!     &mut registry,
//! );
//! queue.initialize(0, 0, 0, 0);
//! queue.start();
//!
//! assert!(queue.offer(b"hello".to_vec(), None).unwrap());
//! let delivery: Delivery<Vec<u8>> = queue.poll().unwrap().unwrap();
//! assert_eq!(delivery.element(), b"hello");
//! assert!(queue.acknowledge(delivery.sequence()).unwrap());
//! assert_eq!(queue.enqueued_count(), 0);
//! ```

mod queue;

pub use queue::Queue;

use std::num::NonZeroU64;

/// Configuration for [Queue].
#[derive(Clone, Debug)]
pub struct Config {
    /// Name of the queue (and of its flow).
    pub name: String,

    /// Size units at which producers are refused (the high watermark).
    pub capacity: NonZeroU64,

    /// Size units below which refused producers are resumed (the low watermark).
    ///
    /// Must not exceed `capacity`.
    pub resume: NonZeroU64,

    /// Release an element's capacity when it is delivered instead of when it is
    /// acknowledged.
    pub auto_release: bool,
}
