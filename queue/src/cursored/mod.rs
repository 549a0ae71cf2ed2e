//! An ordered, store-backed sequence of elements read through cursors.
//!
//! [Queue] assigns every added element the next sequence number. Elements are read by
//! cursors ([Queue::open_cursor]), each of which keeps its own position and an optional
//! memory window (a [SizeLimiter](crate::limiter::SizeLimiter)) bounding how many size
//! units it holds resident ahead of its consumer.
//!
//! # Paging
//!
//! An added element stays in memory for every cursor that has read up to the tail and
//! whose window is open. If any cursor cannot hold it (or the policy is persistent) it is
//! written to the [Store](crate::store::Store). A cursor that fell behind the tail reads
//! elements back from the store in sequence order, filling its window ahead of the
//! consumer. Memory use is therefore bounded by the windows regardless of how many
//! elements the store holds.
//!
//! ```text
//!            buffer (resident)        store only
//!   cursor: [ s5 s6 s7 ]  ───────▶ [ s8 s9 ... tail )
//!             ▲ next      loaded ─┘
//! ```
//!
//! # Acknowledgement
//!
//! An element handed out by [Queue::get_next] stays outstanding until [Queue::acknowledge]
//! deletes it from the store. If the element was delivered as `acquired` (its flow
//! capacity still reserved), acknowledging it calls [Hooks::acknowledged] so the owner can
//! release that capacity. Each element is released at most once: a repeated acknowledge is
//! ignored, and elements that expire before delivery are released when they are dropped.

mod cursor;
mod queue;

pub use cursor::CursorId;
pub use queue::{Config, Queue};

use std::time::SystemTime;

/// Callbacks a [Queue] makes into its owner.
pub trait Hooks {
    /// An element whose flow capacity is still reserved has left the queue.
    fn acknowledged(&mut self, sequence: u64, size: u64);

    /// New data is available for a cursor that previously found nothing to read.
    fn request_dispatch(&mut self);
}

/// An element along with its position and bookkeeping in a [Queue].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueElement<K, E> {
    sequence: u64,
    size: u64,
    key: Option<K>,
    expiration: Option<SystemTime>,
    acquired: bool,
    element: E,
}

impl<K, E> QueueElement<K, E> {
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Key of the element in the store, if it was written there.
    pub const fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub const fn expiration(&self) -> Option<SystemTime> {
        self.expiration
    }

    /// Whether the element was delivered with its flow capacity still reserved.
    pub const fn is_acquired(&self) -> bool {
        self.acquired
    }

    pub const fn element(&self) -> &E {
        &self.element
    }

    pub fn into_element(self) -> E {
        self.element
    }

    fn is_expired(&self, now: SystemTime) -> bool {
        self.expiration.is_some_and(|expiration| expiration <= now)
    }
}
