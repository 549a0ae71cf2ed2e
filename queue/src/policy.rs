//! Persistence and paging configuration for a queue.

use std::num::NonZeroU64;

/// Decides which elements reach the store and how many stay resident.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PersistencePolicy {
    /// Write every element to the store when it is added.
    ///
    /// When unset, only elements evicted from a cursor's memory window are written.
    pub persistent: bool,

    /// Size units each cursor may hold resident ahead of the consumer.
    ///
    /// `None` disables paging: every element stays in memory until delivered.
    pub paging: Option<NonZeroU64>,
}

impl PersistencePolicy {
    /// Keep everything in memory and never touch a store.
    pub const fn memory() -> Self {
        Self {
            persistent: false,
            paging: None,
        }
    }

    /// Persist every element and bound residency to `window` units per cursor.
    pub const fn persistent(window: NonZeroU64) -> Self {
        Self {
            persistent: true,
            paging: Some(window),
        }
    }

    /// Page elements out of memory past `window` units without persisting the rest.
    pub const fn paged(window: NonZeroU64) -> Self {
        Self {
            persistent: false,
            paging: Some(window),
        }
    }

    pub const fn is_paging_enabled(&self) -> bool {
        self.paging.is_some()
    }

    /// The in-memory window, or zero if paging is disabled.
    pub const fn paging_in_memory_size(&self) -> u64 {
        match self.paging {
            Some(window) => window.get(),
            None => 0,
        }
    }

    /// Returns whether queues using this policy need a store.
    pub const fn requires_store(&self) -> bool {
        self.persistent || self.paging.is_some()
    }
}
