//! Watermark-based capacity tracking.
//!
//! A [SizeLimiter] counts the elements and size units currently admitted into some
//! resource (a flow, a cursor's memory window) and reports whether further admission
//! should be refused. It applies hysteresis between two watermarks:
//!
//! - the limiter becomes blocked once `size >= capacity` (the high watermark);
//! - a blocked limiter only opens again once `size < resume` (the low watermark).
//!
//! The limiter holds no lock of its own. It is always mutated by the owner of the
//! resource it guards, under that owner's lock.

use tracing::warn;

/// Tracks count and size against a pair of watermarks.
#[derive(Clone, Debug)]
pub struct SizeLimiter {
    capacity: u64,
    resume: u64,
    count: u64,
    size: u64,
    blocked: bool,
}

impl SizeLimiter {
    /// Create a limiter that blocks at `capacity` and reopens below `resume`.
    ///
    /// # Panics
    ///
    /// - `capacity` is zero
    /// - `resume` is zero (a blocked limiter could never reopen)
    /// - `resume` is greater than `capacity`
    pub fn new(capacity: u64, resume: u64) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        assert!(resume > 0, "resume must be positive");
        assert!(
            resume <= capacity,
            "resume ({resume}) must be <= capacity ({capacity})"
        );
        Self {
            capacity,
            resume,
            count: 0,
            size: 0,
            blocked: false,
        }
    }

    /// Increase usage by `count` elements totalling `size` units.
    ///
    /// Used to seed state restored from storage, so no admission check is applied.
    pub fn add(&mut self, count: u64, size: u64) {
        self.count += count;
        self.size += size;
        if self.size >= self.capacity {
            self.blocked = true;
        }
    }

    /// Account for one admitted element of `size` units.
    pub fn reserve(&mut self, size: u64) {
        self.add(1, size);
    }

    /// Account for one element of `size` units leaving the resource.
    ///
    /// Returns `true` if this release reopened a blocked limiter.
    pub fn release(&mut self, size: u64) -> bool {
        self.remove(1, size)
    }

    /// Decrease usage by `count` elements totalling `size` units.
    ///
    /// Returns `true` if this removal reopened a blocked limiter.
    pub fn remove(&mut self, count: u64, size: u64) -> bool {
        if count > self.count || size > self.size {
            warn!(
                count,
                size,
                tracked_count = self.count,
                tracked_size = self.size,
                "released more than was reserved"
            );
        }
        self.count = self.count.saturating_sub(count);
        self.size = self.size.saturating_sub(size);
        if self.blocked && self.size < self.resume {
            self.blocked = false;
            return true;
        }
        false
    }

    /// Returns whether new admissions should be refused.
    pub const fn is_blocked(&self) -> bool {
        self.blocked
    }

    /// Number of elements currently accounted for.
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Size units currently accounted for.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// The high watermark.
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    /// The low watermark.
    pub const fn resume(&self) -> u64 {
        self.resume
    }
}
