//! Durable, sequence-addressed storage for queue elements.
//!
//! The queue never assumes anything about how a [Store] keeps elements. It writes an
//! element at a sequence number and gets back a key `K` that it hands back, untouched,
//! when the element is deleted. Reads are addressed by sequence alone so that elements
//! restored after a restart can be paged in without knowing their keys in advance.
//!
//! Errors are returned as-is to the caller of the queue operation that triggered them.
//! The queue performs no retries.

use crate::Descriptor;
use thiserror::Error;

pub mod memory;

/// Errors that can occur when interacting with a [Store].
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("element corrupt at sequence {0}")]
    Corrupt(u64),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage backing a paged queue.
pub trait Store<K, E>: Send {
    /// Durably record `element` at `sequence`, returning the key it is stored under.
    fn write(&mut self, queue: &Descriptor, sequence: u64, element: &E) -> Result<K, Error>;

    /// Read the element stored at `sequence`, if any.
    fn read(&mut self, queue: &Descriptor, sequence: u64) -> Result<Option<(K, E)>, Error>;

    /// Delete the element stored at `sequence` under `key`.
    fn delete(&mut self, queue: &Descriptor, sequence: u64, key: &K) -> Result<(), Error>;
}
