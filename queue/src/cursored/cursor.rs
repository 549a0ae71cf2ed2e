use super::QueueElement;
use crate::limiter::SizeLimiter;
use std::collections::VecDeque;

/// Handle to a cursor opened on a [super::Queue].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CursorId(pub(super) usize);

/// Read position and resident window of one cursor.
///
/// Invariant: `buffer` holds the live elements in `[next, loaded)` in ascending sequence
/// order; everything in `[loaded, tail)` is only available from the store.
pub(super) struct Cursor<K, E> {
    pub(super) name: String,
    pub(super) window: Option<SizeLimiter>,
    pub(super) buffer: VecDeque<QueueElement<K, E>>,
    pub(super) loaded: u64,
    pub(super) waiting: bool,
}

impl<K, E> Cursor<K, E> {
    pub(super) fn new(name: String, window: Option<SizeLimiter>, loaded: u64) -> Self {
        Self {
            name,
            window,
            buffer: VecDeque::new(),
            loaded,
            waiting: false,
        }
    }

    /// Whether the window has room for more resident elements.
    pub(super) fn admits(&self) -> bool {
        self.window.as_ref().map_or(true, |window| !window.is_blocked())
    }

    /// Whether the next add would stay resident for this cursor.
    pub(super) fn takes(&self, sequence: u64) -> bool {
        self.loaded == sequence && self.admits()
    }

    /// Whether the window should keep reading ahead from the store.
    pub(super) fn reads_ahead(&self) -> bool {
        self.buffer.is_empty() || (self.window.is_some() && self.admits())
    }

    pub(super) fn is_ready(&self, tail: u64) -> bool {
        !self.buffer.is_empty() || self.loaded < tail
    }

    pub(super) fn push(&mut self, element: QueueElement<K, E>) {
        if let Some(window) = self.window.as_mut() {
            window.reserve(element.size);
        }
        self.loaded = element.sequence + 1;
        self.buffer.push_back(element);
    }

    pub(super) fn pop(&mut self) -> Option<QueueElement<K, E>> {
        let element = self.buffer.pop_front()?;
        if let Some(window) = self.window.as_mut() {
            window.release(element.size);
        }
        Some(element)
    }
}
