//! Admission control for a flow of elements into a sink.
//!
//! A [Controller] wraps a [SizeLimiter] on behalf of a logical [Flow]. Producers either
//! [Controller::add] (admit unconditionally, for callers that reserved capacity out of
//! band) or [Controller::offer] (admit only while the limiter is open). A producer turned
//! away by `offer` is remembered and handed back by [Controller::element_dispatched]
//! once released capacity crosses the low watermark, so that it can be told to retry.
//!
//! The controller never calls a [Source] itself. Resumed sources are returned to the
//! caller, which notifies them after dropping whatever lock protects the controller.

use crate::{limiter::SizeLimiter, Sizer};
use std::{fmt, sync::Arc};
use tracing::debug;

/// A logical admission channel between a source and a sink.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Flow {
    name: String,
    dynamic: bool,
}

impl Flow {
    pub fn new(name: impl Into<String>, dynamic: bool) -> Self {
        Self {
            name: name.into(),
            dynamic,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the flow was created on demand (rather than configured).
    pub const fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}

/// A producer that can be told when a flow it was rejected from reopens.
pub trait Source: Send + Sync {
    fn resume(&self, flow: &Flow);
}

/// Shared handle to a [Source].
pub type SourceRef = Arc<dyn Source>;

/// Gates admission of elements into a flow.
pub struct Controller<E> {
    flow: Flow,
    limiter: SizeLimiter,
    sizer: Arc<dyn Sizer<E>>,
    waiting: Vec<SourceRef>,
}

impl<E> Controller<E> {
    pub fn new(flow: Flow, limiter: SizeLimiter, sizer: Arc<dyn Sizer<E>>) -> Self {
        Self {
            flow,
            limiter,
            sizer,
            waiting: Vec::new(),
        }
    }

    /// Admit `element` regardless of available capacity.
    ///
    /// Returns the size reserved for the element.
    pub fn add(&mut self, element: &E, _source: Option<&SourceRef>) -> u64 {
        let size = self.sizer.size(element);
        self.reserve(size);
        size
    }

    /// Admit `element` only if the flow is not blocked.
    ///
    /// On rejection nothing is reserved; `source`, if given, is remembered and returned
    /// by [Controller::element_dispatched] once capacity reopens.
    pub fn offer(&mut self, element: &E, source: Option<&SourceRef>) -> bool {
        if !self.admits(source) {
            return false;
        }
        self.add(element, source);
        true
    }

    /// Check whether an offer would be admitted, without reserving anything.
    ///
    /// If not, `source` is remembered exactly as for a rejected [Controller::offer].
    /// Callers that must complete other work before reserving (so that a failure leaves
    /// the flow untouched) pair this with [Controller::reserve].
    pub fn admits(&mut self, source: Option<&SourceRef>) -> bool {
        if !self.limiter.is_blocked() {
            return true;
        }
        if let Some(source) = source {
            if !self.waiting.iter().any(|waiting| Arc::ptr_eq(waiting, source)) {
                self.waiting.push(source.clone());
            }
        }
        debug!(flow = self.flow.name(), "rejected offer");
        false
    }

    /// Reserve `size` units for an element admitted by the caller.
    pub fn reserve(&mut self, size: u64) {
        self.limiter.reserve(size);
    }

    /// Release `size` units reserved by an element that has left the flow.
    ///
    /// Returns the sources to resume if the release reopened the flow.
    #[must_use]
    pub fn element_dispatched(&mut self, size: u64) -> Vec<SourceRef> {
        if !self.limiter.release(size) {
            return Vec::new();
        }
        debug!(
            flow = self.flow.name(),
            waiting = self.waiting.len(),
            "flow reopened"
        );
        std::mem::take(&mut self.waiting)
    }

    /// Seed capacity already consumed by elements restored from storage.
    pub fn restore(&mut self, count: u64, size: u64) {
        self.limiter.add(count, size);
    }

    /// Size of `element` in limiter units.
    pub fn size_of(&self, element: &E) -> u64 {
        self.sizer.size(element)
    }

    /// Shared handle to the sizer, for components that size the same elements.
    pub fn sizer(&self) -> Arc<dyn Sizer<E>> {
        self.sizer.clone()
    }

    pub fn is_blocked(&self) -> bool {
        self.limiter.is_blocked()
    }

    pub const fn limiter(&self) -> &SizeLimiter {
        &self.limiter
    }

    pub const fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Number of sources waiting for the flow to reopen.
    pub fn waiting(&self) -> usize {
        self.waiting.len()
    }
}

impl<E> fmt::Debug for Controller<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("flow", &self.flow)
            .field("limiter", &self.limiter)
            .field("waiting", &self.waiting.len())
            .finish()
    }
}
