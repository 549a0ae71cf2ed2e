use super::Config;
use crate::{
    cursored::{self, CursorId, Hooks},
    flow::{Controller, Flow, SourceRef},
    limiter::SizeLimiter,
    metrics::Metrics,
    policy::PersistencePolicy,
    store::Store,
    Delivery, Descriptor, DispatcherRef, Drain, Error, Expiration, Kind, Sizer,
};
use prometheus_client::registry::Registry;
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, warn};

/// Settings collected before [Queue::initialize].
struct Pending<K, E> {
    policy: PersistencePolicy,
    store: Option<Box<dyn Store<K, E>>>,
    expiration: Option<Arc<dyn Expiration<E>>>,
}

impl<K, E> Default for Pending<K, E> {
    fn default() -> Self {
        Self {
            policy: PersistencePolicy::default(),
            store: None,
            expiration: None,
        }
    }
}

enum State<K, E> {
    Uninitialized(Pending<K, E>),
    Initialized {
        paging: cursored::Queue<K, E>,
        cursor: CursorId,
    },
}

impl<K, E> State<K, E> {
    fn pending(&mut self) -> &mut Pending<K, E> {
        match self {
            Self::Uninitialized(pending) => pending,
            Self::Initialized { .. } => panic!("queue already initialized"),
        }
    }

    fn initialized(&mut self) -> (&mut cursored::Queue<K, E>, CursorId) {
        match self {
            Self::Initialized { paging, cursor } => (paging, *cursor),
            Self::Uninitialized(_) => panic!("queue not initialized"),
        }
    }
}

struct Inner<K, E> {
    controller: Controller<E>,
    state: State<K, E>,
    drain: Option<Arc<dyn Drain<E>>>,
    dispatcher: Option<DispatcherRef>,
    started: bool,
    auto_release: bool,
    metrics: Metrics,
}

/// Notifications collected under the lock and delivered after it is released.
#[derive(Default)]
struct Effects {
    ready: bool,
    resumed: Vec<SourceRef>,
}

impl Effects {
    fn fire(self, flow: &Flow, dispatcher: Option<DispatcherRef>) {
        for source in self.resumed {
            source.resume(flow);
        }
        if self.ready {
            if let Some(dispatcher) = dispatcher {
                dispatcher.notify_ready();
            }
        }
    }
}

/// Releases flow capacity on behalf of the paging queue.
struct Release<'a, E> {
    controller: &'a mut Controller<E>,
    effects: &'a mut Effects,
}

impl<E> Hooks for Release<'_, E> {
    fn acknowledged(&mut self, _sequence: u64, size: u64) {
        let resumed = self.controller.element_dispatched(size);
        self.effects.resumed.extend(resumed);
    }

    fn request_dispatch(&mut self) {
        self.effects.ready = true;
    }
}

/// A single-consumer, flow-controlled queue with paging.
pub struct Queue<K, E> {
    descriptor: Descriptor,
    flow: Flow,
    inner: Mutex<Inner<K, E>>,
}

impl<K: Clone + Send, E: Clone + Send> Queue<K, E> {
    /// Create an uninitialized queue whose elements are sized by `sizer`.
    ///
    /// Metrics are registered with `registry`.
    ///
    /// # Panics
    ///
    /// Panics if `cfg.resume` exceeds `cfg.capacity`.
    pub fn new(cfg: Config, sizer: Arc<dyn Sizer<E>>, registry: &mut Registry) -> Self {
        let descriptor = Descriptor::new(cfg.name.clone(), Kind::Exclusive);
        let flow = Flow::new(cfg.name, false);
        let limiter = SizeLimiter::new(cfg.capacity.get(), cfg.resume.get());
        let controller = Controller::new(flow.clone(), limiter, sizer);
        Self {
            descriptor,
            flow,
            inner: Mutex::new(Inner {
                controller,
                state: State::Uninitialized(Pending::default()),
                drain: None,
                dispatcher: None,
                started: false,
                auto_release: cfg.auto_release,
                metrics: Metrics::init(registry),
            }),
        }
    }

    /// Sizers and expiration mappers run under this lock, but always before any state
    /// changes, so a lock poisoned by one of them is recovered.
    fn lock(&self) -> MutexGuard<'_, Inner<K, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the persistence policy. Must be called before [Queue::initialize].
    pub fn set_persistence_policy(&self, policy: PersistencePolicy) {
        self.lock().state.pending().policy = policy;
    }

    /// Set the store elements are persisted and paged to. Must be called before
    /// [Queue::initialize].
    pub fn set_store(&self, store: Box<dyn Store<K, E>>) {
        self.lock().state.pending().store = Some(store);
    }

    /// Set the mapper used to age out elements. Must be called before [Queue::initialize].
    pub fn set_expiration_mapper(&self, expiration: Arc<dyn Expiration<E>>) {
        self.lock().state.pending().expiration = Some(expiration);
    }

    /// Set the dispatcher told when the queue becomes ready.
    pub fn set_dispatcher(&self, dispatcher: DispatcherRef) {
        self.lock().dispatcher = Some(dispatcher);
    }

    /// Connect the consumer that [Queue::polling_dispatch] delivers to.
    pub fn connect(&self, drain: Arc<dyn Drain<E>>) {
        self.lock().drain = Some(drain);
    }

    /// Restore persisted counters and open the queue's cursor.
    ///
    /// `[sequence_min, sequence_max)` is the range of sequences the store may hold for this
    /// queue and `count`/`size` describe the elements still stored. A new queue passes zeros.
    ///
    /// # Panics
    ///
    /// Panics if the queue is already initialized, or if the configured policy requires a
    /// store and none was set.
    pub fn initialize(&self, sequence_min: u64, sequence_max: u64, count: u32, size: u64) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let pending = std::mem::take(inner.state.pending());

        if count > 0 {
            inner.controller.restore(count as u64, size);
        }

        let window = pending
            .policy
            .paging
            .map(|window| SizeLimiter::new(window.get(), (window.get() / 2).max(1)));
        let mut paging = cursored::Queue::new(
            cursored::Config {
                descriptor: self.descriptor.clone(),
                policy: pending.policy,
                store: pending.store,
                sizer: inner.controller.sizer(),
                expiration: pending.expiration,
            },
            inner.metrics.clone(),
        );
        paging.initialize(sequence_min, sequence_max, count as u64, size);
        let cursor = paging.open_cursor(self.descriptor.name(), window);

        inner.state = State::Initialized { paging, cursor };
        Self::update_gauges(inner);
        debug!(
            queue = self.descriptor.name(),
            sequence_min, sequence_max, count, size, "initialized exclusive queue"
        );
    }

    /// Admit `element` regardless of available capacity.
    ///
    /// For callers that already reserved capacity, or that deliberately bypass
    /// back-pressure.
    pub fn add(&self, element: E, source: Option<SourceRef>) -> Result<(), Error> {
        self.accept(element, source, false).map(|_| ())
    }

    /// Admit `element` if the queue's flow is not blocked.
    ///
    /// Returns `Ok(false)` and changes nothing if it is. `source`, if given, is resumed once
    /// capacity reopens.
    pub fn offer(&self, element: E, source: Option<SourceRef>) -> Result<bool, Error> {
        self.accept(element, source, true)
    }

    fn accept(&self, element: E, source: Option<SourceRef>, checked: bool) -> Result<bool, Error> {
        let mut effects = Effects::default();
        let mut guard = self.lock();
        let inner = &mut *guard;
        let (paging, _) = inner.state.initialized();

        if checked && !inner.controller.admits(source.as_ref()) {
            inner.metrics.rejected.inc();
            return Ok(false);
        }

        // Append first so that a failing store leaves the flow untouched
        let size = inner.controller.size_of(&element);
        let mut release = Release {
            controller: &mut inner.controller,
            effects: &mut effects,
        };
        let sequence = paging.add(source.as_ref(), element, &mut release)?;
        inner.controller.reserve(size);
        inner.metrics.accepted.inc();
        Self::update_gauges(inner);
        debug!(queue = self.descriptor.name(), sequence, size, "accepted element");

        if inner.started {
            effects.ready = true;
        }
        let dispatcher = inner.dispatcher.clone();
        drop(guard);
        effects.fire(&self.flow, dispatcher);
        Ok(true)
    }

    /// Resume reporting readiness and delivering elements.
    ///
    /// # Panics
    ///
    /// Panics if the queue is not initialized.
    pub fn start(&self) {
        let mut effects = Effects::default();
        let mut guard = self.lock();
        let inner = &mut *guard;
        let (paging, _) = inner.state.initialized();
        if inner.started {
            return;
        }
        inner.started = true;
        paging.start();
        if self.has_next(inner, &mut effects) {
            effects.ready = true;
        }
        debug!(queue = self.descriptor.name(), "started");

        let dispatcher = inner.dispatcher.clone();
        drop(guard);
        effects.fire(&self.flow, dispatcher);
    }

    /// Stop reporting readiness and delivering elements. Nothing buffered is lost.
    ///
    /// # Panics
    ///
    /// Panics if the queue is not initialized.
    pub fn stop(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let (paging, _) = inner.state.initialized();
        if !inner.started {
            return;
        }
        inner.started = false;
        paging.stop();
        debug!(queue = self.descriptor.name(), "stopped");
    }

    /// Returns whether the queue is started and its cursor has an element to deliver.
    ///
    /// Expired elements in front of the cursor are dropped (and their capacity released)
    /// while answering.
    pub fn is_dispatch_ready(&self) -> bool {
        let mut effects = Effects::default();
        let mut guard = self.lock();
        let inner = &mut *guard;
        let ready = inner.started
            && matches!(inner.state, State::Initialized { .. })
            && self.has_next(inner, &mut effects);

        let dispatcher = inner.dispatcher.clone();
        drop(guard);
        effects.fire(&self.flow, dispatcher);
        ready
    }

    /// Skip gaps and expired elements until the cursor has something to deliver.
    ///
    /// A store error counts as ready, so that the following poll reports it.
    fn has_next(&self, inner: &mut Inner<K, E>, effects: &mut Effects) -> bool {
        let (paging, cursor) = inner.state.initialized();
        let mut release = Release {
            controller: &mut inner.controller,
            effects,
        };
        let ready = match paging.has_next(cursor, &mut release) {
            Ok(ready) => ready,
            Err(err) => {
                warn!(queue = self.descriptor.name(), ?err, "failed to check readiness");
                true
            }
        };
        Self::update_gauges(inner);
        ready
    }

    /// Take the next element, if the queue is started and has one.
    ///
    /// In `auto_release` mode the element's capacity is released here; otherwise it is
    /// released by [Queue::acknowledge].
    ///
    /// # Panics
    ///
    /// Panics if the queue is not initialized.
    pub fn poll(&self) -> Result<Option<Delivery<E>>, Error> {
        let mut effects = Effects::default();
        let mut guard = self.lock();
        let result = Self::poll_locked(&mut guard, &mut effects);
        let dispatcher = guard.dispatcher.clone();
        drop(guard);
        effects.fire(&self.flow, dispatcher);
        result
    }

    fn poll_locked(
        inner: &mut Inner<K, E>,
        effects: &mut Effects,
    ) -> Result<Option<Delivery<E>>, Error> {
        let (paging, cursor) = inner.state.initialized();
        if !inner.started {
            return Ok(None);
        }

        let mut release = Release {
            controller: &mut inner.controller,
            effects: &mut *effects,
        };
        let next = paging.get_next(cursor, !inner.auto_release, &mut release);
        let element = match next {
            Ok(Some(element)) => element,
            Ok(None) => {
                Self::update_gauges(inner);
                return Ok(None);
            }
            Err(err) => {
                Self::update_gauges(inner);
                return Err(err);
            }
        };

        // Released at delivery rather than acknowledgement, so the flow can take new
        // elements before the consumer confirms this one.
        if inner.auto_release {
            let resumed = inner.controller.element_dispatched(element.size());
            effects.resumed.extend(resumed);
        }
        inner.metrics.dispatched.inc();
        Self::update_gauges(inner);
        Ok(Some(Delivery::new(element.sequence(), element.into_element())))
    }

    /// Deliver one element to the connected drain.
    ///
    /// Returns whether an element was delivered, which tells the dispatcher whether to
    /// poll again.
    pub fn polling_dispatch(&self) -> Result<bool, Error> {
        let Some(drain) = self.lock().drain.clone() else {
            return Ok(false);
        };
        let Some(delivery) = self.poll()? else {
            return Ok(false);
        };
        drain.drain(delivery);
        Ok(true)
    }

    /// Acknowledge the delivery with `sequence`, deleting it from the store.
    ///
    /// Returns `false` if the sequence is not outstanding (for example, because it was
    /// already acknowledged).
    ///
    /// # Panics
    ///
    /// Panics if the queue is not initialized.
    pub fn acknowledge(&self, sequence: u64) -> Result<bool, Error> {
        let mut effects = Effects::default();
        let mut guard = self.lock();
        let inner = &mut *guard;
        let (paging, _) = inner.state.initialized();

        let mut release = Release {
            controller: &mut inner.controller,
            effects: &mut effects,
        };
        let acknowledged = paging.acknowledge(sequence, &mut release)?;
        if acknowledged {
            inner.metrics.acknowledged.inc();
            Self::update_gauges(inner);
        }

        let dispatcher = inner.dispatcher.clone();
        drop(guard);
        effects.fire(&self.flow, dispatcher);
        Ok(acknowledged)
    }

    fn update_gauges(inner: &mut Inner<K, E>) {
        let size = inner.controller.limiter().size();
        let (paging, _) = inner.state.initialized();
        inner.metrics.enqueued_count.set(paging.enqueued_count() as i64);
        inner.metrics.enqueued_size.set(size as i64);
    }

    pub const fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.lock().state, State::Initialized { .. })
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    /// Elements enqueued and not yet acknowledged, or -1 if not initialized.
    pub fn enqueued_count(&self) -> i64 {
        match &self.lock().state {
            State::Initialized { paging, .. } => paging.enqueued_count() as i64,
            State::Uninitialized(_) => -1,
        }
    }

    /// Size units reserved against the queue's flow, or -1 if not initialized.
    pub fn enqueued_size(&self) -> i64 {
        let guard = self.lock();
        match &guard.state {
            State::Initialized { .. } => guard.controller.limiter().size() as i64,
            State::Uninitialized(_) => -1,
        }
    }

    /// Returns whether producers are currently refused.
    pub fn is_blocked(&self) -> bool {
        self.lock().controller.is_blocked()
    }
}

impl<K, E> fmt::Display for Queue<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExclusiveQueue:{}", self.descriptor.name())
    }
}
