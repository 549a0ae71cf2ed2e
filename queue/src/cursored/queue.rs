//! Cursored paging queue implementation.

use super::{cursor::Cursor, CursorId, Hooks, QueueElement};
use crate::{
    flow::SourceRef, limiter::SizeLimiter, metrics::Metrics, policy::PersistencePolicy,
    store::Store, Descriptor, Error, Expiration, Sizer,
};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
    time::SystemTime,
};
use tracing::debug;

/// Configuration for [Queue].
pub struct Config<K, E> {
    /// Identity of the queue, used to address its elements in the store.
    pub descriptor: Descriptor,

    /// Whether elements are persisted and how much each cursor holds in memory.
    pub policy: PersistencePolicy,

    /// Storage for persisted and paged-out elements.
    ///
    /// Required if `policy` persists or pages.
    pub store: Option<Box<dyn Store<K, E>>>,

    /// Size of an element in the units of the cursor windows.
    pub sizer: Arc<dyn Sizer<E>>,

    /// Optional expiration time of an element.
    pub expiration: Option<Arc<dyn Expiration<E>>>,
}

/// Bookkeeping for an element handed out and not yet acknowledged.
struct Outstanding<K> {
    key: Option<K>,
    size: u64,
    acquired: bool,
}

/// An ordered, store-backed sequence of elements read through cursors.
pub struct Queue<K, E> {
    descriptor: Descriptor,
    policy: PersistencePolicy,
    store: Option<Box<dyn Store<K, E>>>,
    sizer: Arc<dyn Sizer<E>>,
    expiration: Option<Arc<dyn Expiration<E>>>,
    metrics: Metrics,

    initialized: bool,
    started: bool,

    /// First sequence a newly opened cursor reads from.
    head: u64,
    /// Sequence assigned to the next added element.
    tail: u64,
    /// Elements added (or restored) and not yet acknowledged or expired.
    count: u64,
    size: u64,

    cursors: Vec<Cursor<K, E>>,
    /// Elements added before any cursor was opened, when there is no store to hold them.
    detached: VecDeque<QueueElement<K, E>>,
    outstanding: BTreeMap<u64, Outstanding<K>>,
}

impl<K: Clone, E: Clone> Queue<K, E> {
    /// Create a queue. It must be initialized before use.
    ///
    /// # Panics
    ///
    /// Panics if the policy requires a store and none is configured.
    pub fn new(cfg: Config<K, E>, metrics: Metrics) -> Self {
        assert!(
            cfg.store.is_some() || !cfg.policy.requires_store(),
            "policy {:?} requires a store",
            cfg.policy
        );
        Self {
            descriptor: cfg.descriptor,
            policy: cfg.policy,
            store: cfg.store,
            sizer: cfg.sizer,
            expiration: cfg.expiration,
            metrics,
            initialized: false,
            started: false,
            head: 0,
            tail: 0,
            count: 0,
            size: 0,
            cursors: Vec::new(),
            detached: VecDeque::new(),
            outstanding: BTreeMap::new(),
        }
    }

    /// Restore the queue's position from persisted counters.
    ///
    /// `[sequence_min, sequence_max)` is the range of sequences the store may hold for
    /// this queue, and `count`/`size` describe the elements still in it. New elements
    /// are numbered from `sequence_max`.
    ///
    /// # Panics
    ///
    /// Panics if called twice, if the range is inverted, or if elements are restored
    /// without a store to read them from.
    pub fn initialize(&mut self, sequence_min: u64, sequence_max: u64, count: u64, size: u64) {
        assert!(!self.initialized, "queue already initialized");
        assert!(
            sequence_min <= sequence_max,
            "invalid sequence range [{sequence_min}, {sequence_max})"
        );
        assert!(
            count == 0 || self.store.is_some(),
            "cannot restore elements without a store"
        );
        self.head = sequence_min;
        self.tail = sequence_max;
        self.count = count;
        self.size = size;
        self.initialized = true;
        debug!(
            queue = self.descriptor.name(),
            sequence_min, sequence_max, count, size, "initialized queue"
        );
    }

    fn assert_initialized(&self) {
        assert!(self.initialized, "queue not initialized");
    }

    /// Resume [Hooks::request_dispatch] callbacks.
    pub fn start(&mut self) {
        self.started = true;
    }

    /// Suppress [Hooks::request_dispatch] callbacks. Nothing buffered is dropped.
    pub fn stop(&mut self) {
        self.started = false;
    }

    /// Open a cursor reading from the first element still held by the queue.
    ///
    /// `window`, if given, bounds the size units the cursor keeps resident. Without a store,
    /// a cursor can only see elements added after it was opened (plus any added while no
    /// cursor was open).
    pub fn open_cursor(&mut self, name: &str, window: Option<SizeLimiter>) -> CursorId {
        self.assert_initialized();
        let id = CursorId(self.cursors.len());
        let cursor = if self.store.is_some() {
            Cursor::new(name.to_string(), window, self.head)
        } else {
            let mut cursor = Cursor::new(name.to_string(), window, self.tail);
            for element in self.detached.drain(..) {
                cursor.push(element);
            }
            cursor.loaded = self.tail;
            cursor
        };
        debug!(
            queue = self.descriptor.name(),
            cursor = name,
            position = cursor.loaded,
            "opened cursor"
        );
        self.cursors.push(cursor);
        id
    }

    /// Append `element`, returning its sequence number.
    ///
    /// If the store rejects the element, the queue is left unchanged.
    pub fn add(
        &mut self,
        _source: Option<&SourceRef>,
        element: E,
        hooks: &mut impl Hooks,
    ) -> Result<u64, Error> {
        self.assert_initialized();
        let sequence = self.tail;
        let size = self.sizer.size(&element);
        let expiration = self
            .expiration
            .as_ref()
            .and_then(|mapper| mapper.expiration(&element));

        // Write through if persistent, or if some cursor cannot keep the element resident
        let paged = if self.cursors.is_empty() {
            self.store.is_some()
        } else {
            self.cursors.iter().any(|cursor| !cursor.takes(sequence))
        };
        let key = match self.store.as_mut() {
            Some(store) if self.policy.persistent || paged => {
                Some(store.write(&self.descriptor, sequence, &element)?)
            }
            _ => None,
        };
        if paged {
            self.metrics.paged_out.inc();
            debug!(
                queue = self.descriptor.name(),
                sequence, size, "paged out element"
            );
        }

        self.tail += 1;
        self.count += 1;
        self.size += size;

        let queued = QueueElement {
            sequence,
            size,
            key,
            expiration,
            acquired: false,
            element,
        };
        if self.cursors.is_empty() {
            if self.store.is_none() {
                self.detached.push_back(queued);
            }
            return Ok(sequence);
        }

        let mut wake = false;
        for cursor in self.cursors.iter_mut() {
            if cursor.takes(sequence) {
                cursor.push(queued.clone());
            }
            if cursor.waiting {
                cursor.waiting = false;
                wake = true;
            }
        }
        if wake && self.started {
            hooks.request_dispatch();
        }
        Ok(sequence)
    }

    /// Returns whether the cursor may have an element to deliver.
    ///
    /// Cheap, but may be fooled by gaps in the store or expired elements. Use
    /// [Queue::has_next] for an exact answer.
    pub fn is_ready(&self, cursor: CursorId) -> bool {
        self.cursors[cursor.0].is_ready(self.tail)
    }

    /// Returns whether `cursor` has a deliverable element, paging it in if needed.
    ///
    /// Records missing from the store are skipped and expired elements at the front of
    /// the cursor are deleted and released (through [Hooks::acknowledged]) on the way.
    pub fn has_next(&mut self, cursor: CursorId, hooks: &mut impl Hooks) -> Result<bool, Error> {
        self.assert_initialized();
        let now = SystemTime::now();
        loop {
            if self.cursors[cursor.0].buffer.is_empty() {
                self.page_in(cursor)?;
            }
            let Some(front) = self.cursors[cursor.0].buffer.front() else {
                self.cursors[cursor.0].waiting = true;
                return Ok(false);
            };
            if !front.is_expired(now) {
                return Ok(true);
            }

            if let (Some(store), Some(key)) = (self.store.as_mut(), front.key.as_ref()) {
                store.delete(&self.descriptor, front.sequence, key)?;
            }
            let Some(expired) = self.cursors[cursor.0].pop() else {
                continue;
            };
            self.count = self.count.saturating_sub(1);
            self.size = self.size.saturating_sub(expired.size);
            self.metrics.expired.inc();
            debug!(
                queue = self.descriptor.name(),
                sequence = expired.sequence,
                "dropped expired element"
            );
            hooks.acknowledged(expired.sequence, expired.size);
        }
    }

    /// Advance `cursor` to the next element, paging it in from the store if needed.
    ///
    /// If `acquire` is set, the element's flow capacity is considered still reserved and
    /// will be released through [Hooks::acknowledged] when it is acknowledged. Elements
    /// that expired before delivery are deleted and released instead of returned.
    pub fn get_next(
        &mut self,
        cursor: CursorId,
        acquire: bool,
        hooks: &mut impl Hooks,
    ) -> Result<Option<QueueElement<K, E>>, Error> {
        if !self.has_next(cursor, hooks)? {
            return Ok(None);
        }
        let Some(mut element) = self.cursors[cursor.0].pop() else {
            return Ok(None);
        };
        element.acquired = acquire;
        self.outstanding
            .entry(element.sequence)
            .or_insert_with(|| Outstanding {
                key: element.key.clone(),
                size: element.size,
                acquired: acquire,
            });
        Ok(Some(element))
    }

    /// Read elements for `cursor` back from the store, up to its window.
    fn page_in(&mut self, cursor: CursorId) -> Result<(), Error> {
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        let cursor = &mut self.cursors[cursor.0];
        while cursor.loaded < self.tail && cursor.reads_ahead() {
            let sequence = cursor.loaded;
            let Some((key, element)) = store.read(&self.descriptor, sequence)? else {
                // Acknowledged, expired or never written
                cursor.loaded += 1;
                continue;
            };
            let size = self.sizer.size(&element);
            let expiration = self
                .expiration
                .as_ref()
                .and_then(|mapper| mapper.expiration(&element));
            cursor.push(QueueElement {
                sequence,
                size,
                key: Some(key),
                expiration,
                acquired: false,
                element,
            });
            self.metrics.paged_in.inc();
            debug!(
                queue = self.descriptor.name(),
                cursor = cursor.name.as_str(),
                sequence,
                size,
                "paged in element"
            );
        }
        Ok(())
    }

    /// Delete an outstanding element, releasing its capacity if it was acquired.
    ///
    /// Returns `false` (and does nothing) if `sequence` is not outstanding, for example
    /// because it was already acknowledged.
    pub fn acknowledge(&mut self, sequence: u64, hooks: &mut impl Hooks) -> Result<bool, Error> {
        self.assert_initialized();
        let Some(outstanding) = self.outstanding.get(&sequence) else {
            return Ok(false);
        };
        if let (Some(store), Some(key)) = (self.store.as_mut(), outstanding.key.as_ref()) {
            store.delete(&self.descriptor, sequence, key)?;
        }
        let Some(outstanding) = self.outstanding.remove(&sequence) else {
            return Ok(false);
        };
        self.count = self.count.saturating_sub(1);
        self.size = self.size.saturating_sub(outstanding.size);
        if outstanding.acquired {
            hooks.acknowledged(sequence, outstanding.size);
        }
        Ok(true)
    }

    pub const fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Elements added or restored and not yet acknowledged.
    pub const fn enqueued_count(&self) -> u64 {
        self.count
    }

    /// Size units of the elements counted by [Queue::enqueued_count].
    pub const fn enqueued_size(&self) -> u64 {
        self.size
    }

    /// Elements delivered and not yet acknowledged.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Sequence the next added element will receive.
    pub const fn next_sequence(&self) -> u64 {
        self.tail
    }

    /// Elements `cursor` currently holds in memory.
    pub fn resident(&self, cursor: CursorId) -> usize {
        self.cursors[cursor.0].buffer.len()
    }

    /// Size units `cursor` currently holds in memory.
    pub fn resident_size(&self, cursor: CursorId) -> u64 {
        self.cursors[cursor.0]
            .buffer
            .iter()
            .map(|element| element.size)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::memory::Memory, Kind};
    use bytes::Bytes;
    use commonware_macros::test_traced;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::{num::NonZeroU64, time::Duration};

    #[derive(Default)]
    struct Recorder {
        released: Vec<(u64, u64)>,
        requests: usize,
    }

    impl Hooks for Recorder {
        fn acknowledged(&mut self, sequence: u64, size: u64) {
            self.released.push((sequence, size));
        }

        fn request_dispatch(&mut self) {
            self.requests += 1;
        }
    }

    fn descriptor() -> Descriptor {
        Descriptor::new("test", Kind::Exclusive)
    }

    fn queue(policy: PersistencePolicy, store: Option<Memory<Bytes>>) -> Queue<u64, Bytes> {
        let cfg = Config {
            descriptor: descriptor(),
            policy,
            store: store.map(|store| Box::new(store) as Box<dyn Store<u64, Bytes>>),
            sizer: Arc::new(|element: &Bytes| element.len() as u64),
            expiration: None,
        };
        Queue::new(cfg, Metrics::default())
    }

    fn window(size: u64) -> Option<SizeLimiter> {
        Some(SizeLimiter::new(size, size / 2))
    }

    fn drain(queue: &mut Queue<u64, Bytes>, cursor: CursorId, hooks: &mut Recorder) -> Vec<u64> {
        let mut sequences = Vec::new();
        while let Some(element) = queue.get_next(cursor, true, hooks).unwrap() {
            sequences.push(element.sequence());
        }
        sequences
    }

    #[test_traced]
    fn test_in_memory_order() {
        let mut hooks = Recorder::default();
        let mut queue = queue(PersistencePolicy::memory(), None);
        queue.initialize(0, 0, 0, 0);
        let cursor = queue.open_cursor("reader", None);
        queue.start();

        for i in 0..5u8 {
            let sequence = queue.add(None, Bytes::from(vec![i; 3]), &mut hooks).unwrap();
            assert_eq!(sequence, i as u64);
        }
        assert_eq!(queue.enqueued_count(), 5);
        assert_eq!(queue.enqueued_size(), 15);
        assert!(queue.is_ready(cursor));

        for i in 0..5u8 {
            let element = queue.get_next(cursor, true, &mut hooks).unwrap().unwrap();
            assert_eq!(element.sequence(), i as u64);
            assert_eq!(element.element(), &Bytes::from(vec![i; 3]));
            assert!(element.is_acquired());
            assert!(element.key().is_none());
        }
        assert!(queue.get_next(cursor, true, &mut hooks).unwrap().is_none());
        assert!(!queue.is_ready(cursor));
        assert_eq!(queue.outstanding(), 5);

        // Counters only move on acknowledgement
        assert_eq!(queue.enqueued_count(), 5);
        assert!(queue.acknowledge(0, &mut hooks).unwrap());
        assert_eq!(queue.enqueued_count(), 4);
        assert_eq!(queue.enqueued_size(), 12);
        assert_eq!(hooks.released, vec![(0, 3)]);
    }

    #[test_traced]
    fn test_acknowledge_releases_once() {
        let mut hooks = Recorder::default();
        let store = Memory::default();
        let mut queue = queue(
            PersistencePolicy::persistent(NonZeroU64::new(64).unwrap()),
            Some(store.clone()),
        );
        queue.initialize(0, 0, 0, 0);
        let cursor = queue.open_cursor("reader", window(64));

        queue.add(None, Bytes::from_static(b"a"), &mut hooks).unwrap();
        queue.add(None, Bytes::from_static(b"bb"), &mut hooks).unwrap();
        assert_eq!(store.len(&descriptor()), 2);

        let first = queue.get_next(cursor, true, &mut hooks).unwrap().unwrap();
        let second = queue.get_next(cursor, false, &mut hooks).unwrap().unwrap();
        assert!(!second.is_acquired());

        assert!(queue.acknowledge(first.sequence(), &mut hooks).unwrap());
        assert!(!queue.acknowledge(first.sequence(), &mut hooks).unwrap());
        assert_eq!(hooks.released, vec![(0, 1)]);

        // Not acquired: deleted, but capacity was released by whoever delivered it
        assert!(queue.acknowledge(second.sequence(), &mut hooks).unwrap());
        assert_eq!(hooks.released, vec![(0, 1)]);
        assert!(store.is_empty(&descriptor()));
        assert_eq!(queue.enqueued_count(), 0);

        // Never delivered
        assert!(!queue.acknowledge(42, &mut hooks).unwrap());
    }

    #[test_traced]
    fn test_paging_tiny_window() {
        let mut hooks = Recorder::default();
        let store = Memory::default();
        let mut queue = queue(
            PersistencePolicy::paged(NonZeroU64::new(4).unwrap()),
            Some(store.clone()),
        );
        queue.initialize(0, 0, 0, 0);
        let cursor = queue.open_cursor("reader", window(4));
        queue.start();

        for i in 0..20u8 {
            queue.add(None, Bytes::from(vec![i; 2]), &mut hooks).unwrap();
        }

        // Only the window stays resident, the rest was written out
        assert_eq!(queue.resident(cursor), 2);
        assert_eq!(store.len(&descriptor()), 18);

        let mut delivered = Vec::new();
        while let Some(element) = queue.get_next(cursor, true, &mut hooks).unwrap() {
            assert!(queue.resident_size(cursor) <= 4);
            let expected = Bytes::from(vec![element.sequence() as u8; 2]);
            assert_eq!(element.element(), &expected);
            delivered.push(element.sequence());
            queue.acknowledge(element.sequence(), &mut hooks).unwrap();
        }
        assert_eq!(delivered, (0..20).collect::<Vec<_>>());
        assert!(store.is_empty(&descriptor()));
        assert_eq!(queue.enqueued_count(), 0);
        assert_eq!(hooks.released.len(), 20);
    }

    #[test_traced]
    fn test_paging_interleaved_random() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut hooks = Recorder::default();
        let store = Memory::default();
        let mut queue = queue(
            PersistencePolicy::paged(NonZeroU64::new(16).unwrap()),
            Some(store.clone()),
        );
        queue.initialize(0, 0, 0, 0);
        let cursor = queue.open_cursor("reader", window(16));
        queue.start();

        let mut added = 0u64;
        let mut delivered = Vec::new();
        for _ in 0..500 {
            if rng.gen_bool(0.55) {
                let len = rng.gen_range(1..=8);
                queue
                    .add(None, Bytes::from(vec![added as u8; len]), &mut hooks)
                    .unwrap();
                added += 1;
            } else if let Some(element) = queue.get_next(cursor, true, &mut hooks).unwrap() {
                assert!(queue.resident_size(cursor) <= 16 + 8);
                delivered.push(element.sequence());
                queue.acknowledge(element.sequence(), &mut hooks).unwrap();
            }
        }
        delivered.extend(drain(&mut queue, cursor, &mut hooks));

        assert_eq!(delivered, (0..added).collect::<Vec<_>>());
        assert!(store.writes() > 0);
    }

    #[test_traced]
    fn test_request_dispatch_when_waiting() {
        let mut hooks = Recorder::default();
        let mut queue = queue(PersistencePolicy::memory(), None);
        queue.initialize(0, 0, 0, 0);
        let cursor = queue.open_cursor("reader", None);

        // Cursor has not come up empty yet
        queue.add(None, Bytes::from_static(b"a"), &mut hooks).unwrap();
        assert_eq!(hooks.requests, 0);

        assert!(queue.get_next(cursor, true, &mut hooks).unwrap().is_some());
        assert!(queue.get_next(cursor, true, &mut hooks).unwrap().is_none());

        // Stopped queues stay quiet
        queue.add(None, Bytes::from_static(b"b"), &mut hooks).unwrap();
        assert_eq!(hooks.requests, 0);

        queue.start();
        assert!(queue.get_next(cursor, true, &mut hooks).unwrap().is_some());
        assert!(queue.get_next(cursor, true, &mut hooks).unwrap().is_none());
        queue.add(None, Bytes::from_static(b"c"), &mut hooks).unwrap();
        queue.add(None, Bytes::from_static(b"d"), &mut hooks).unwrap();
        assert_eq!(hooks.requests, 1);
    }

    #[test_traced]
    fn test_restore_from_store() {
        let mut hooks = Recorder::default();
        let store = Memory::default();
        let policy = PersistencePolicy::persistent(NonZeroU64::new(8).unwrap());

        let mut first = queue(policy, Some(store.clone()));
        first.initialize(0, 0, 0, 0);
        let cursor = first.open_cursor("reader", window(8));
        for i in 0..6u8 {
            first.add(None, Bytes::from(vec![i; 2]), &mut hooks).unwrap();
        }
        for _ in 0..2 {
            let element = first.get_next(cursor, true, &mut hooks).unwrap().unwrap();
            first.acknowledge(element.sequence(), &mut hooks).unwrap();
        }
        // Delivered but never acknowledged: must come back after a restart
        first.get_next(cursor, true, &mut hooks).unwrap().unwrap();
        assert_eq!(store.sequences(&descriptor()), vec![2, 3, 4, 5]);

        let mut second = queue(policy, Some(store.clone()));
        second.initialize(0, first.next_sequence(), 4, 8);
        let cursor = second.open_cursor("reader", window(8));
        assert!(second.is_ready(cursor));
        assert_eq!(second.enqueued_count(), 4);

        let sequence = second.add(None, Bytes::from_static(b"zz"), &mut hooks).unwrap();
        assert_eq!(sequence, 6);
        assert_eq!(drain(&mut second, cursor, &mut hooks), vec![2, 3, 4, 5, 6]);
    }

    #[test_traced]
    fn test_expired_elements_dropped() {
        let mut hooks = Recorder::default();
        let store = Memory::default();
        let cfg = Config {
            descriptor: descriptor(),
            policy: PersistencePolicy::persistent(NonZeroU64::new(64).unwrap()),
            store: Some(Box::new(store.clone()) as Box<dyn Store<u64, Bytes>>),
            sizer: Arc::new(|element: &Bytes| element.len() as u64),
            expiration: Some(Arc::new(|element: &Bytes| {
                if element.starts_with(b"old") {
                    Some(SystemTime::UNIX_EPOCH)
                } else {
                    Some(SystemTime::now() + Duration::from_secs(3600))
                }
            })),
        };
        let metrics = Metrics::default();
        let mut queue = Queue::new(cfg, metrics.clone());
        queue.initialize(0, 0, 0, 0);
        let cursor = queue.open_cursor("reader", window(64));

        queue.add(None, Bytes::from_static(b"old-1"), &mut hooks).unwrap();
        queue.add(None, Bytes::from_static(b"new"), &mut hooks).unwrap();
        queue.add(None, Bytes::from_static(b"old-2"), &mut hooks).unwrap();

        let element = queue.get_next(cursor, true, &mut hooks).unwrap().unwrap();
        assert_eq!(element.sequence(), 1);
        assert!(queue.get_next(cursor, true, &mut hooks).unwrap().is_none());

        // Expired elements release their capacity without being delivered
        assert_eq!(hooks.released, vec![(0, 5), (2, 5)]);
        assert_eq!(metrics.expired.get(), 2);
        assert_eq!(queue.enqueued_count(), 1);
        assert_eq!(store.sequences(&descriptor()), vec![1]);
    }

    #[test_traced]
    fn test_store_error_leaves_queue_unchanged() {
        let mut hooks = Recorder::default();
        let store = Memory::default();
        let mut queue = queue(
            PersistencePolicy::persistent(NonZeroU64::new(8).unwrap()),
            Some(store.clone()),
        );
        queue.initialize(0, 0, 0, 0);
        let cursor = queue.open_cursor("reader", window(8));

        store.set_unavailable(true);
        let err = queue
            .add(None, Bytes::from_static(b"a"), &mut hooks)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Store(crate::store::Error::Unavailable(_))
        ));
        assert_eq!(queue.enqueued_count(), 0);
        assert_eq!(queue.next_sequence(), 0);

        store.set_unavailable(false);
        queue.add(None, Bytes::from_static(b"a"), &mut hooks).unwrap();
        let element = queue.get_next(cursor, true, &mut hooks).unwrap().unwrap();

        store.set_unavailable(true);
        assert!(queue.acknowledge(element.sequence(), &mut hooks).is_err());
        assert_eq!(queue.outstanding(), 1);
        assert!(hooks.released.is_empty());

        store.set_unavailable(false);
        assert!(queue.acknowledge(element.sequence(), &mut hooks).unwrap());
        assert_eq!(hooks.released, vec![(0, 1)]);
    }

    #[test_traced]
    fn test_detached_elements_reach_first_cursor() {
        let mut hooks = Recorder::default();
        let mut queue = queue(PersistencePolicy::memory(), None);
        queue.initialize(0, 0, 0, 0);
        queue.add(None, Bytes::from_static(b"a"), &mut hooks).unwrap();
        queue.add(None, Bytes::from_static(b"b"), &mut hooks).unwrap();

        let cursor = queue.open_cursor("late", None);
        queue.add(None, Bytes::from_static(b"c"), &mut hooks).unwrap();
        assert_eq!(drain(&mut queue, cursor, &mut hooks), vec![0, 1, 2]);
    }

    #[test_traced]
    fn test_has_next_skips_gaps_and_expired() {
        let mut hooks = Recorder::default();
        let store = Memory::default();
        let cfg = Config {
            descriptor: descriptor(),
            policy: PersistencePolicy::persistent(NonZeroU64::new(64).unwrap()),
            store: Some(Box::new(store.clone()) as Box<dyn Store<u64, Bytes>>),
            sizer: Arc::new(|element: &Bytes| element.len() as u64),
            expiration: Some(Arc::new(|element: &Bytes| {
                element
                    .starts_with(b"old")
                    .then_some(SystemTime::UNIX_EPOCH)
            })),
        };
        let mut queue = Queue::new(cfg, Metrics::default());

        // Nothing was ever written in the restored range
        queue.initialize(0, 5, 0, 0);
        let cursor = queue.open_cursor("reader", window(64));
        assert!(queue.is_ready(cursor));
        assert!(!queue.has_next(cursor, &mut hooks).unwrap());
        assert!(!queue.is_ready(cursor));

        queue.add(None, Bytes::from_static(b"old"), &mut hooks).unwrap();
        assert!(queue.is_ready(cursor));
        assert!(!queue.has_next(cursor, &mut hooks).unwrap());
        assert_eq!(hooks.released, vec![(5, 3)]);
        assert_eq!(queue.enqueued_count(), 0);
        assert!(store.is_empty(&descriptor()));

        queue.add(None, Bytes::from_static(b"new"), &mut hooks).unwrap();
        assert!(queue.has_next(cursor, &mut hooks).unwrap());
        let element = queue.get_next(cursor, true, &mut hooks).unwrap().unwrap();
        assert_eq!(element.sequence(), 6);
    }

    #[test]
    #[should_panic(expected = "queue already initialized")]
    fn test_initialize_twice() {
        let mut queue = queue(PersistencePolicy::memory(), None);
        queue.initialize(0, 0, 0, 0);
        queue.initialize(0, 0, 0, 0);
    }

    #[test]
    #[should_panic(expected = "requires a store")]
    fn test_paging_requires_store() {
        queue(PersistencePolicy::paged(NonZeroU64::new(8).unwrap()), None);
    }
}
