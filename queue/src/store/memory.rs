//! An in-memory [Store](super::Store).
//!
//! Elements are kept per queue name in ordered maps behind a shared lock, so clones of a
//! [Memory] store observe the same contents (letting a test "restart" a queue against the
//! store an earlier instance wrote to). The store can be marked unavailable to exercise
//! error propagation.

use super::Error;
use crate::Descriptor;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

struct State<E> {
    queues: HashMap<String, BTreeMap<u64, (u64, E)>>,
    next_key: u64,
    unavailable: bool,
    writes: u64,
    reads: u64,
    deletes: u64,
}

/// Shared in-memory element store keyed by `u64` record ids.
pub struct Memory<E> {
    state: Arc<Mutex<State<E>>>,
}

impl<E> Clone for Memory<E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<E> Default for Memory<E> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                queues: HashMap::new(),
                next_key: 0,
                unavailable: false,
                writes: 0,
                reads: 0,
                deletes: 0,
            })),
        }
    }
}

impl<E> Memory<E> {
    fn state(&self) -> MutexGuard<'_, State<E>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Number of elements currently stored for `queue`.
    pub fn len(&self, queue: &Descriptor) -> usize {
        self.state()
            .queues
            .get(queue.name())
            .map_or(0, BTreeMap::len)
    }

    /// Returns whether nothing is stored for `queue`.
    pub fn is_empty(&self, queue: &Descriptor) -> bool {
        self.len(queue) == 0
    }

    /// Sequences currently stored for `queue`, in ascending order.
    pub fn sequences(&self, queue: &Descriptor) -> Vec<u64> {
        self.state()
            .queues
            .get(queue.name())
            .map(|elements| elements.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn writes(&self) -> u64 {
        self.state().writes
    }

    pub fn reads(&self) -> u64 {
        self.state().reads
    }

    pub fn deletes(&self) -> u64 {
        self.state().deletes
    }
}

impl<E: Clone + Send> super::Store<u64, E> for Memory<E> {
    fn write(&mut self, queue: &Descriptor, sequence: u64, element: &E) -> Result<u64, Error> {
        let mut state = self.state();
        if state.unavailable {
            return Err(Error::Unavailable(queue.name().to_string()));
        }
        let key = state.next_key;
        state.next_key += 1;
        state.writes += 1;
        state
            .queues
            .entry(queue.name().to_string())
            .or_default()
            .insert(sequence, (key, element.clone()));
        Ok(key)
    }

    fn read(&mut self, queue: &Descriptor, sequence: u64) -> Result<Option<(u64, E)>, Error> {
        let mut state = self.state();
        if state.unavailable {
            return Err(Error::Unavailable(queue.name().to_string()));
        }
        state.reads += 1;
        Ok(state
            .queues
            .get(queue.name())
            .and_then(|elements| elements.get(&sequence))
            .cloned())
    }

    fn delete(&mut self, queue: &Descriptor, sequence: u64, key: &u64) -> Result<(), Error> {
        let mut state = self.state();
        if state.unavailable {
            return Err(Error::Unavailable(queue.name().to_string()));
        }
        let removed = match state.queues.get_mut(queue.name()) {
            Some(elements) if elements.get(&sequence).is_some_and(|(stored, _)| stored == key) => {
                elements.remove(&sequence).is_some()
            }
            _ => false,
        };
        if removed {
            state.deletes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::Store, Kind};

    #[test]
    fn test_write_read_delete() {
        let queue = Descriptor::new("test", Kind::Exclusive);
        let other = Descriptor::new("other", Kind::Exclusive);
        let mut store = Memory::default();

        let key = store.write(&queue, 7, &b"seven".to_vec()).unwrap();
        store.write(&other, 7, &b"other".to_vec()).unwrap();
        assert_eq!(store.len(&queue), 1);

        let (read_key, element) = store.read(&queue, 7).unwrap().unwrap();
        assert_eq!(read_key, key);
        assert_eq!(element, b"seven");
        assert!(store.read(&queue, 8).unwrap().is_none());

        // A stale key does not delete the element
        store.delete(&queue, 7, &(key + 100)).unwrap();
        assert_eq!(store.len(&queue), 1);

        store.delete(&queue, 7, &key).unwrap();
        assert!(store.is_empty(&queue));
        assert_eq!(store.len(&other), 1);
        assert_eq!(store.deletes(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let queue = Descriptor::new("test", Kind::Exclusive);
        let mut store = Memory::default();
        let observer = store.clone();

        store.write(&queue, 0, &1u32).unwrap();
        store.write(&queue, 1, &2u32).unwrap();
        assert_eq!(observer.sequences(&queue), vec![0, 1]);
        assert_eq!(observer.writes(), 2);
    }

    #[test]
    fn test_unavailable() {
        let queue = Descriptor::new("test", Kind::Exclusive);
        let mut store = Memory::default();
        store.set_unavailable(true);
        assert!(matches!(
            store.write(&queue, 0, &1u32),
            Err(Error::Unavailable(_))
        ));
        assert!(store.read(&queue, 0).is_err());

        store.set_unavailable(false);
        assert!(store.write(&queue, 0, &1u32).is_ok());
    }
}
