//! Opaque-handle arenas.
//!
//! Foreign callers address library objects through `i64` handles. Each
//! arena maps handles to objects behind a lock; destruction is explicit
//! (take), never implied by reads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct HandleArena<T> {
    inner: Mutex<ArenaState<T>>,
}

struct ArenaState<T> {
    next_id: i64,
    objects: HashMap<i64, Arc<T>>,
}

impl<T> Default for HandleArena<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(ArenaState {
                next_id: 0,
                objects: HashMap::new(),
            }),
        }
    }
}

impl<T> HandleArena<T> {
    /// Store an object and return its fresh handle.
    pub fn add(&self, object: T) -> i64 {
        let mut state = self.inner.lock().expect("arena lock poisoned");
        let id = state.next_id;
        state.next_id += 1;
        state.objects.insert(id, Arc::new(object));
        id
    }

    /// Fetch the object behind a handle, if it is still alive.
    pub fn get(&self, id: i64) -> Option<Arc<T>> {
        let state = self.inner.lock().expect("arena lock poisoned");
        state.objects.get(&id).cloned()
    }

    /// Remove the object behind a handle, returning it for destruction.
    pub fn take(&self, id: i64) -> Option<Arc<T>> {
        let mut state = self.inner.lock().expect("arena lock poisoned");
        state.objects.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique_and_stable() {
        let arena = HandleArena::default();
        let a = arena.add(1u32);
        let b = arena.add(2u32);
        assert_ne!(a, b);
        assert_eq!(*arena.get(a).unwrap(), 1);
        assert_eq!(*arena.get(b).unwrap(), 2);
    }

    #[test]
    fn take_destroys_the_handle() {
        let arena = HandleArena::default();
        let id = arena.add("x");
        assert!(arena.take(id).is_some());
        assert!(arena.get(id).is_none());
        assert!(arena.take(id).is_none());
    }
}
