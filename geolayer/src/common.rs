use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};

pub type Atomic<T> = Arc<RwLock<T>>;

#[inline]
pub fn atomic<T>(t: T) -> Atomic<T> {
    Arc::new(RwLock::new(t))
}

pub trait ReadExecutor<T: ?Sized> {
    fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R;
}

impl<T> ReadExecutor<T> for Atomic<T> {
    #[inline]
    fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let read_guard = self.read();
        f(&*read_guard)
    }
}

pub trait WriteExecutor<T: ?Sized> {
    fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

impl<T> WriteExecutor<T> for Atomic<T> {
    #[inline]
    fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut write_guard = self.write();
        f(&mut *write_guard)
    }
}

/// Exclusive lock serializing the writers of one named resource.
#[derive(Clone)]
pub struct WriterLock {
    lock: Arc<Mutex<()>>,
}

impl WriterLock {
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }
}

/// Registry of named writer locks, shared by every handle onto a store.
///
/// Handles obtained for the same name share one underlying mutex, so two
/// layer handles for the same layer still exclude each other.
#[derive(Clone, Default)]
pub struct LockRegistry {
    locks: Atomic<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        LockRegistry {
            locks: atomic(HashMap::new()),
        }
    }

    /// Gets the lock for `name`, creating it on first use.
    pub fn get_lock(&self, name: &str) -> WriterLock {
        let lock = self.locks.write_with(|locks| {
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        });
        WriterLock { lock }
    }

    pub fn remove_lock(&self, name: &str) -> bool {
        self.locks.write_with(|locks| locks.remove(name).is_some())
    }

    pub fn lock_count(&self) -> usize {
        self.locks.read_with(|locks| locks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_read_with() {
        let value = atomic(vec![1, 2]);
        assert_eq!(value.read_with(|v| v.len()), 2);
    }

    #[test]
    fn test_write_with() {
        let value = atomic(5);
        value.write_with(|v| *v = 10);
        assert_eq!(*value.read(), 10);
    }

    #[test]
    fn test_lock_registry_shares_lock_per_name() {
        let registry = LockRegistry::new();
        let a = registry.get_lock("roads");
        let b = registry.get_lock("roads");
        let _c = registry.get_lock("rivers");
        assert_eq!(registry.lock_count(), 2);

        let _guard = a.lock();
        assert!(b.lock.try_lock().is_none());
    }

    #[test]
    fn test_lock_registry_serializes_writers() {
        let registry = LockRegistry::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let handle = registry.get_lock("layer");
                        let _guard = handle.lock();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_lock() {
        let registry = LockRegistry::default();
        registry.get_lock("a");
        assert!(registry.remove_lock("a"));
        assert!(!registry.remove_lock("a"));
    }
}
