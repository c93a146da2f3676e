use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// TbObj lets tasks share testbench state (driver queues, memories, scoreboards).
// The kernel polls every task from one thread, so the lock is never contended.
// It only exists so tasks stay Send and can be woken through ArcWake.
pub struct TbObj<T>(Arc<Mutex<T>>);

impl<T> TbObj<T> {
    pub fn new(data: T) -> TbObj<T> {
        TbObj(Arc::new(Mutex::new(data)))
    }

    /// Locks the object. A task that panicked while holding the lock leaves
    /// the data as it was; the guard is handed out anyway.
    pub fn get(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.get();
        f(&mut guard)
    }
}

impl<T> Clone for TbObj<T> {
    fn clone(&self) -> Self {
        TbObj(self.0.clone())
    }
}
