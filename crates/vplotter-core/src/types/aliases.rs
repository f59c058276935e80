//! Type aliases for commonly used shared-state types.
//!
//! Uses `parking_lot` locks for better performance than `std::sync`.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// A thread-safe, mutex-protected wrapper for cross-thread sharing.
///
/// # Example
/// ```rust,ignore
/// let state: ThreadSafe<SessionState> = thread_safe(SessionState::Disconnected);
/// *state.lock() = SessionState::Idle;
/// ```
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe reader-writer lock wrapper for read-heavy workloads.
pub type ThreadSafeRw<T> = Arc<RwLock<T>>;

/// Create a new `ThreadSafe<T>` from a value.
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Create a new `ThreadSafeRw<T>` from a value.
pub fn thread_safe_rw<T>(value: T) -> ThreadSafeRw<T> {
    Arc::new(RwLock::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_safe_is_shared() {
        let value: ThreadSafe<i32> = thread_safe(42);
        let other = value.clone();
        *other.lock() = 100;
        assert_eq!(*value.lock(), 100);
    }

    #[test]
    fn test_thread_safe_rw() {
        let value: ThreadSafeRw<i32> = thread_safe_rw(42);
        assert_eq!(*value.read(), 42);
        *value.write() = 7;
        assert_eq!(*value.read(), 7);
    }
}
