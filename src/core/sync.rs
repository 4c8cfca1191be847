//! Synchronization helpers for lock poisoning
//!
//! Queue state is shared between worker threads through `Mutex`/`RwLock`.
//! A worker that panics while holding a lock poisons it; these helpers turn
//! the poison into a domain error instead of propagating the panic to every
//! other worker on the same queue.

use std::sync::{LockResult, MutexGuard, RwLockReadGuard, RwLockWriteGuard, WaitTimeoutResult};

/// Convert a poisoned `Mutex::lock` into an application error
///
/// # Examples
/// ```
/// use std::sync::Mutex;
/// use crawlgrid::core::sync::handle_mutex_poison;
/// use crawlgrid::queue::BrokerError;
///
/// let mutex = Mutex::new(42);
/// let guard = handle_mutex_poison(mutex.lock(), |message| BrokerError::OperationFailed {
///     message,
/// })
/// .unwrap();
/// assert_eq!(*guard, 42);
/// ```
pub fn handle_mutex_poison<T, E>(
    result: LockResult<T>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<T, E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "Internal synchronisation error (mutex poisoned). A thread panicked while holding a queue lock. PoisonError: {:?}",
            poison_err
        ))
    })
}

/// Convert a poisoned `RwLock::read` into an application error
pub fn handle_rwlock_read<T, E>(
    result: LockResult<RwLockReadGuard<T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockReadGuard<T>, E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "Internal synchronisation error (RwLock read poisoned). PoisonError: {:?}",
            poison_err
        ))
    })
}

/// Convert a poisoned `RwLock::write` into an application error
pub fn handle_rwlock_write<T, E>(
    result: LockResult<RwLockWriteGuard<T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockWriteGuard<T>, E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "Internal synchronisation error (RwLock write poisoned). PoisonError: {:?}",
            poison_err
        ))
    })
}

/// Convert a poisoned `Condvar::wait_timeout` into an application error
///
/// Blocking receives park on a condition variable while holding the queue
/// mutex; the guard comes back poisoned if a sender panicked in between.
pub fn handle_condvar_wait<'a, T, E>(
    result: LockResult<(MutexGuard<'a, T>, WaitTimeoutResult)>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<(MutexGuard<'a, T>, WaitTimeoutResult), E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "Internal synchronisation error (condvar wait poisoned). PoisonError: {:?}",
            poison_err
        ))
    })
}
