use std::sync::{Mutex, MutexGuard};

/// Acquires a mutex, recovering the guard if a previous holder panicked.
/// All engine locks guard plain byte state that stays consistent across a
/// panic boundary, so poisoning is not propagated.
#[inline]
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
