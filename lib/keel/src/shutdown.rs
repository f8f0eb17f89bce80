use std::sync::{Condvar, Mutex};

/// Process-wide shutdown coordinator. Any thread may call `signal`, the main
/// thread parks in `wait` until that happens.
pub struct Coordinator {
    state: Mutex<bool>,
    cv: Condvar,
}

impl Coordinator {
    #[inline]
    pub fn new() -> Coordinator {
        Coordinator {
            state: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Flips the shutdown flag and wakes every waiter. Safe to call more than once.
    pub fn signal(&self) {
        let mut signaled = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *signaled = true;
        self.cv.notify_all();
    }

    /// Blocks the calling thread until `signal` has been invoked.
    pub fn wait(&self) {
        let mut signaled = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while !*signaled {
            signaled = match self.cv.wait(signaled) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    pub fn is_signaled(&self) -> bool {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
