use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Counting semaphore bounding how many chunks are folded at once.
pub struct Semaphore {
    permits: Mutex<usize>,
    freed: Condvar,
}

/// A held permit; dropping it frees the slot, also when the chunk's fold panics.
pub struct Permit<'a> {
    sem: &'a Semaphore,
    /// Time spent blocked before the permit was granted (zero if one was free).
    pub waited: Duration,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        assert!(permits > 0, "permits must be > 0");
        Self {
            permits: Mutex::new(permits),
            freed: Condvar::new(),
        }
    }

    /// Block until a permit is free and take it.
    pub fn acquire(&self) -> Permit<'_> {
        let start = Instant::now();
        let permits = self.lock();
        let blocked = *permits == 0;
        let mut permits = self
            .freed
            .wait_while(permits, |free| *free == 0)
            .unwrap_or_else(PoisonError::into_inner);
        *permits -= 1;
        Permit {
            sem: self,
            waited: if blocked { start.elapsed() } else { Duration::ZERO },
        }
    }

    fn release(&self) {
        *self.lock() += 1;
        self.freed.notify_one();
    }

    // The count stays consistent even if a holder panicked, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.sem.release();
    }
}
