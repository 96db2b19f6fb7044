//! Counting semaphores and a mutex convenience wrapper (spec §3/§4.3).
//!
//! Grounded directly on `examples/original_source/p1/p2/synch.c`: `count`
//! starts at the sentinel `-1` until [`Semaphore::initialize`] is called,
//! `p` decrements or blocks, `v` wakes the oldest waiter in FIFO order
//! instead of incrementing the count whenever anyone is waiting.

use crate::kernel;
use crate::thread::ThreadId;
use std::cell::{RefCell, UnsafeCell};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

/// A counting semaphore whose count and wait queue are protected by the
/// kernel's own preemption gate rather than a second lock of their own —
/// `p`/`v` disable interrupts around the same critical section
/// `semaphore_P`/`semaphore_V` do.
pub struct Semaphore {
    inner: RefCell<Inner>,
}

struct Inner {
    /// `None` until `initialize` is called, mirroring the original's `-1`
    /// sentinel count.
    count: Option<i64>,
    waiters: VecDeque<ThreadId>,
}

// SAFETY: every access to `inner` happens with the kernel's interrupt gate
// held, and the kernel itself is only ever driven by one OS thread at a
// time (spec §5's single logical processor), so this is never truly shared
// across concurrent access despite the `Sync` bound `'static` statics need.
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// Creates an uninitialized semaphore; [`Semaphore::initialize`] must be
    /// called before `p`/`v` (panics otherwise, matching the original's
    /// `AbortGracefully` on a negative count).
    pub const fn new() -> Semaphore {
        Semaphore {
            inner: RefCell::new(Inner {
                count: None,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Sets the starting count. `count` must be non-negative.
    pub fn initialize(&self, count: u32) {
        kernel::with_interrupts_disabled(|| {
            self.inner.borrow_mut().count = Some(count as i64);
        });
    }

    /// P: decrements the count, blocking the caller if it would go
    /// negative. Blocked threads wake in the order they called `p`.
    pub fn p(&self) {
        let should_block = kernel::with_interrupts_disabled(|| {
            let mut inner = self.inner.borrow_mut();
            let count = inner.count.expect("semaphore used before initialize()");
            if count > 0 {
                inner.count = Some(count - 1);
                false
            } else {
                inner.waiters.push_back(kernel::self_id());
                true
            }
        });
        if should_block {
            kernel::stop();
        }
    }

    /// Wakes every currently blocked waiter, leaving the count untouched —
    /// used to release all threads parked on a socket's semaphores when it
    /// is torn down (spec §4.6 "wakes all threads blocked on any semaphore
    /// of the socket"). Unlike a loop of `v()` calls, this never increments
    /// the count once the wait queue empties.
    pub fn wake_all(&self) {
        loop {
            let waiter =
                kernel::with_interrupts_disabled(|| self.inner.borrow_mut().waiters.pop_front());
            match waiter {
                Some(waiter) => kernel::start(waiter),
                None => break,
            }
        }
    }

    /// V: wakes the oldest blocked waiter if any, otherwise increments the
    /// count.
    pub fn v(&self) {
        let waiter = kernel::with_interrupts_disabled(|| {
            let mut inner = self.inner.borrow_mut();
            match inner.waiters.pop_front() {
                Some(waiter) => Some(waiter),
                None => {
                    let count = inner.count.expect("semaphore used before initialize()");
                    inner.count = Some(count + 1);
                    None
                }
            }
        });
        if let Some(waiter) = waiter {
            kernel::start(waiter);
        }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Semaphore::new()
    }
}

/// A binary semaphore, named for the role spec §5 calls out explicitly: "a
/// semaphore held as a mutex (initialized to 1)" guarding the port tables'
/// critical sections. Thin enough that it is really just `Semaphore` with a
/// guard type attached, in the style `std::sync::Mutex` itself uses.
pub struct Mutex<T> {
    sem: Semaphore,
    data: UnsafeCell<T>,
}

// SAFETY: see `Semaphore`'s impl — access is serialized by the kernel's
// preemption gate, never by true concurrent OS threads.
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Mutex<T> {
        let sem = Semaphore::new();
        sem.initialize(1);
        Mutex {
            sem,
            data: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.sem.p();
        MutexGuard { mutex: self }
    }
}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: the semaphore `p()` that produced this guard guarantees
        // exclusive access until `v()` runs in `Drop`.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see `Deref` above.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.sem.v();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutex_serializes_access() {
        let m = Mutex::new(0);
        {
            let mut guard = m.lock();
            *guard += 1;
        }
        assert_eq!(*m.lock(), 1);
    }
}
