//! Shared test harness.
//!
//! `minithreads::system_initialize` performs one context switch into the
//! application's main green thread and, in practice, never returns: nothing
//! in this crate ever switches back into the bootstrap stack. So every test
//! here runs the kernel on a detached background OS thread and reports
//! results to the (real) test thread over a channel instead of relying on
//! `system_initialize`'s call to return.

use minithreads::TickSource;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Spawns the kernel on a background thread with the real `SIGALRM` tick
/// source. The thread is intentionally never joined.
pub fn spawn_kernel(main: impl FnOnce() + Send + 'static) {
    thread::Builder::new()
        .name("test-kernel".into())
        .spawn(move || {
            minithreads::system_initialize(main).expect("system_initialize failed");
        })
        .expect("failed to spawn kernel thread");
}

/// As [`spawn_kernel`], but with ticks driven ~100x faster than real time so
/// tests that wait out a multi-try retransmission schedule or a sleep don't
/// have to burn tens of seconds of wall clock.
pub fn spawn_kernel_fast(main: impl FnOnce() + Send + 'static) {
    thread::Builder::new()
        .name("test-kernel".into())
        .spawn(move || {
            minithreads::system_initialize_with(main, FastTicker::new())
                .expect("system_initialize failed");
        })
        .expect("failed to spawn kernel thread");
}

/// A [`TickSource`] that fires far more often than the period it is asked
/// to honor. The alarm table measures delays in ticks, not wall time, so
/// this just makes every tick-measured delay resolve faster without
/// changing any alarm's semantics.
struct FastTicker;

impl FastTicker {
    fn new() -> FastTicker {
        FastTicker
    }
}

impl TickSource for FastTicker {
    fn start(&mut self, _period: Duration, on_tick: Box<dyn Fn() + Send + Sync>) {
        thread::spawn(move || loop {
            thread::sleep(Duration::from_millis(1));
            on_tick();
        });
    }
}

pub fn recv_timeout<T>(rx: &mpsc::Receiver<T>, timeout: Duration) -> T {
    rx.recv_timeout(timeout)
        .expect("test timed out waiting for a result from the kernel thread")
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
