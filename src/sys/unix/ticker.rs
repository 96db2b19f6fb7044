//! `SIGALRM`-driven [`TickSource`] (spec §4.1/§6 "tick source").
//!
//! The signal handler itself is kept async-signal-safe: it only touches the
//! callback pointer installed once at `start` time, invoking it directly.
//! `minithreads` keeps its own side of that contract minimal in turn (see
//! `sched::Scheduler::on_tick`, which does no allocation on the fast path
//! beyond draining already-allocated alarm entries), but this module makes
//! no assumption about what the callback does — that discipline is the
//! caller's responsibility, same as any real interrupt handler.

use crate::clock::TickSource;
use std::ptr;
use std::sync::OnceLock;
use std::time::Duration;

static CALLBACK: OnceLock<Box<dyn Fn() + Send + Sync>> = OnceLock::new();

extern "C" fn handle_sigalrm(_signum: libc::c_int) {
    if let Some(callback) = CALLBACK.get() {
        callback();
    }
}

/// Hosted tick source backed by `setitimer(ITIMER_REAL, ...)` and a
/// `SIGALRM` handler, the same mechanism the original C assignment's
/// `minithread_clock_init` used on top of UNIX.
pub struct IntervalTicker {
    armed: bool,
}

impl IntervalTicker {
    pub fn new() -> IntervalTicker {
        IntervalTicker { armed: false }
    }
}

impl Default for IntervalTicker {
    fn default() -> Self {
        IntervalTicker::new()
    }
}

impl TickSource for IntervalTicker {
    fn start(&mut self, period: Duration, on_tick: Box<dyn Fn() + Send + Sync>) {
        assert!(!self.armed, "IntervalTicker::start called twice");
        CALLBACK
            .set(on_tick)
            .unwrap_or_else(|_| panic!("tick source callback already installed"));

        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = handle_sigalrm as usize;
            libc::sigemptyset(&mut action.sa_mask);
            action.sa_flags = libc::SA_RESTART;
            libc::sigaction(libc::SIGALRM, &action, ptr::null_mut());

            let micros = period.as_micros().max(1) as i64;
            let interval = libc::timeval {
                tv_sec: micros / 1_000_000,
                tv_usec: micros % 1_000_000,
            };
            let timer = libc::itimerval {
                it_interval: interval,
                it_value: interval,
            };
            libc::setitimer(libc::ITIMER_REAL, &timer, ptr::null_mut());
        }
        self.armed = true;
    }
}
