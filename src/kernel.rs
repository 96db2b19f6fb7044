//! The kernel singleton: wires the scheduler, alarm table, tick source, and
//! (with the `net` feature) port tables together, and exposes the free
//! functions applications call (spec §6's thread API surface).
//!
//! Grounded on `minithread.c`'s global state (`g_run_queue`, `g_alarm_table`,
//! `g_interrupt_level`) plus `interrupts.h`'s `set_interrupt_level`: that
//! file keeps everything as bare globals behind a hardware interrupt mask,
//! which this module encapsulates instead behind one `Mutex<KernelState>`
//! (spec §5's "single-owner model... encapsulate each shared structure
//! behind a module exposing only safe operations", `SPEC_FULL.md` §B).

use crate::clock::{AlarmId, AlarmTable, TickSource};
use crate::sched::{Scheduler, SwitchRequest, DEFAULT_STACK_SIZE};
use crate::sys::{IntervalTicker, Stack};
use crate::thread::ThreadId;
use log::trace;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

#[cfg(feature = "net")]
use crate::ports::PortTables;

/// Length of one tick, and the period the default [`IntervalTicker`] is
/// armed with. Not part of the public API: callers measure delays in
/// [`Duration`], the kernel converts to ticks internally (spec §4.4).
pub(crate) const TICK_PERIOD: Duration = Duration::from_millis(100);

struct KernelState {
    scheduler: Scheduler,
    alarms: AlarmTable,
    #[cfg(feature = "net")]
    ports: PortTables,
    /// Reentrancy depth for `set_interrupt_level`. While nonzero, the
    /// deferred clock handler must not run even if a tick is pending —
    /// mirrors the original's hardware interrupt mask, realized here as a
    /// plain counter since only one OS thread ever touches kernel state.
    interrupt_depth: u32,
}

/// The kernel singleton. Lives for the process's lifetime once
/// [`system_initialize`] has run.
struct Kernel {
    state: Mutex<KernelState>,
    tick_pending: Arc<AtomicBool>,
}

static KERNEL: OnceLock<Kernel> = OnceLock::new();

fn kernel() -> &'static Kernel {
    KERNEL.get().expect("minithreads::system_initialize was never called")
}

/// Opaque token returned by [`set_interrupt_level`]; pass it back in to
/// restore the level it captured.
#[derive(Debug, Clone, Copy)]
pub struct InterruptLevel(bool);

/// Disables (`enabled = false`) or restores (`enabled = true`) preemption,
/// returning the previous level. Matches `interrupts.h`'s
/// `set_interrupt_level`/`DISABLED`/`ENABLED` pair exactly; `Semaphore` and
/// the client port allocator use this to bracket their critical sections.
pub fn set_interrupt_level(enabled: bool) -> InterruptLevel {
    let mut state = kernel().state.lock().unwrap();
    let old = InterruptLevel(state.interrupt_depth == 0);
    if enabled {
        state.interrupt_depth = state.interrupt_depth.saturating_sub(1);
    } else {
        state.interrupt_depth += 1;
    }
    old
}

/// Runs `f` with preemption disabled, restoring the previous level
/// afterwards regardless of how `f` returns — the idiomatic replacement for
/// every `old_level = set_interrupt_level(DISABLED); ...; set_interrupt_level(old_level);`
/// bracket in the original source.
pub(crate) fn with_interrupts_disabled<R>(f: impl FnOnce() -> R) -> R {
    let old = set_interrupt_level(false);
    let result = f();
    set_interrupt_level(old.0);
    result
}

/// Locks kernel state, runs `f`, and performs any resulting context switch
/// only after the lock has been released. Every free function in this
/// module that can cause a switch goes through here; see
/// [`crate::sched::SwitchRequest`] for why the switch cannot happen while
/// the lock is held.
///
/// Also the scheduler's safe point for deferred tick processing (spec
/// §4.1/§9, `SPEC_FULL.md` §B): every call checks for a pending tick before
/// touching kernel state, the same way a real kernel checks for pending
/// bottom-half work on the way into `schedule()`.
fn switch_on<R>(f: impl FnOnce(&mut KernelState) -> (R, Option<SwitchRequest>)) -> R {
    maybe_run_clock_handler();
    let (result, request) = {
        let mut state = kernel().state.lock().unwrap();
        f(&mut state)
    };
    if let Some(request) = request {
        // SAFETY: the lock above is dropped before this call.
        unsafe { request.perform() };
    }
    result
}

/// Bootstraps the kernel: builds the idle, reaper, and main threads, arms
/// the tick source, and switches from the calling (bootstrap) OS thread
/// into the main thread for the first and only time.
///
/// Mirrors `minithread_system_initialize` exactly: that function allocates
/// a `kernelThreadStackPtr` purely to receive the bootstrap OS thread's own
/// context and then calls `minithread_switch` into `g_runningThread`,
/// never returning through that call in practice. This function's "boot"
/// stack plays the same role — once the switch below happens, control only
/// ever comes back here if every thread, including idle, somehow switched
/// back to it, which nothing in this crate does. In practice this call
/// diverges for the life of the process.
pub fn system_initialize(main: impl FnOnce() + 'static) -> crate::Result<()> {
    system_initialize_with(main, IntervalTicker::new())
}

/// As [`system_initialize`], but with an explicit [`TickSource`] — the seam
/// tests use to substitute a manually driven fake clock instead of a real
/// `SIGALRM` timer.
pub fn system_initialize_with(
    main: impl FnOnce() + 'static,
    mut ticker: impl TickSource + 'static,
) -> crate::Result<()> {
    let tick_pending = Arc::new(AtomicBool::new(false));

    let reaper_body = reaper_loop;
    let idle_body = idle_loop;
    let main_wrapped = wrap_cleanup(main);

    let mut scheduler = Scheduler::new(idle_body, reaper_body, main_wrapped)?;
    let main_stack_ptr = scheduler.current_stack_ptr();

    let state = KernelState {
        scheduler,
        alarms: AlarmTable::new(TICK_PERIOD),
        #[cfg(feature = "net")]
        ports: PortTables::new(),
        interrupt_depth: 0,
    };

    KERNEL
        .set(Kernel {
            state: Mutex::new(state),
            tick_pending: Arc::clone(&tick_pending),
        })
        .unwrap_or_else(|_| panic!("minithreads::system_initialize called more than once"));

    let gate = Arc::clone(&tick_pending);
    ticker.start(TICK_PERIOD, Box::new(move || gate.store(true, Ordering::SeqCst)));

    let mut boot = Stack::allocate(DEFAULT_STACK_SIZE).map_err(|_| crate::Error::OutOfMemory)?;
    // SAFETY: `main_stack_ptr` points at the main thread's primed stack,
    // owned by the scheduler inside `KERNEL` for the rest of the process.
    // `boot` stays alive on this call frame, which never returns in
    // practice, so there is no dangling-context concern even though
    // nothing ever switches back into it.
    unsafe {
        boot.switch(&mut *main_stack_ptr);
    }
    Ok(())
}

/// Checked at every scheduler safe point: if a tick arrived and preemption
/// is currently enabled, runs the deferred clock handler (drain due alarms,
/// nothing else — the next `yield_now` call is what actually reschedules).
///
/// Collects the due handlers and drops the kernel lock before invoking any
/// of them: alarm handlers routinely call back into the kernel (`start`,
/// `register_alarm`, a semaphore's `v`/`wake_all`), and `state` is a plain
/// `std::sync::Mutex`, which deadlocks on a second lock from the same
/// thread. Running handlers with the lock released lets that reentry
/// through the same way `switch_on` lets a switch request through only
/// after releasing it.
fn maybe_run_clock_handler() {
    let k = kernel();
    if !k.tick_pending.swap(false, Ordering::SeqCst) {
        return;
    }
    let due = {
        let mut state = k.state.lock().unwrap();
        if state.interrupt_depth != 0 {
            // Preemption disabled; leave the tick for the next safe point.
            k.tick_pending.store(true, Ordering::SeqCst);
            return;
        }
        let now = state.alarms.advance();
        let due = state.alarms.drain_due();
        trace!("tick {now} processed");
        due
    };
    for handler in due {
        handler();
    }
}

fn reaper_loop() {
    loop {
        switch_on(|state| {
            state.scheduler.reap();
            (true, state.scheduler.yield_now())
        });
    }
}

fn idle_loop() {
    loop {
        switch_on(|state| (true, state.scheduler.yield_now()));
    }
}

/// Wraps a thread body so that, when it returns, the thread is retired
/// instead of falling off the end of `trampoline` — the Rust analogue of
/// the original's `minithread_create_helper`'s wrapper around `proc`.
fn wrap_cleanup(body: impl FnOnce() + 'static) -> impl FnOnce() + 'static {
    move || {
        body();
        let id = self_id();
        switch_on(|state| ((), Some(state.scheduler.retire(id))));
        unreachable!("a retired thread was switched back into");
    }
}

/// Forks a new thread, ready to run immediately (spec §4.2 `fork`).
pub fn fork(body: impl FnOnce() + 'static) -> crate::Result<ThreadId> {
    fork_named(None, body)
}

pub fn fork_named(
    name: Option<&'static str>,
    body: impl FnOnce() + 'static,
) -> crate::Result<ThreadId> {
    let body = wrap_cleanup(body);
    switch_on(|state| match state.scheduler.fork_named(name, body) {
        Ok(id) => (Ok(id), None),
        Err(e) => (Err(e), None),
    })
}

/// Creates a thread in the WAIT state without enqueueing it; pair with
/// [`start`] (spec §4.2 `create`/`start`).
pub fn create(body: impl FnOnce() + 'static) -> crate::Result<ThreadId> {
    let body = wrap_cleanup(body);
    switch_on(|state| match state.scheduler.create(body) {
        Ok(id) => (Ok(id), None),
        Err(e) => (Err(e), None),
    })
}

/// Moves a WAIT thread to READY (spec §4.2 `start`).
pub fn start(id: ThreadId) {
    switch_on(|state| {
        state.scheduler.start(id);
        ((), None)
    });
}

/// Voluntarily yields the processor (spec §4.2 `yield`).
pub fn yield_now() {
    switch_on(|state| ((), state.scheduler.yield_now()));
}

/// Blocks the calling thread until some other code path calls [`start`] on
/// it (spec §4.2 `stop`). Used by [`crate::sync::Semaphore::p`] and by the
/// sleep helper below; never called on the idle or reaper threads.
pub fn stop() {
    switch_on(|state| ((), Some(state.scheduler.stop())));
}

/// The calling thread's id (spec §4.2 `id`).
pub fn self_id() -> ThreadId {
    kernel().state.lock().unwrap().scheduler.current()
}

/// Registers a one-shot alarm; see [`crate::clock::AlarmTable::register`].
pub(crate) fn register_alarm(delay: Duration, handler: impl FnOnce() + Send + 'static) -> AlarmId {
    let mut state = kernel().state.lock().unwrap();
    state.alarms.register(delay, handler)
}

pub(crate) fn deregister_alarm(id: AlarmId) -> bool {
    let mut state = kernel().state.lock().unwrap();
    state.alarms.deregister(id)
}

/// Blocks the calling thread until `delay` has elapsed, via a one-shot
/// alarm that calls [`start`] on this thread (spec §4.4's canonical use of
/// alarms for sleeping threads).
pub fn sleep_with_timeout(delay: Duration) {
    let waiter = self_id();
    register_alarm(delay, move || start(waiter));
    stop();
}

#[cfg(feature = "net")]
pub(crate) fn with_ports<R>(f: impl FnOnce(&mut PortTables) -> R) -> R {
    let mut state = kernel().state.lock().unwrap();
    f(&mut state.ports)
}
