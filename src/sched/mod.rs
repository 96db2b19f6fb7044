//! The multilevel-feedback scheduler (spec §3 "Multilevel run queue", §4.2).
//!
//! Grounded directly on `minithread_yield`/`minithread_stop`/`minithread_fork`
//! in `examples/original_source/Project4/Project4/minithread.c`: the level
//! selection, quanta accounting, and idle/reaper hand-off below are a
//! line-for-line translation of that file's control flow into owned Rust
//! data structures instead of raw pointers and global arrays.

mod queue;

use crate::sys::Stack;
use crate::thread::{Status, Thread, ThreadId, INITIAL_QUANTA, LEVELS, LEVEL_BUDGETS};
use queue::MultilevelQueue;
use std::collections::{HashMap, VecDeque};

/// Default size of a forked thread's stack.
pub use crate::sys::DEFAULT_STACK_SIZE;

/// Owns every thread record and the run/zombie queues. Does not own the
/// alarm table or port tables — those live alongside it in [`crate::Kernel`]
/// — but every mutation here happens with the kernel's preemption gate held,
/// per spec §5.
pub struct Scheduler {
    threads: HashMap<ThreadId, Box<Thread>>,
    run_queue: MultilevelQueue,
    zombie_queue: VecDeque<ThreadId>,
    current: ThreadId,
    idle: ThreadId,
    reaper: ThreadId,
    current_level: usize,
    level_budget: u32,
    next_id: u64,
}

/// What `yield`/`stop` should do once the scheduling decision has been made:
/// keep running the caller, or switch to a specific other thread.
enum Decision {
    KeepRunning,
    SwitchTo(ThreadId),
}

/// A context switch the caller must perform once it has released whatever
/// lock guards `Kernel`'s state.
///
/// Every `Scheduler` method that may switch stacks returns one of these
/// instead of performing the switch itself, because the switch suspends the
/// calling stack mid-function: any lock held across it would still appear
/// "held" to that lock's own bookkeeping while a completely different
/// thread resumes and tries to acquire kernel state again. `Kernel` drops
/// its guard before calling [`SwitchRequest::perform`], the same way a real
/// kernel's `switch_to` runs outside the runqueue lock.
pub struct SwitchRequest {
    from: *mut Stack,
    to: *mut Stack,
}

impl SwitchRequest {
    /// # Safety
    ///
    /// Must be called with no lock or borrow on the `Scheduler` (or
    /// whatever owns it) held. Both stacks must remain alive for the
    /// duration — guaranteed here because both threads stay registered in
    /// the scheduler's thread table until reaped.
    pub unsafe fn perform(self) {
        unsafe {
            (*self.from).switch(&mut *self.to);
        }
    }
}

impl Scheduler {
    /// Builds the scheduler around a freshly created idle thread, reaper
    /// thread, and main thread — mirroring
    /// `minithread_system_initialize`'s three `minithread_create_helper`
    /// calls, none of which are enqueued on the run queue (they are special).
    pub(crate) fn new(
        idle_body: impl FnOnce() + 'static,
        reaper_body: impl FnOnce() + 'static,
        main_body: impl FnOnce() + 'static,
    ) -> Result<Scheduler, crate::Error> {
        let mut threads = HashMap::new();
        let mut next_id = 0u64;

        let reaper = spawn_raw(&mut next_id, None, reaper_body, Status::Ready)?;
        let idle = spawn_raw(&mut next_id, None, idle_body, Status::Ready)?;
        let main = spawn_raw(&mut next_id, Some("main"), main_body, Status::Running)?;

        let (reaper_id, idle_id, main_id) = (reaper.id, idle.id, main.id);
        threads.insert(reaper_id, Box::new(reaper));
        threads.insert(idle_id, Box::new(idle));
        threads.insert(main_id, Box::new(main));

        Ok(Scheduler {
            threads,
            run_queue: MultilevelQueue::new(LEVELS),
            zombie_queue: VecDeque::new(),
            current: main_id,
            idle: idle_id,
            reaper: reaper_id,
            current_level: 0,
            level_budget: LEVEL_BUDGETS[0],
            next_id,
        })
    }

    fn is_idle_or_reaper(&self, id: ThreadId) -> bool {
        id == self.idle || id == self.reaper
    }

    /// `fork`: create a READY thread at level 0, enqueued immediately.
    pub fn fork(&mut self, body: impl FnOnce() + 'static) -> crate::Result<ThreadId> {
        self.fork_named(None, body)
    }

    pub fn fork_named(
        &mut self,
        name: Option<&'static str>,
        body: impl FnOnce() + 'static,
    ) -> crate::Result<ThreadId> {
        let t = spawn_raw(&mut self.next_id, name, body, Status::Ready)?;
        let id = t.id;
        self.threads.insert(id, Box::new(t));
        self.run_queue.enqueue(0, id);
        Ok(id)
    }

    /// `create`: a WAIT thread, not enqueued, for callers that arrange their
    /// own `start` later (e.g. a socket waiting for a handshake reply).
    pub fn create(&mut self, body: impl FnOnce() + 'static) -> crate::Result<ThreadId> {
        let t = spawn_raw(&mut self.next_id, None, body, Status::Wait)?;
        let id = t.id;
        self.threads.insert(id, Box::new(t));
        Ok(id)
    }

    /// `start`: WAIT -> READY, enqueued at the thread's current level.
    /// A no-op for DONE or already-READY/RUNNING threads (spec §4.2).
    pub fn start(&mut self, id: ThreadId) {
        let Some(t) = self.threads.get_mut(&id) else {
            return;
        };
        if !matches!(t.status, Status::Wait) {
            return;
        }
        t.status = Status::Ready;
        let level = t.level;
        self.run_queue.enqueue(level, id);
    }

    pub fn current(&self) -> ThreadId {
        self.current
    }

    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.get(&id).map(|b| b.as_ref())
    }

    /// `yield`: voluntarily relinquish the CPU, honoring the feedback
    /// policy's level-rotation discipline. Translated directly from
    /// `minithread_yield` in the original.
    #[must_use]
    pub fn yield_now(&mut self) -> Option<SwitchRequest> {
        let curr = self.current;
        let decision = if self.is_idle_or_reaper(curr) {
            self.yield_as_idle_or_reaper(curr)
        } else {
            self.yield_as_user_thread(curr)
        };
        match decision {
            Decision::SwitchTo(next) => Some(self.prepare_switch(next, Status::Ready, true)),
            Decision::KeepRunning => None,
        }
    }

    fn yield_as_idle_or_reaper(&mut self, curr: ThreadId) -> Decision {
        if self.run_queue.is_empty() {
            if curr == self.reaper {
                Decision::SwitchTo(self.idle)
            } else {
                Decision::KeepRunning
            }
        } else {
            let (_, next) = self
                .run_queue
                .dequeue(self.current_level)
                .expect("run queue non-empty");
            Decision::SwitchTo(next)
        }
    }

    fn yield_as_user_thread(&mut self, curr: ThreadId) -> Decision {
        let curr_level = {
            let t = self.threads.get_mut(&curr).expect("current thread exists");
            t.quanta -= 1;
            if t.quanta == 0 && t.level < LEVELS - 1 {
                t.level += 1;
                t.quanta = INITIAL_QUANTA[t.level];
            }
            t.level
        };

        self.level_budget -= 1;
        if self.level_budget == 0 {
            self.current_level = (self.current_level + 1) % LEVELS;
            self.level_budget = LEVEL_BUDGETS[self.current_level];
        }

        if self.run_queue.is_empty() {
            return Decision::KeepRunning;
        }

        let (peek_level, _peek_id) = self
            .run_queue
            .peek(self.current_level)
            .expect("run queue non-empty");

        // Walk forward from current_level, wrapping, until we hit either the
        // caller's own level or the candidate's level — whichever comes
        // first decides who "deserves" the CPU next.
        let mut lv = self.current_level;
        while lv != curr_level && lv != peek_level {
            lv = (lv + 1) % LEVELS;
        }

        if lv == peek_level {
            let (_, next) = self
                .run_queue
                .dequeue(self.current_level)
                .expect("peeked level has an entry");
            Decision::SwitchTo(next)
        } else {
            Decision::KeepRunning
        }
    }

    /// `stop`: RUNNING -> WAIT, not enqueued. Gives up the processor
    /// unconditionally (used by `Semaphore::p` and `sleep_with_timeout`).
    #[must_use]
    pub fn stop(&mut self) -> SwitchRequest {
        let curr = self.current;
        debug_assert!(
            !self.is_idle_or_reaper(curr),
            "idle/reaper threads must never call stop"
        );

        let mut next = self.idle;
        if !self.run_queue.is_empty() {
            let (level, candidate) = self
                .run_queue
                .dequeue(self.current_level)
                .expect("run queue non-empty");
            next = candidate;
            if level != self.current_level {
                self.current_level = level;
                self.level_budget = LEVEL_BUDGETS[level];
            }
        }
        self.prepare_switch(next, Status::Wait, false)
    }

    /// Shared tail of `yield`/`stop`: mark the caller with `caller_status`,
    /// optionally re-enqueue it (`requeue`), make `next` RUNNING, and hand
    /// back the raw stack pointers for the caller to switch between once it
    /// has released its lock on this `Scheduler`.
    fn prepare_switch(&mut self, next: ThreadId, caller_status: Status, requeue: bool) -> SwitchRequest {
        let caller = self.current;
        debug_assert_ne!(caller, next);

        if requeue {
            let level = self.threads[&caller].level;
            self.run_queue.enqueue(level, caller);
        }
        self.threads.get_mut(&caller).expect("caller exists").status = caller_status;
        self.threads.get_mut(&next).expect("next exists").status = Status::Running;
        self.current = next;

        // `caller` and `next` are distinct live entries in `self.threads`;
        // their `Stack`s are heap-allocated independently of the
        // `HashMap`'s own storage, so these two raw pointers never alias.
        // Both stay valid past this call: the caller's `Thread` resumes
        // here on its next wake-up, `next`'s resumes wherever it last
        // switched away (or at its primed entry point) — neither is
        // touched again until `SwitchRequest::perform` runs.
        let from: *mut Stack = &mut self.threads.get_mut(&caller).unwrap().stack;
        let to: *mut Stack = &mut self.threads.get_mut(&next).unwrap().stack;
        SwitchRequest { from, to }
    }

    /// Enqueues `id` on the zombie queue for the reaper to reclaim. Called
    /// only from the cleanup trampoline, with preemption disabled.
    #[must_use]
    pub(crate) fn retire(&mut self, id: ThreadId) -> SwitchRequest {
        self.threads.get_mut(&id).expect("retiring a live thread").status = Status::Done;
        self.zombie_queue.push_back(id);
        self.prepare_switch(self.reaper, Status::Done, false)
    }

    /// Drains the zombie queue, dropping each `Thread` (freeing its stack).
    /// Called by the reaper thread's body.
    pub(crate) fn reap(&mut self) {
        while let Some(id) = self.zombie_queue.pop_front() {
            self.threads.remove(&id);
        }
    }

    pub fn reaper_id(&self) -> ThreadId {
        self.reaper
    }

    pub fn idle_id(&self) -> ThreadId {
        self.idle
    }

    /// Raw pointer to the current thread's stack, for the one-time handoff
    /// from the bootstrapping OS thread into the scheduler's world. Only
    /// meant to be used once, immediately after [`Scheduler::new`].
    pub(crate) fn current_stack_ptr(&mut self) -> *mut Stack {
        &mut self.threads.get_mut(&self.current).unwrap().stack
    }
}

fn spawn_raw(
    next_id: &mut u64,
    name: Option<&'static str>,
    body: impl FnOnce() + 'static,
    status: Status,
) -> crate::Result<Thread> {
    let mut stack = Stack::allocate(DEFAULT_STACK_SIZE).map_err(|_| crate::Error::OutOfMemory)?;
    stack.initialize(body);
    let id = ThreadId(*next_id);
    *next_id += 1;
    Ok(Thread::new(id, name, stack, status))
}
