//! The tick clock and the alarm table (spec §3 "Alarm", §4.4).
//!
//! A monotonically increasing tick counter, incremented by an external tick
//! source, and an ordered table of one-shot callbacks keyed by target tick.
//! The clock handler itself — draining due alarms, then asking the scheduler
//! to reconsider who should run — lives in [`crate::sched`]; this module only
//! owns the counter and the alarm queue.

use std::collections::BinaryHeap;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

/// An opaque handle returned by [`AlarmTable::register`], usable to
/// [`AlarmTable::deregister`] the alarm before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlarmId(u64);

/// A scheduled one-shot callback.
struct Alarm {
    id: AlarmId,
    target_tick: u64,
    // Breaks ties between alarms that land on the same tick: earlier
    // registrations fire first, matching the original's insertion-ordered
    // queue.
    sequence: u64,
    handler: Box<dyn FnOnce() + Send>,
}

impl PartialEq for Alarm {
    fn eq(&self, other: &Self) -> bool {
        self.target_tick == other.target_tick && self.sequence == other.sequence
    }
}
impl Eq for Alarm {}

impl Ord for Alarm {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the smallest (target_tick, sequence)
        // pair to compare greatest, so alarms due soonest surface first.
        other
            .target_tick
            .cmp(&self.target_tick)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}
impl PartialOrd for Alarm {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered table of pending alarms plus the monotonic tick counter they are
/// measured against.
///
/// All mutation happens with the kernel's preemption gate held (spec §5), so
/// this type itself performs no internal locking; it is always accessed
/// through `&mut AlarmTable` from inside that critical section.
pub struct AlarmTable {
    tick: AtomicU64,
    period: Duration,
    pending: BinaryHeap<Alarm>,
    next_id: u64,
    next_sequence: u64,
}

impl AlarmTable {
    pub fn new(period: Duration) -> AlarmTable {
        AlarmTable {
            tick: AtomicU64::new(0),
            period,
            pending: BinaryHeap::new(),
            next_id: 0,
            next_sequence: 0,
        }
    }

    /// The current tick, as last advanced by [`AlarmTable::advance`].
    pub fn now(&self) -> u64 {
        self.tick.load(AtomicOrdering::Relaxed)
    }

    /// Advances the tick counter by one. Called once per real tick, before
    /// [`AlarmTable::drain_due`].
    pub fn advance(&self) -> u64 {
        self.tick.fetch_add(1, AtomicOrdering::Relaxed) + 1
    }

    /// Registers a one-shot alarm to fire `delay` from now, rounded to the
    /// nearest tick with a floor of one tick (spec §4.4). `handler` must not
    /// block — it runs synchronously from inside the clock handler.
    pub fn register<F>(&mut self, delay: Duration, handler: F) -> AlarmId
    where
        F: FnOnce() + Send + 'static,
    {
        let period_ms = self.period.as_millis().max(1) as u64;
        let delay_ms = delay.as_millis() as u64;
        let mut ticks = (delay_ms + period_ms / 2) / period_ms;
        if ticks == 0 {
            ticks = 1;
        }

        let id = AlarmId(self.next_id);
        self.next_id += 1;
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.pending.push(Alarm {
            id,
            target_tick: self.now() + ticks,
            sequence,
            handler: Box::new(handler),
        });
        id
    }

    /// Removes a pending alarm before it fires. Returns `true` if the alarm
    /// was still pending and was removed, `false` if it had already fired or
    /// is unknown (spec §4.4's `deregister`, with the return polarity
    /// flipped to "cancelled successfully" — see `SPEC_FULL.md` §C).
    pub fn deregister(&mut self, id: AlarmId) -> bool {
        let before = self.pending.len();
        // BinaryHeap has no direct removal API; rebuild without the target.
        // Alarm tables are small (bounded by in-flight sleeps/retransmits),
        // so this is not a hot path worth a more specialized structure.
        let remaining: Vec<Alarm> = self.pending.drain().filter(|a| a.id != id).collect();
        self.pending = remaining.into_iter().collect();
        self.pending.len() != before
    }

    /// Removes every alarm whose target tick is at or before the current
    /// tick, in non-decreasing order of target tick (spec §4.4, §8 invariant
    /// 6 and scenario 8), and hands their handlers back instead of running
    /// them. Handlers routinely re-enter the kernel lock that guards this
    /// table (registering another alarm, waking a semaphore, starting a
    /// thread), so the caller must invoke them only after releasing it.
    pub fn drain_due(&mut self) -> Vec<Box<dyn FnOnce() + Send>> {
        let now = self.now();
        let mut due = Vec::new();
        while let Some(next) = self.pending.peek() {
            if next.target_tick > now {
                break;
            }
            due.push(self.pending.pop().expect("peeked Some").handler);
        }
        due
    }

    /// `true` if any pending alarm's target tick is still in the future
    /// relative to `now` — the invariant §8 property 3 checks.
    #[cfg(test)]
    pub fn all_targets_future(&self, now: u64) -> bool {
        self.pending.iter().all(|a| a.target_tick > now)
    }
}

/// Drives the alarm table's tick counter from an external periodic source.
///
/// This is the §4.1/§6 "tick source" collaborator: out of scope for the
/// core's correctness, specified only by interface. The default hosted
/// implementation lives in [`crate::sys`] on platforms with `SIGALRM`.
pub trait TickSource {
    /// Arms the tick source so that `on_tick` runs approximately every
    /// `period`. Implementations must keep `on_tick` itself minimal: the
    /// callback increments the shared tick counter and requests that the
    /// scheduler reconsider at its next safe point, it does not run the full
    /// clock handler inline (see `SPEC_FULL.md` §B).
    fn start(&mut self, period: Duration, on_tick: Box<dyn Fn() + Send + Sync>);
}
