//! A cooperative user-level threading kernel with an integrated reliable
//! networking stack.
//!
//! `minithreads` schedules its own "green" threads with a four-level
//! feedback queue, preempted by a tick clock, and offers counting
//! semaphores, one-shot alarms, unreliable datagram messaging, and a
//! reliable connection-oriented stream transport on top of a single
//! transceiver collaborator. The whole system runs on one OS thread except
//! for the transceiver's own packet reader (spec §5 "single logical
//! processor").
//!
//! ```no_run
//! fn main() -> minithreads::Result<()> {
//!     minithreads::system_initialize(|| {
//!         minithreads::fork(|| println!("hello from a green thread")).unwrap();
//!     })
//! }
//! ```

mod clock;
mod error;
mod kernel;
mod ports;
mod sched;
mod sync;
mod sys;
mod thread;
mod wire;

#[cfg(feature = "net")]
mod transceiver;
#[cfg(feature = "net")]
pub mod net;

pub use clock::TickSource;
pub use error::{Error, Result};
pub use kernel::{
    create, fork, fork_named, self_id, set_interrupt_level, sleep_with_timeout, start,
    system_initialize, system_initialize_with, stop, yield_now, InterruptLevel,
};
pub use sync::{Mutex, MutexGuard, Semaphore};
pub use thread::{Status, ThreadId};
pub use wire::Address;

#[cfg(feature = "net")]
pub use transceiver::{Transceiver, UdpTransceiver};
