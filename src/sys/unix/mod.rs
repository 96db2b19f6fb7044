//! Unix stack allocation and context switching.
//!
//! This is the concrete realization of the §4.1 "stack-switching thread
//! primitive" external collaborator: allocate a stack, prime it to enter a
//! chosen entry point, and swap machine context between two stack tops.
//! Hosted Rust has no stable stdlib facility for this, so it is built on
//! POSIX `ucontext.h` via `libc`, the same dependency `mio` already pulls in
//! for its `sys::unix` socket shims.

use std::io;
use std::mem::MaybeUninit;
use std::ptr;

mod ticker;
pub use ticker::IntervalTicker;

/// Helper macro mirroring `mio`'s own `syscall!`: run a libc call that
/// signals failure with `-1`, turning it into an `io::Result`.
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

/// Default stack size for a forked thread: 256 KiB, generous for a
/// cooperative green thread and small enough that tens of thousands of them
/// (see §8 scenario 5, 40,000 client ports) stay within a modest address
/// space footprint.
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("failed to allocate stack: {0}")]
    Allocate(#[source] io::Error),
    #[error("failed to capture initial machine context: {0}")]
    GetContext(#[source] io::Error),
}

/// Data smuggled into the trampoline through `makecontext`'s `int` argument
/// list, reassembled from two 32-bit halves (the classic technique for
/// passing a 64-bit pointer through `makecontext`'s variadic `int` args,
/// since POSIX only guarantees `int`-sized arguments are portable).
struct TrampolineArgs {
    body: Box<dyn FnOnce() + 'static>,
}

extern "C" fn trampoline(hi: u32, lo: u32) {
    let ptr = ((hi as u64) << 32 | lo as u64) as *mut TrampolineArgs;
    // SAFETY: `ptr` was produced by `Box::into_raw` in `Stack::initialize`
    // and is handed to exactly one trampoline invocation.
    let args = unsafe { Box::from_raw(ptr) };
    (args.body)();
    // The body never returns: user thread bodies are wrapped by the
    // scheduler's cleanup trampoline, which loops forever yielding to the
    // reaper. Reaching here would mean that contract was broken.
    unreachable!("minithreads: thread entry point returned");
}

/// An allocated, independently switchable machine stack.
///
/// Owns its backing memory; must not be moved once [`Stack::initialize`] has
/// been called, since the primed `ucontext_t` embeds the stack's address.
pub struct Stack {
    memory: Box<[u8]>,
    context: Box<libc::ucontext_t>,
    initialized: bool,
}

impl Stack {
    /// Allocates `size` bytes of stack memory. Does not yet prime it for
    /// execution; call [`Stack::initialize`] before the first [`switch`]
    /// into it.
    pub fn allocate(size: usize) -> Result<Stack, StackError> {
        let memory = vec![0u8; size].into_boxed_slice();
        let mut context = Box::new(unsafe { MaybeUninit::<libc::ucontext_t>::zeroed().assume_init() });
        // getcontext seeds the signal mask and other fields makecontext
        // does not initialize on its own.
        syscall!(getcontext(context.as_mut())).map_err(StackError::GetContext)?;
        Ok(Stack {
            memory,
            context,
            initialized: false,
        })
    }

    /// Primes the stack so that the first [`switch`] into it invokes `body`.
    /// `body` must not return (see [`trampoline`]); the scheduler's cleanup
    /// wrapper enforces this by looping into the reaper hand-off.
    pub fn initialize<F>(&mut self, body: F)
    where
        F: FnOnce() + 'static,
    {
        let args = Box::new(TrampolineArgs {
            body: Box::new(body),
        });
        let packed = Box::into_raw(args) as u64;
        let hi = (packed >> 32) as u32;
        let lo = (packed & 0xffff_ffff) as u32;

        self.context.uc_stack.ss_sp = self.memory.as_mut_ptr() as *mut libc::c_void;
        self.context.uc_stack.ss_size = self.memory.len();
        self.context.uc_stack.ss_flags = 0;
        self.context.uc_link = ptr::null_mut();

        // SAFETY: `trampoline` matches the two-`u32`-argument calling
        // convention `makecontext` is told to expect via `argc == 2`, and
        // `uc_stack` above points at memory this `Stack` owns for its
        // lifetime.
        unsafe {
            libc::makecontext(
                self.context.as_mut(),
                std::mem::transmute::<extern "C" fn(u32, u32), extern "C" fn()>(trampoline),
                2,
                hi,
                lo,
            );
        }
        self.initialized = true;
    }

    /// Saves the currently running context into `self` and restores `to`,
    /// resuming execution wherever `to` last left off (or at its primed
    /// entry point, if this is its first switch).
    ///
    /// # Safety
    ///
    /// Both `self` and `to` must be stacks that remain alive (not dropped,
    /// not moved) until some later switch restores them again or their
    /// owning thread reaches `DONE` and is reaped.
    pub unsafe fn switch(&mut self, to: &mut Stack) {
        debug_assert!(to.initialized, "switching into a stack that was never primed");
        libc::swapcontext(self.context.as_mut(), to.context.as_mut());
    }
}
