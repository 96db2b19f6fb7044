//! Port namespaces shared by the datagram and stream layers (spec §3 "Port
//! tables", §4.5/§4.6).
//!
//! Both layers split their 16-bit port space the same way: a low half
//! ([0, 32767]) of long-lived, explicitly numbered ports looked up by the
//! demultiplexer, and a high half ([32768, 65535]) of ephemeral ports handed
//! out by a monotonic counter that falls back to a bitmap scan once it runs
//! past the top of the range — grounded on
//! `examples/original_source/Project4/Project4/minisocket.c`'s
//! `minisocket_client_create`, which has exactly this two-phase structure.

use std::collections::HashMap;
use std::sync::Arc;

pub const LOW_PORT_MIN: u16 = 0;
pub const LOW_PORT_MAX: u16 = 32767;
pub const HIGH_PORT_MIN: u16 = 32768;
pub const HIGH_PORT_MAX: u16 = 65535;

/// Hands out numbers from [`HIGH_PORT_MIN`, `HIGH_PORT_MAX`]. The counter is
/// authoritative (and the bitmap is only kept in sync, never scanned) until
/// it would exceed the range; from then on only the bitmap is consulted.
/// Resolves `SPEC_FULL.md` §G's open question: the two structures can never
/// disagree because the counter is retired permanently the moment it
/// overflows, not merely tried-then-abandoned per allocation.
pub struct ClientPortAllocator {
    next: u32,
    counter_exhausted: bool,
    bitmap: Vec<bool>,
}

impl ClientPortAllocator {
    pub fn new() -> ClientPortAllocator {
        let span = (HIGH_PORT_MAX - HIGH_PORT_MIN) as usize + 1;
        ClientPortAllocator {
            next: 0,
            counter_exhausted: false,
            bitmap: vec![false; span],
        }
    }

    /// Returns the next free port number, or `None` if the range is full.
    pub fn allocate(&mut self) -> Option<u16> {
        if !self.counter_exhausted {
            let candidate = HIGH_PORT_MIN as u32 + self.next;
            self.next += 1;
            if HIGH_PORT_MIN as u32 + self.next > HIGH_PORT_MAX as u32 {
                self.counter_exhausted = true;
            }
            let idx = (candidate - HIGH_PORT_MIN as u32) as usize;
            self.bitmap[idx] = true;
            return Some(candidate as u16);
        }
        let idx = self.bitmap.iter().position(|used| !used)?;
        self.bitmap[idx] = true;
        Some(HIGH_PORT_MIN + idx as u16)
    }

    /// Marks `port` free again. `port` must be in the high range.
    pub fn free(&mut self, port: u16) {
        debug_assert!(port >= HIGH_PORT_MIN);
        let idx = (port - HIGH_PORT_MIN) as usize;
        self.bitmap[idx] = false;
    }
}

impl Default for ClientPortAllocator {
    fn default() -> Self {
        ClientPortAllocator::new()
    }
}

/// A registry of explicitly numbered entries (low-range ports, or
/// registered high-range ones like stream client sockets) looked up by the
/// demultiplexer.
pub struct PortRegistry<T> {
    entries: HashMap<u16, Arc<T>>,
}

impl<T> PortRegistry<T> {
    pub fn new() -> PortRegistry<T> {
        PortRegistry {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, port: u16) -> Option<Arc<T>> {
        self.entries.get(&port).cloned()
    }

    pub fn contains(&self, port: u16) -> bool {
        self.entries.contains_key(&port)
    }

    pub fn insert(&mut self, port: u16, value: Arc<T>) {
        self.entries.insert(port, value);
    }

    pub fn remove(&mut self, port: u16) -> Option<Arc<T>> {
        self.entries.remove(&port)
    }
}

impl<T> Default for PortRegistry<T> {
    fn default() -> Self {
        PortRegistry::new()
    }
}

/// All port state the kernel owns, behind its preemption gate (spec §5:
/// port-table mutation happens either with interrupts disabled or a mutex
/// semaphore — this crate picks the former, consistent with every other
/// kernel structure already living behind `Kernel`'s own gate).
#[cfg(feature = "net")]
pub struct PortTables {
    pub datagram_receiving: PortRegistry<crate::net::datagram::DatagramPort>,
    pub datagram_sending: ClientPortAllocator,
    pub stream_servers: PortRegistry<crate::net::stream::Socket>,
    pub stream_clients: PortRegistry<crate::net::stream::Socket>,
    pub stream_client_alloc: ClientPortAllocator,
}

#[cfg(feature = "net")]
impl PortTables {
    pub fn new() -> PortTables {
        PortTables {
            datagram_receiving: PortRegistry::new(),
            datagram_sending: ClientPortAllocator::new(),
            stream_servers: PortRegistry::new(),
            stream_clients: PortRegistry::new(),
            stream_client_alloc: ClientPortAllocator::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_hands_out_sequential_ports() {
        let mut alloc = ClientPortAllocator::new();
        assert_eq!(alloc.allocate(), Some(HIGH_PORT_MIN));
        assert_eq!(alloc.allocate(), Some(HIGH_PORT_MIN + 1));
    }

    #[test]
    fn freed_port_is_reused_only_after_counter_exhausts() {
        let mut alloc = ClientPortAllocator::new();
        let first = alloc.allocate().unwrap();
        alloc.free(first);
        // Counter is still authoritative: the next allocation is a fresh
        // number, not the one just freed.
        assert_ne!(alloc.allocate(), Some(first));
    }

    #[test]
    fn falls_back_to_bitmap_once_counter_overflows() {
        let mut alloc = ClientPortAllocator::new();
        for _ in HIGH_PORT_MIN..=HIGH_PORT_MAX {
            alloc.allocate().unwrap();
        }
        assert_eq!(alloc.allocate(), None);
        alloc.free(HIGH_PORT_MIN + 5);
        assert_eq!(alloc.allocate(), Some(HIGH_PORT_MIN + 5));
    }
}
