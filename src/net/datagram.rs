//! Unreliable datagram messaging (spec §4.5), grounded on
//! `examples/original_source/Project4/Project4/minimsg.c`'s
//! `miniport_create_unbound`/`miniport_create_bound`/`minimsg_send`/
//! `minimsg_receive`.

use crate::kernel;
use crate::net::active_transceiver;
use crate::ports::LOW_PORT_MAX;
use crate::sync::Semaphore;
use crate::transceiver::Transceiver;
use crate::wire::{Address, DatagramHeader, DATAGRAM_HEADER_LEN, MINIMSG_MAX_MSG_SIZE, PROTOCOL_MINIDATAGRAM};
use crate::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct QueuedDatagram {
    from_addr: Address,
    from_port: u16,
    payload: Vec<u8>,
}

/// A receiving ("unbound") port: owns a packet queue and a ready semaphore.
/// Looked up by the demultiplexer by port number.
pub struct DatagramPort {
    port: u16,
    queue: Mutex<VecDeque<QueuedDatagram>>,
    ready: Semaphore,
}

impl DatagramPort {
    pub fn port(&self) -> u16 {
        self.port
    }
}

/// A sending ("bound") port: a remote endpoint plus an allocated number
/// private to its owner — nothing ever looks a sending port up by number,
/// so unlike [`DatagramPort`] it carries no queue or semaphore (spec §4.5
/// "sending ports are private to their allocator").
pub struct SendingPort {
    number: u16,
    remote_addr: Address,
    remote_port: u16,
}

impl SendingPort {
    pub fn number(&self) -> u16 {
        self.number
    }
}

/// Creates (or returns the existing) receiving port at `port`. `port` must
/// be in [0, 32767].
pub fn create_unbound(port: u16) -> Result<Arc<DatagramPort>> {
    if port > LOW_PORT_MAX {
        return Err(Error::InvalidParams);
    }
    kernel::with_ports(|ports| {
        if let Some(existing) = ports.datagram_receiving.get(port) {
            return Ok(existing);
        }
        let fresh = Arc::new(DatagramPort {
            port,
            queue: Mutex::new(VecDeque::new()),
            ready: Semaphore::new(),
        });
        fresh.ready.initialize(0);
        ports.datagram_receiving.insert(port, Arc::clone(&fresh));
        Ok(fresh)
    })
}

/// Allocates a sending port addressed at `(remote_addr, remote_port)`.
/// `remote_port` is opaque to the local allocator: it may name the remote
/// side's receiving port (when the caller is initiating) or a sending port
/// recovered from an inbound packet's source fields (when [`receive`] builds
/// a reply address), so no range check applies here — only local port
/// numbers this process hands out are constrained to a half of the space.
pub fn create_bound(remote_addr: Address, remote_port: u16) -> Result<SendingPort> {
    kernel::with_ports(|ports| {
        let number = ports.datagram_sending.allocate().ok_or(Error::NoMorePorts)?;
        Ok(SendingPort {
            number,
            remote_addr,
            remote_port,
        })
    })
}

/// Releases a receiving port's table slot, queue, and semaphore.
pub fn destroy_unbound(port: Arc<DatagramPort>) {
    kernel::with_ports(|ports| {
        ports.datagram_receiving.remove(port.port());
    });
}

/// Frees a sending port's number for reuse.
pub fn destroy_bound(port: SendingPort) {
    kernel::with_ports(|ports| ports.datagram_sending.free(port.number));
}

/// Sends `payload` from `source` (supplies the reply-to port number) to
/// `dest`'s remote endpoint.
pub fn send(source: &DatagramPort, dest: &SendingPort, payload: &[u8]) -> Result<usize> {
    if payload.len() > MINIMSG_MAX_MSG_SIZE {
        return Err(Error::InvalidParams);
    }
    let header = DatagramHeader {
        protocol: PROTOCOL_MINIDATAGRAM,
        src_addr: active_transceiver().local_address(),
        src_port: source.port,
        dst_addr: dest.remote_addr,
        dst_port: dest.remote_port,
    };
    let mut buf = [0u8; DATAGRAM_HEADER_LEN];
    header.pack(&mut buf);
    active_transceiver()
        .send(dest.remote_addr, &buf, payload)
        .map_err(|_| Error::SendError)
}

/// Blocks until a packet arrives at `port`, copies up to `buf.len()` bytes
/// into `buf`, and returns the byte count along with a freshly allocated
/// sending port addressed back at the packet's sender.
pub fn receive(port: &DatagramPort, buf: &mut [u8]) -> Result<(usize, SendingPort)> {
    port.ready.p();
    let datagram = kernel::with_interrupts_disabled(|| {
        port.queue
            .lock()
            .unwrap()
            .pop_front()
            .expect("ready semaphore signaled with an empty queue")
    });
    let n = buf.len().min(datagram.payload.len());
    buf[..n].copy_from_slice(&datagram.payload[..n]);
    let reply = create_bound(datagram.from_addr, datagram.from_port)?;
    Ok((n, reply))
}

/// Called by the demultiplexer for every packet tagged
/// [`PROTOCOL_MINIDATAGRAM`] (spec §4.5 "Demultiplex").
pub(crate) fn demultiplex(header: DatagramHeader, payload: &[u8]) {
    if header.dst_port > LOW_PORT_MAX {
        log::warn!("dropping datagram addressed to out-of-range port {}", header.dst_port);
        return;
    }
    let target = kernel::with_ports(|ports| ports.datagram_receiving.get(header.dst_port));
    let Some(target) = target else {
        log::warn!("dropping datagram addressed to unbound port {}", header.dst_port);
        return;
    };
    target.queue.lock().unwrap().push_back(QueuedDatagram {
        from_addr: header.src_addr,
        from_port: header.src_port,
        payload: payload.to_vec(),
    });
    target.ready.v();
}
