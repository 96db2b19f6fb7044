//! The network stack: datagram messaging, the reliable stream transport,
//! and the demultiplexer that routes inbound packets between them (spec
//! §4.5/§4.6, modules 4/5/6/7).
//!
//! Gated behind the `net` Cargo feature so a caller who only wants the
//! scheduler, semaphores, and alarms can depend on this crate without
//! pulling in the transceiver's reader thread.

pub mod datagram;
pub mod demux;
pub mod stream;

use crate::transceiver::{Transceiver, UdpTransceiver};
use std::sync::{Arc, OnceLock};

static TRANSCEIVER: OnceLock<Arc<dyn Transceiver>> = OnceLock::new();

pub(crate) fn active_transceiver() -> &'static Arc<dyn Transceiver> {
    TRANSCEIVER
        .get()
        .expect("minithreads::net::initialize was never called")
}

/// Brings up the network stack: binds the default [`UdpTransceiver`] to
/// `port` and wires its inbound callback to [`demux::network_handler`].
/// The hosted analogue of the original's `network_initialize` +
/// `minimsg_initialize` + `minisocket_initialize` trio, called once from
/// [`crate::kernel::system_initialize`]'s application-level counterpart.
pub fn initialize(port: u16) -> crate::Result<()> {
    initialize_with(Arc::new(
        UdpTransceiver::bind(port, demux::network_handler).map_err(|_| crate::Error::SendError)?,
    ))
}

/// As [`initialize`], but with an explicit [`Transceiver`] — the seam tests
/// use to substitute an in-process loopback transceiver instead of a real
/// UDP socket.
pub fn initialize_with(transceiver: Arc<dyn Transceiver>) -> crate::Result<()> {
    TRANSCEIVER
        .set(transceiver)
        .unwrap_or_else(|_| panic!("minithreads::net::initialize called more than once"));
    Ok(())
}

/// This process's own network address, as stamped on outgoing packets.
/// Connecting a client socket to this address loops packets back through
/// the same transceiver, the basis of every same-process test and demo in
/// this crate.
pub fn local_address() -> crate::wire::Address {
    active_transceiver().local_address()
}
