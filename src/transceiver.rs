//! The network transceiver (spec §4.1/§6 "external collaborator"), realized
//! over `std::net::UdpSocket` the way `mio::net::UdpSocket` wraps the same
//! primitive for readiness-based I/O — except this crate owns its own
//! scheduler, so the default transceiver pushes incoming packets into the
//! demultiplexer from a dedicated reader thread instead of exposing a
//! pollable handle.

use crate::wire::Address;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::thread;

/// What the core needs from the network, independent of transport: send a
/// fully assembled packet, and register the callback that receives
/// incoming ones. A test harness can substitute an in-process loopback
/// implementation that never touches a real socket.
pub trait Transceiver: Send + Sync {
    /// Sends `header` followed by `payload` as one packet to `to`. Returns
    /// the number of payload bytes accepted, or an I/O error.
    fn send(&self, to: Address, header: &[u8], payload: &[u8]) -> io::Result<usize>;

    /// This transceiver's own address, used to stamp outgoing packets'
    /// source address field.
    fn local_address(&self) -> Address;
}

/// The default hosted transceiver: a non-blocking UDP socket plus a reader
/// thread that feeds `on_packet` for every datagram received. Mirrors the
/// original's `network_initialize(handler)` / `network_send_pkt` pair.
pub struct UdpTransceiver {
    socket: Arc<UdpSocket>,
    local: Address,
}

impl UdpTransceiver {
    /// Binds to `port` on all interfaces and starts the reader thread.
    /// `on_packet` is called from that thread for every well-formed UDP
    /// datagram received — it must not block, since it runs on the
    /// dedicated reader thread, not on a green thread (mirrors the
    /// original's `network_interrupt_arg_t` callback running at interrupt
    /// time).
    pub fn bind(port: u16, on_packet: impl Fn(Address, &[u8]) + Send + 'static) -> io::Result<UdpTransceiver> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        let local_port = socket.local_addr()?.port();
        let socket = Arc::new(socket);

        let reader = Arc::clone(&socket);
        thread::Builder::new()
            .name("minithreads-net-reader".into())
            .spawn(move || {
                let mut buf = [0u8; crate::wire::MAX_NETWORK_PKT_SIZE];
                loop {
                    match reader.recv_from(&mut buf) {
                        Ok((len, SocketAddr::V4(from))) => {
                            let addr = Address([u32::from(*from.ip()), from.port() as u32]);
                            on_packet(addr, &buf[..len]);
                        }
                        Ok((_, SocketAddr::V6(_))) => {
                            log::warn!("dropping IPv6 datagram, this transceiver is IPv4-only");
                        }
                        Err(e) => {
                            log::warn!("network reader thread exiting: {e}");
                            return;
                        }
                    }
                }
            })
            .expect("failed to spawn network reader thread");

        // A `network_address_t` is an (IP, UDP port) pair — `Address.0[1]`
        // is the OS-level transport port, distinct from the
        // application-level datagram/stream ports the header carries.
        Ok(UdpTransceiver {
            socket,
            local: Address([u32::from(Ipv4Addr::LOCALHOST), local_port as u32]),
        })
    }
}

impl Transceiver for UdpTransceiver {
    fn send(&self, to: Address, header: &[u8], payload: &[u8]) -> io::Result<usize> {
        let mut packet = Vec::with_capacity(header.len() + payload.len());
        packet.extend_from_slice(header);
        packet.extend_from_slice(payload);
        let dest = SocketAddrV4::new(Ipv4Addr::from(to.0[0]), to.0[1] as u16);
        self.socket.send_to(&packet, dest)?;
        Ok(payload.len())
    }

    fn local_address(&self) -> Address {
        self.local
    }
}
