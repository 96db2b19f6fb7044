//! The network demultiplexer: the single entry point the transceiver calls
//! for every inbound packet, routing by protocol tag to the datagram or
//! stream layer (spec §4.5/§4.6 "Demultiplex", `SPEC_FULL.md` §F/§G).
//!
//! Grounded on `examples/original_source/Project4/Project4/common.c`'s
//! `common_network_handler`, which switches on `header->protocol` the same
//! way after a runt-packet size check.

use crate::net::{datagram, stream};
use crate::wire::{
    Address, DatagramHeader, ReliableHeader, DATAGRAM_HEADER_LEN, PROTOCOL_MINIDATAGRAM,
    PROTOCOL_MINISTREAM, RELIABLE_HEADER_LEN,
};

/// Installed as the default [`crate::transceiver::UdpTransceiver`]'s packet
/// callback by [`crate::net::initialize`]. Runs on the transceiver's reader
/// thread; every branch below is written to never block.
pub(crate) fn network_handler(_from: Address, packet: &[u8]) {
    if packet.len() < DATAGRAM_HEADER_LEN {
        log::warn!("dropping runt packet of {} bytes", packet.len());
        return;
    }
    match packet[0] {
        PROTOCOL_MINIDATAGRAM => {
            let Some(header) = DatagramHeader::unpack(packet) else {
                log::warn!("dropping malformed datagram header");
                return;
            };
            datagram::demultiplex(header, &packet[DATAGRAM_HEADER_LEN..]);
        }
        PROTOCOL_MINISTREAM => {
            if packet.len() < RELIABLE_HEADER_LEN {
                log::warn!("dropping runt stream packet of {} bytes", packet.len());
                return;
            }
            let Some(header) = ReliableHeader::unpack(packet) else {
                log::warn!("dropping malformed stream header");
                return;
            };
            stream::demultiplex(header, &packet[RELIABLE_HEADER_LEN..]);
        }
        other => {
            log::warn!("dropping packet with unknown protocol tag {other}");
        }
    }
}
