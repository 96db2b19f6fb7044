//! Wire formats for the datagram and stream layers (spec §4.5/§4.6).
//!
//! Big-endian pack/unpack, grounded on
//! `examples/original_source/P4/miniheader.c`'s
//! `pack_unsigned_int`/`pack_unsigned_short`/`pack_address` — this module is
//! the same byte-twiddling, just expressed with Rust's `to_be_bytes` instead
//! of hand-rolled shifts.

use std::net::Ipv4Addr;

/// An 8-byte network address: two big-endian `u32` words, matching the
/// original's `network_address_t` (`unsigned int[2]`). The default
/// transceiver maps this to an IPv4 address plus a spare word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u32; 2]);

impl Address {
    pub fn from_ipv4(addr: Ipv4Addr) -> Address {
        Address([u32::from(addr), 0])
    }

    pub fn to_ipv4(self) -> Ipv4Addr {
        Ipv4Addr::from(self.0[0])
    }
}

pub const PROTOCOL_MINIDATAGRAM: u8 = 1;
pub const PROTOCOL_MINISTREAM: u8 = 2;

/// Maximum bytes a single transceiver send carries, datagram header and
/// stream header alike (`SPEC_FULL.md` §F/§G: both layers share one
/// transceiver MTU).
pub const MAX_NETWORK_PKT_SIZE: usize = 4096;

/// Largest application payload a single datagram may carry.
pub const MINIMSG_MAX_MSG_SIZE: usize = 4096;

/// Bytes of header common to both protocols: tag + src addr + src port +
/// dst addr + dst port.
pub const DATAGRAM_HEADER_LEN: usize = 1 + 8 + 2 + 8 + 2;

/// Datagram header plus message type + seq + ack.
pub const RELIABLE_HEADER_LEN: usize = DATAGRAM_HEADER_LEN + 1 + 4 + 4;

/// Largest data-carrying fragment a stream packet can hold.
pub const MAX_STREAM_FRAGMENT: usize = MAX_NETWORK_PKT_SIZE - RELIABLE_HEADER_LEN;

/// The fields common to every packet this crate sends, independent of
/// protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramHeader {
    pub protocol: u8,
    pub src_addr: Address,
    pub src_port: u16,
    pub dst_addr: Address,
    pub dst_port: u16,
}

impl DatagramHeader {
    pub fn pack(&self, buf: &mut [u8; DATAGRAM_HEADER_LEN]) {
        buf[0] = self.protocol;
        buf[1..5].copy_from_slice(&self.src_addr.0[0].to_be_bytes());
        buf[5..9].copy_from_slice(&self.src_addr.0[1].to_be_bytes());
        buf[9..11].copy_from_slice(&self.src_port.to_be_bytes());
        buf[11..15].copy_from_slice(&self.dst_addr.0[0].to_be_bytes());
        buf[15..19].copy_from_slice(&self.dst_addr.0[1].to_be_bytes());
        buf[19..21].copy_from_slice(&self.dst_port.to_be_bytes());
    }

    pub fn unpack(buf: &[u8]) -> Option<DatagramHeader> {
        if buf.len() < DATAGRAM_HEADER_LEN {
            return None;
        }
        Some(DatagramHeader {
            protocol: buf[0],
            src_addr: Address([
                u32::from_be_bytes(buf[1..5].try_into().ok()?),
                u32::from_be_bytes(buf[5..9].try_into().ok()?),
            ]),
            src_port: u16::from_be_bytes(buf[9..11].try_into().ok()?),
            dst_addr: Address([
                u32::from_be_bytes(buf[11..15].try_into().ok()?),
                u32::from_be_bytes(buf[15..19].try_into().ok()?),
            ]),
            dst_port: u16::from_be_bytes(buf[19..21].try_into().ok()?),
        })
    }
}

/// Stream message type, carried as a single byte after the datagram
/// header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Syn,
    SynAck,
    Ack,
    Fin,
}

impl MsgType {
    fn to_byte(self) -> u8 {
        match self {
            MsgType::Syn => 0,
            MsgType::SynAck => 1,
            MsgType::Ack => 2,
            MsgType::Fin => 3,
        }
    }

    fn from_byte(b: u8) -> Option<MsgType> {
        match b {
            0 => Some(MsgType::Syn),
            1 => Some(MsgType::SynAck),
            2 => Some(MsgType::Ack),
            3 => Some(MsgType::Fin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReliableHeader {
    pub datagram: DatagramHeader,
    pub msg_type: MsgType,
    pub seq: u32,
    pub ack: u32,
}

impl ReliableHeader {
    pub fn pack(&self, buf: &mut [u8; RELIABLE_HEADER_LEN]) {
        let mut dgram = [0u8; DATAGRAM_HEADER_LEN];
        self.datagram.pack(&mut dgram);
        buf[..DATAGRAM_HEADER_LEN].copy_from_slice(&dgram);
        buf[DATAGRAM_HEADER_LEN] = self.msg_type.to_byte();
        let seq_off = DATAGRAM_HEADER_LEN + 1;
        buf[seq_off..seq_off + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[seq_off + 4..seq_off + 8].copy_from_slice(&self.ack.to_be_bytes());
    }

    pub fn unpack(buf: &[u8]) -> Option<ReliableHeader> {
        if buf.len() < RELIABLE_HEADER_LEN {
            return None;
        }
        let datagram = DatagramHeader::unpack(&buf[..DATAGRAM_HEADER_LEN])?;
        let msg_type = MsgType::from_byte(buf[DATAGRAM_HEADER_LEN])?;
        let seq_off = DATAGRAM_HEADER_LEN + 1;
        let seq = u32::from_be_bytes(buf[seq_off..seq_off + 4].try_into().ok()?);
        let ack = u32::from_be_bytes(buf[seq_off + 4..seq_off + 8].try_into().ok()?);
        Some(ReliableHeader {
            datagram,
            msg_type,
            seq,
            ack,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datagram_header_round_trips() {
        let header = DatagramHeader {
            protocol: PROTOCOL_MINIDATAGRAM,
            src_addr: Address([0x0a000001, 0]),
            src_port: 12345,
            dst_addr: Address([0x0a000002, 7]),
            dst_port: 54321,
        };
        let mut buf = [0u8; DATAGRAM_HEADER_LEN];
        header.pack(&mut buf);
        assert_eq!(DatagramHeader::unpack(&buf), Some(header));
    }

    #[test]
    fn reliable_header_round_trips() {
        let header = ReliableHeader {
            datagram: DatagramHeader {
                protocol: PROTOCOL_MINISTREAM,
                src_addr: Address([1, 2]),
                src_port: 100,
                dst_addr: Address([3, 4]),
                dst_port: 200,
            },
            msg_type: MsgType::SynAck,
            seq: 0,
            ack: 1,
        };
        let mut buf = [0u8; RELIABLE_HEADER_LEN];
        header.pack(&mut buf);
        assert_eq!(ReliableHeader::unpack(&buf), Some(header));
    }

    #[test]
    fn unpack_rejects_truncated_buffers() {
        assert_eq!(DatagramHeader::unpack(&[0u8; 3]), None);
        assert_eq!(ReliableHeader::unpack(&[0u8; DATAGRAM_HEADER_LEN]), None);
    }
}
