//! The reliable stream transport (spec §4.6), grounded on
//! `examples/original_source/Project4/Project4/minisocket.c`: same
//! three-way handshake, same seven-try retransmission schedule, same
//! carry-over receive buffer. Unlike every other piece of shared state in
//! this crate, a socket's fields are mutated both from the kernel's own
//! thread (handshake, send, close) and from the transceiver's reader thread
//! (the demultiplexer), so `Inner` lives behind a real [`std::sync::Mutex`]
//! rather than the interrupt-disable discipline [`crate::sync::Semaphore`]
//! relies on.

use crate::clock::AlarmId;
use crate::kernel;
use crate::net::active_transceiver;
use crate::ports::LOW_PORT_MAX;
use crate::sync::Semaphore;
use crate::transceiver::Transceiver;
use crate::wire::{
    Address, DatagramHeader, MsgType, ReliableHeader, MAX_STREAM_FRAGMENT, PROTOCOL_MINISTREAM,
    RELIABLE_HEADER_LEN,
};
use crate::{Error, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const RETRY_DELAYS_MS: [u64; 7] = [100, 200, 400, 800, 1600, 3200, 6400];
const LINGER: Duration = Duration::from_millis(15_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitStatus {
    WaitSyn,
    WaitSynAck,
    WaitAck,
    WaitFin, // never assigned
    WaitNone,
    GotSyn,
    GotSynAck,
    GotAck,
    GotFin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Unconnected,
    Connected,
    Closing,
    Closed,
}

struct Inner {
    conn_state: ConnState,
    wait_status: WaitStatus,
    remote_addr: Address,
    remote_port: u16,
    seq: u32,
    ack: u32,
    wait_ack: u32,
    num_alarm_fired: u32,
    retry_alarm: Option<AlarmId>,
}

/// A connected (or connecting) stream endpoint. Always held behind an
/// `Arc` — the retransmission alarm handler needs its own owned reference
/// to call back into the socket from the kernel thread.
pub struct Socket {
    local_port: u16,
    is_server: bool,
    inner: Mutex<Inner>,
    wait_sema: Semaphore,
    can_send: Semaphore,
    packet_ready: Semaphore,
    close_wait: Semaphore,
    incoming: Mutex<VecDeque<Vec<u8>>>,
    carry_over: Mutex<Option<(Vec<u8>, usize)>>,
}

impl Socket {
    fn new(local_port: u16, is_server: bool, initial_wait: WaitStatus) -> Socket {
        let wait_sema = Semaphore::new();
        wait_sema.initialize(0);
        let can_send = Semaphore::new();
        can_send.initialize(1);
        let packet_ready = Semaphore::new();
        packet_ready.initialize(0);
        let close_wait = Semaphore::new();
        close_wait.initialize(0);
        Socket {
            local_port,
            is_server,
            inner: Mutex::new(Inner {
                conn_state: ConnState::Unconnected,
                wait_status: initial_wait,
                remote_addr: Address([0, 0]),
                remote_port: 0,
                seq: 0,
                ack: if is_server { 1 } else { 0 },
                wait_ack: 0,
                num_alarm_fired: 0,
                retry_alarm: None,
            }),
            wait_sema,
            can_send,
            packet_ready,
            close_wait,
            incoming: Mutex::new(VecDeque::new()),
            carry_over: Mutex::new(None),
        }
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    fn header(&self, msg_type: MsgType) -> ReliableHeader {
        let inner = self.inner.lock().unwrap();
        ReliableHeader {
            datagram: DatagramHeader {
                protocol: PROTOCOL_MINISTREAM,
                src_addr: active_transceiver().local_address(),
                src_port: self.local_port,
                dst_addr: inner.remote_addr,
                dst_port: inner.remote_port,
            },
            msg_type,
            seq: inner.seq,
            ack: inner.ack,
        }
    }

    fn wake_all(&self) {
        self.wait_sema.wake_all();
        self.can_send.wake_all();
        self.packet_ready.wake_all();
        self.close_wait.wake_all();
    }
}

fn pack_and_send(header: &ReliableHeader, payload: &[u8]) -> std::io::Result<usize> {
    let mut buf = [0u8; RELIABLE_HEADER_LEN];
    header.pack(&mut buf);
    active_transceiver().send(header.datagram.dst_addr, &buf, payload)
}

/// The retransmission procedure (spec §4.6 "Retransmission"): sends
/// `payload` as `msg_type`, re-sending on each alarm fire until either
/// `what_to_wait` is satisfied or seven tries elapse. `None` on failure —
/// callers choose the error variant (`NoServer` during a handshake,
/// `SendError` mid-stream).
fn send_one_packet(
    socket: &Arc<Socket>,
    msg_type: MsgType,
    payload: &[u8],
    what_to_wait: WaitStatus,
) -> Option<usize> {
    {
        let mut inner = socket.inner.lock().unwrap();
        inner.num_alarm_fired = 0;
        inner.wait_ack += payload.len() as u32;
    }
    let header = socket.header(msg_type);
    let mut num_send_tries = 0usize;
    loop {
        let fired = socket.inner.lock().unwrap().num_alarm_fired as usize;
        if fired >= RETRY_DELAYS_MS.len() {
            return None;
        }
        if num_send_tries == fired {
            pack_and_send(&header, payload).ok()?;
            let for_alarm = Arc::clone(socket);
            let delay = Duration::from_millis(RETRY_DELAYS_MS[num_send_tries]);
            let id = kernel::register_alarm(delay, move || {
                let should_wake = {
                    let mut inner = for_alarm.inner.lock().unwrap();
                    inner.num_alarm_fired += 1;
                    matches!(
                        inner.wait_status,
                        WaitStatus::WaitSyn | WaitStatus::WaitSynAck | WaitStatus::WaitAck
                    )
                };
                if should_wake {
                    for_alarm.wait_sema.v();
                }
            });
            socket.inner.lock().unwrap().retry_alarm = Some(id);
            num_send_tries += 1;
        }

        socket.wait_sema.p();
        let mut inner = socket.inner.lock().unwrap();
        if matches!(inner.conn_state, ConnState::Closing | ConnState::Closed) {
            return None;
        }
        if inner.wait_status == what_to_wait && inner.seq == inner.wait_ack {
            if let Some(alarm) = inner.retry_alarm.take() {
                if num_send_tries > inner.num_alarm_fired as usize {
                    drop(inner);
                    kernel::deregister_alarm(alarm);
                }
            }
            return Some(payload.len());
        }
    }
}

/// Blocks accepting connections on `port` (spec §4.6 "Server" handshake).
/// `port` must be a server port number, [0, 32767].
pub fn listen(port: u16) -> Result<Arc<Socket>> {
    if port > LOW_PORT_MAX {
        return Err(Error::InvalidParams);
    }
    let socket = kernel::with_ports(|ports| {
        if ports.stream_servers.contains(port) {
            return Err(Error::PortInUse);
        }
        let socket = Arc::new(Socket::new(port, true, WaitStatus::WaitSyn));
        ports.stream_servers.insert(port, Arc::clone(&socket));
        Ok(socket)
    })?;

    loop {
        socket.wait_sema.p();
        {
            let mut inner = socket.inner.lock().unwrap();
            inner.wait_status = WaitStatus::WaitAck;
            inner.wait_ack = inner.seq + 1;
        }
        match send_one_packet(&socket, MsgType::SynAck, &[], WaitStatus::GotAck) {
            Some(_) => return Ok(socket),
            None => {
                let mut inner = socket.inner.lock().unwrap();
                inner.wait_status = WaitStatus::WaitSyn;
                inner.wait_ack = 0;
            }
        }
    }
}

/// Connects to a listening socket at `(addr, port)` (spec §4.6 "Client"
/// handshake).
pub fn connect(addr: Address, port: u16) -> Result<Arc<Socket>> {
    if port > LOW_PORT_MAX {
        return Err(Error::InvalidParams);
    }
    let local_port =
        kernel::with_ports(|ports| ports.stream_client_alloc.allocate().ok_or(Error::NoMorePorts))?;

    let socket = Arc::new(Socket::new(local_port, false, WaitStatus::WaitNone));
    {
        let mut inner = socket.inner.lock().unwrap();
        inner.remote_addr = addr;
        inner.remote_port = port;
        inner.wait_status = WaitStatus::WaitSynAck;
        inner.wait_ack = 1;
    }
    kernel::with_ports(|ports| ports.stream_clients.insert(local_port, Arc::clone(&socket)));

    match send_one_packet(&socket, MsgType::Syn, &[], WaitStatus::GotSynAck) {
        Some(_) => Ok(socket),
        None => {
            let busy = socket.inner.lock().unwrap().wait_status == WaitStatus::GotFin;
            kernel::with_ports(|ports| {
                ports.stream_clients.remove(local_port);
                ports.stream_client_alloc.free(local_port);
            });
            Err(if busy { Error::Busy } else { Error::NoServer })
        }
    }
}

/// Sends `payload`, fragmenting it to [`MAX_STREAM_FRAGMENT`]-byte packets
/// (spec §4.6 "Data transfer" / Send). Returns the number of bytes
/// actually accepted, which is less than `payload.len()` only if the
/// connection failed partway through.
pub fn send(socket: &Arc<Socket>, payload: &[u8]) -> Result<usize> {
    socket.can_send.p();
    let connected = socket.inner.lock().unwrap().conn_state == ConnState::Connected;
    if !connected {
        socket.can_send.v();
        return Err(Error::SendError);
    }

    let mut sent = 0;
    let mut remaining = payload;
    while !remaining.is_empty() {
        let chunk_len = remaining.len().min(MAX_STREAM_FRAGMENT);
        let chunk = &remaining[..chunk_len];
        socket.inner.lock().unwrap().wait_status = WaitStatus::WaitAck;
        match send_one_packet(socket, MsgType::Ack, chunk, WaitStatus::GotAck) {
            Some(n) => {
                sent += n;
                remaining = &remaining[n..];
            }
            None => break,
        }
    }
    socket.can_send.v();
    Ok(sent)
}

/// Reads from the carry-over slot if one exists, otherwise blocks for the
/// next packet (spec §4.6 "Data transfer" / Receive).
pub fn receive(socket: &Arc<Socket>, buf: &mut [u8]) -> Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }

    {
        let mut carry = socket.carry_over.lock().unwrap();
        if let Some((data, used)) = carry.as_mut() {
            let n = (data.len() - *used).min(buf.len());
            buf[..n].copy_from_slice(&data[*used..*used + n]);
            *used += n;
            if *used == data.len() {
                *carry = None;
            }
            return Ok(n);
        }
    }

    socket.packet_ready.p();
    if socket.inner.lock().unwrap().conn_state != ConnState::Connected {
        return Err(Error::ReceiveError);
    }
    let packet = kernel::with_interrupts_disabled(|| socket.incoming.lock().unwrap().pop_front())
        .expect("packet-ready semaphore signaled with an empty queue");
    let n = packet.len().min(buf.len());
    buf[..n].copy_from_slice(&packet[..n]);
    if n < packet.len() {
        *socket.carry_over.lock().unwrap() = Some((packet, n));
    }
    Ok(n)
}

/// Closes the socket (spec §4.6 "Close"): sends `FIN` and waits for its ack
/// if still connected, or waits out the peer's linger timer if the peer
/// already initiated the close. Either way, unlinks the socket from its
/// port table and wakes every thread blocked on it.
pub fn close(socket: &Arc<Socket>) {
    let already_closing = {
        let mut inner = socket.inner.lock().unwrap();
        match inner.conn_state {
            ConnState::Connected => {
                inner.conn_state = ConnState::Closing;
                inner.wait_status = WaitStatus::WaitAck;
                inner.wait_ack = inner.seq + 1;
                None
            }
            ConnState::Closing => Some(true),
            _ => Some(false),
        }
    };
    match already_closing {
        None => {
            send_one_packet(socket, MsgType::Fin, &[], WaitStatus::GotAck);
            socket.inner.lock().unwrap().conn_state = ConnState::Closed;
        }
        Some(true) => socket.close_wait.p(),
        Some(false) => {}
    }

    kernel::with_ports(|ports| {
        if socket.is_server {
            ports.stream_servers.remove(socket.local_port);
        } else {
            ports.stream_clients.remove(socket.local_port);
            ports.stream_client_alloc.free(socket.local_port);
        }
    });
    socket.wake_all();
}

fn remote_matches(inner: &Inner, src_addr: Address, src_port: u16) -> bool {
    inner.remote_addr.0 == src_addr.0 && inner.remote_port == src_port
}

fn reply(socket: &Socket, dst_addr: Address, dst_port: u16, msg_type: MsgType, seq: u32, ack: u32) {
    let header = ReliableHeader {
        datagram: DatagramHeader {
            protocol: PROTOCOL_MINISTREAM,
            src_addr: active_transceiver().local_address(),
            src_port: socket.local_port,
            dst_addr,
            dst_port,
        },
        msg_type,
        seq,
        ack,
    };
    let _ = pack_and_send(&header, &[]);
}

/// Called by the demultiplexer for every packet tagged
/// [`crate::wire::PROTOCOL_MINISTREAM`] (spec §4.6 "State machine summary").
/// Runs on the transceiver's reader thread; only ever writes socket state
/// through `inner`'s real mutex, and never blocks.
pub(crate) fn demultiplex(header: ReliableHeader, payload: &[u8]) {
    let dst_port = header.datagram.dst_port;
    let socket = kernel::with_ports(|ports| {
        if dst_port <= LOW_PORT_MAX {
            ports.stream_servers.get(dst_port)
        } else {
            ports.stream_clients.get(dst_port)
        }
    });
    let Some(socket) = socket else {
        log::warn!("dropping stream packet addressed to unbound port {dst_port}");
        return;
    };

    let src_addr = header.datagram.src_addr;
    let src_port = header.datagram.src_port;

    {
        let inner = socket.inner.lock().unwrap();
        if inner.conn_state == ConnState::Closed {
            return;
        }
        if inner.wait_status != WaitStatus::WaitSyn {
            if header.msg_type == MsgType::Syn {
                let (seq, ack) = (inner.seq, inner.ack);
                drop(inner);
                reply(&socket, src_addr, src_port, MsgType::Fin, seq, ack);
                return;
            }
            if !remote_matches(&inner, src_addr, src_port) {
                return;
            }
        }
    }

    match header.msg_type {
        MsgType::Syn => {
            let mut inner = socket.inner.lock().unwrap();
            if inner.wait_status == WaitStatus::WaitSyn
                && inner.wait_ack == header.ack
                && payload.is_empty()
            {
                inner.remote_addr = src_addr;
                inner.remote_port = src_port;
                inner.wait_status = WaitStatus::GotSyn;
                drop(inner);
                socket.wait_sema.v();
            }
        }
        MsgType::SynAck => {
            let mut matched = false;
            {
                let mut inner = socket.inner.lock().unwrap();
                if inner.wait_status == WaitStatus::WaitSynAck
                    && inner.wait_ack == header.ack
                    && payload.is_empty()
                {
                    inner.conn_state = ConnState::Connected;
                    inner.seq = header.ack;
                    inner.ack += 1;
                    inner.wait_status = WaitStatus::GotSynAck;
                    matched = true;
                }
            }
            if matched {
                let (seq, ack) = {
                    let inner = socket.inner.lock().unwrap();
                    (inner.seq, inner.ack)
                };
                reply(&socket, src_addr, src_port, MsgType::Ack, seq, ack);
                socket.wait_sema.v();
            } else if socket.inner.lock().unwrap().conn_state == ConnState::Connected {
                let (seq, ack) = {
                    let inner = socket.inner.lock().unwrap();
                    (inner.seq, inner.ack)
                };
                reply(&socket, src_addr, src_port, MsgType::Ack, seq, ack);
            }
        }
        MsgType::Ack => {
            let data_len = payload.len() as u32;
            let mut woke_wait = false;
            {
                let mut inner = socket.inner.lock().unwrap();
                if inner.wait_status == WaitStatus::WaitAck && inner.wait_ack == header.ack {
                    if inner.conn_state == ConnState::Unconnected {
                        inner.conn_state = ConnState::Connected;
                    }
                    inner.seq = header.ack;
                    inner.wait_status = WaitStatus::GotAck;
                    woke_wait = true;
                }
            }
            if woke_wait {
                socket.wait_sema.v();
            }

            if data_len > 0 {
                let connected = socket.inner.lock().unwrap().conn_state == ConnState::Connected;
                if connected {
                    let mut enqueued = false;
                    let (seq, ack) = {
                        let mut inner = socket.inner.lock().unwrap();
                        if inner.ack == header.seq {
                            inner.ack += data_len;
                            enqueued = true;
                        }
                        (inner.seq, inner.ack)
                    };
                    if enqueued {
                        socket.incoming.lock().unwrap().push_back(payload.to_vec());
                        socket.packet_ready.v();
                    }
                    if ack == header.seq + data_len {
                        reply(&socket, src_addr, src_port, MsgType::Ack, seq, ack);
                    }
                }
            }
        }
        MsgType::Fin => {
            let just_closed;
            {
                let mut inner = socket.inner.lock().unwrap();
                just_closed = inner.conn_state == ConnState::Connected;
                if just_closed {
                    inner.conn_state = ConnState::Closing;
                    inner.ack += 1;
                    inner.wait_status = WaitStatus::GotFin;
                }
                if inner.conn_state == ConnState::Closing {
                    let (seq, ack) = (inner.seq, inner.ack);
                    drop(inner);
                    reply(&socket, src_addr, src_port, MsgType::Fin, seq, ack);
                }
            }
            if just_closed {
                // Wake every waiter now, not just `close_wait`: a thread
                // blocked in `receive`/`send` must see the peer's close as
                // soon as it happens, not only once the linger timer expires.
                socket.wake_all();
                let for_alarm = Arc::clone(&socket);
                kernel::register_alarm(LINGER, move || {
                    for_alarm.inner.lock().unwrap().conn_state = ConnState::Closed;
                    for_alarm.wake_all();
                });
            }
        }
    }
}
