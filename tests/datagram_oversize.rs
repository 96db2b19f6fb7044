mod common;

use common::{recv_timeout, spawn_kernel, DEFAULT_TIMEOUT};
use minithreads::net::datagram;
use minithreads::Error;
use std::sync::mpsc;

// Mirrors the wire format's compile-time cap on a single datagram's payload
// (`minithreads::wire::MINIMSG_MAX_MSG_SIZE`, not part of the public API).
const MINIMSG_MAX_MSG_SIZE: usize = 4096;

#[test]
fn send_rejects_a_payload_over_the_maximum_size() {
    let (tx, rx) = mpsc::channel();

    spawn_kernel(move || {
        minithreads::net::initialize(0).expect("bind failed");
        let addr = minithreads::net::local_address();

        minithreads::fork(move || {
            let sending = datagram::create_bound(addr, 7200).unwrap();
            let source = datagram::create_unbound(7201).unwrap();
            let oversize = vec![0u8; MINIMSG_MAX_MSG_SIZE + 1];
            tx.send(datagram::send(&source, &sending, &oversize)).unwrap();
        })
        .unwrap();
    });

    assert_eq!(recv_timeout(&rx, DEFAULT_TIMEOUT), Err(Error::InvalidParams));
}
