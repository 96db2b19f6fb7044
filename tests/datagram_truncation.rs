mod common;

use common::{recv_timeout, spawn_kernel, DEFAULT_TIMEOUT};
use minithreads::net::datagram;
use std::sync::mpsc;

#[test]
fn receive_truncates_into_a_short_buffer() {
    let (tx, rx) = mpsc::channel();

    spawn_kernel(move || {
        minithreads::net::initialize(0).expect("bind failed");
        let addr = minithreads::net::local_address();

        minithreads::fork(move || {
            let receiving = datagram::create_unbound(7100).unwrap();
            let mut buf = [0u8; 4];
            let (n, _reply) = datagram::receive(&receiving, &mut buf).unwrap();
            tx.send((n, buf.to_vec())).unwrap();
        })
        .unwrap();

        minithreads::fork(move || {
            let sending = datagram::create_bound(addr, 7100).unwrap();
            let source = datagram::create_unbound(7101).unwrap();
            datagram::send(&source, &sending, b"way too long for four bytes").unwrap();
        })
        .unwrap();
    });

    let (n, buf) = recv_timeout(&rx, DEFAULT_TIMEOUT);
    assert_eq!(n, 4);
    assert_eq!(&buf, b"way ");
}
