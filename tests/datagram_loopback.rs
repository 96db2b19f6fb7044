mod common;

use common::{recv_timeout, spawn_kernel, DEFAULT_TIMEOUT};
use minithreads::net::datagram;
use std::sync::mpsc;

#[test]
fn unbound_port_receives_what_a_bound_port_sends() {
    let (tx, rx) = mpsc::channel();

    spawn_kernel(move || {
        minithreads::net::initialize(0).expect("bind failed");
        let addr = minithreads::net::local_address();

        minithreads::fork(move || {
            let receiving = datagram::create_unbound(7000).unwrap();
            let mut buf = [0u8; 64];
            let (n, _reply) = datagram::receive(&receiving, &mut buf).unwrap();
            tx.send(buf[..n].to_vec()).unwrap();
        })
        .unwrap();

        minithreads::fork(move || {
            let sending = datagram::create_bound(addr, 7000).unwrap();
            let source = datagram::create_unbound(7001).unwrap();
            datagram::send(&source, &sending, b"over the wire").unwrap();
        })
        .unwrap();
    });

    assert_eq!(recv_timeout(&rx, DEFAULT_TIMEOUT), b"over the wire");
}
