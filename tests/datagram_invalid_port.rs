mod common;

use common::{recv_timeout, spawn_kernel, DEFAULT_TIMEOUT};
use minithreads::net::datagram;
use minithreads::Error;
use std::sync::mpsc;

#[test]
fn create_unbound_rejects_a_high_range_port() {
    let (tx, rx) = mpsc::channel();

    spawn_kernel(move || {
        minithreads::net::initialize(0).expect("bind failed");
        minithreads::fork(move || {
            tx.send(datagram::create_unbound(40000).err()).unwrap();
        })
        .unwrap();
    });

    assert_eq!(recv_timeout(&rx, DEFAULT_TIMEOUT), Some(Error::InvalidParams));
}
