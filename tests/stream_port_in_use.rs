mod common;

use common::{recv_timeout, spawn_kernel_fast, DEFAULT_TIMEOUT};
use minithreads::net::stream;
use minithreads::Error;
use std::sync::mpsc;

#[test]
fn listen_rejects_a_port_already_bound_by_another_server() {
    let (tx, rx) = mpsc::channel();

    spawn_kernel_fast(move || {
        minithreads::net::initialize(0).expect("bind failed");

        minithreads::fork(move || {
            // No client ever connects, so this blocks forever waiting for a
            // SYN — which is exactly what we want: the port stays bound for
            // the rest of the test.
            let _first = stream::listen(6100).unwrap();
        })
        .unwrap();
        // Let the first thread reach `listen`'s blocking point (it
        // registers the port before it blocks) before the second tries the
        // same port.
        minithreads::yield_now();

        minithreads::fork(move || {
            tx.send(stream::listen(6100).err()).unwrap();
        })
        .unwrap();
    });

    assert_eq!(recv_timeout(&rx, DEFAULT_TIMEOUT), Some(Error::PortInUse));
}
