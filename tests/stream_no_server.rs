mod common;

use common::{recv_timeout, spawn_kernel_fast, DEFAULT_TIMEOUT};
use minithreads::net::stream;
use minithreads::Error;
use std::sync::mpsc;

#[test]
fn connect_to_an_unlistened_port_reports_no_server() {
    let (tx, rx) = mpsc::channel();

    spawn_kernel_fast(move || {
        minithreads::net::initialize(0).expect("bind failed");
        let addr = minithreads::net::local_address();

        minithreads::fork(move || {
            tx.send(stream::connect(addr, 6000).err()).unwrap();
        })
        .unwrap();
    });

    assert_eq!(recv_timeout(&rx, DEFAULT_TIMEOUT), Some(Error::NoServer));
}
