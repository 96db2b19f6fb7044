mod common;

use common::{recv_timeout, spawn_kernel_fast, DEFAULT_TIMEOUT};
use minithreads::net::stream;
use std::sync::mpsc;

#[test]
fn bulk_transfer_survives_fragmentation() {
    // Larger than one stream fragment, so `send`/`receive` must each loop
    // internally to move the whole buffer (spec §4.6 "Data transfer").
    const PAYLOAD_LEN: usize = 10_000;
    let (tx, rx) = mpsc::channel();

    spawn_kernel_fast(move || {
        minithreads::net::initialize(0).expect("bind failed");
        let addr = minithreads::net::local_address();

        minithreads::fork(move || {
            let server = stream::listen(9000).unwrap();
            let mut buf = vec![0u8; PAYLOAD_LEN];
            let mut received = 0;
            while received < PAYLOAD_LEN {
                let n = stream::receive(&server, &mut buf[received..]).unwrap();
                assert_ne!(n, 0);
                received += n;
            }
            stream::close(&server);
        })
        .unwrap();

        minithreads::fork(move || {
            let payload: Vec<u8> = (0..PAYLOAD_LEN).map(|i| i as u8).collect();
            let client = stream::connect(addr, 9000).unwrap();
            let mut sent = 0;
            while sent < payload.len() {
                sent += stream::send(&client, &payload[sent..]).unwrap();
            }
            stream::close(&client);
            tx.send(payload).unwrap();
        })
        .unwrap();
    });

    let sent = recv_timeout(&rx, DEFAULT_TIMEOUT);
    assert_eq!(sent.len(), PAYLOAD_LEN);
}
