mod common;

use common::{recv_timeout, spawn_kernel_fast, DEFAULT_TIMEOUT};
use minithreads::net::stream;
use std::sync::mpsc;

#[test]
fn ten_parallel_streams_complete_without_cross_talk() {
    const STREAM_COUNT: u16 = 10;
    const PAYLOAD_LEN: usize = 5_000;
    let (tx, rx) = mpsc::channel();

    spawn_kernel_fast(move || {
        minithreads::net::initialize(0).expect("bind failed");
        let addr = minithreads::net::local_address();

        for offset in 0..STREAM_COUNT {
            let port = 8000 + offset;

            minithreads::fork(move || {
                let server = stream::listen(port).unwrap();
                let mut buf = vec![0u8; PAYLOAD_LEN];
                let mut received = 0;
                while received < PAYLOAD_LEN {
                    let n = stream::receive(&server, &mut buf[received..]).unwrap();
                    received += n;
                }
                stream::send(&server, &buf).unwrap();
                stream::close(&server);
            })
            .unwrap();

            let tx = tx.clone();
            minithreads::fork(move || {
                let payload: Vec<u8> = (0..PAYLOAD_LEN).map(|i| (i ^ offset as usize) as u8).collect();
                let client = stream::connect(addr, port).unwrap();

                let mut sent = 0;
                while sent < payload.len() {
                    sent += stream::send(&client, &payload[sent..]).unwrap();
                }

                let mut echoed = vec![0u8; PAYLOAD_LEN];
                let mut received = 0;
                while received < PAYLOAD_LEN {
                    let n = stream::receive(&client, &mut echoed[received..]).unwrap();
                    received += n;
                }
                stream::close(&client);
                tx.send((port, payload == echoed)).unwrap();
            })
            .unwrap();
        }
    });

    let mut seen = Vec::new();
    for _ in 0..STREAM_COUNT {
        seen.push(recv_timeout(&rx, DEFAULT_TIMEOUT));
    }
    for (port, matched) in seen {
        assert!(matched, "stream on port {port} echoed mismatched bytes");
    }
}
