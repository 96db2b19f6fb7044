// Ten server ports each accept and echo a large buffer back to a parallel
// client, all sharing one process and one transceiver — exercises the
// scheduler's feedback queue and the stream demultiplexer's per-socket
// routing under concurrency (spec's "ten parallel streams" scenario).

use minithreads::net::stream;
use minithreads::Result;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const FIRST_PORT: u16 = 80;
const STREAM_COUNT: u16 = 10;
const PAYLOAD_LEN: usize = 100_000;

fn main() -> Result<()> {
    env_logger::init();

    minithreads::system_initialize(move || {
        minithreads::net::initialize(0).expect("failed to bind the loopback transceiver");
        let addr = minithreads::net::local_address();
        let remaining = Arc::new(AtomicUsize::new(STREAM_COUNT as usize));

        for offset in 0..STREAM_COUNT {
            let port = FIRST_PORT + offset;

            minithreads::fork(move || {
                let server = stream::listen(port).expect("listen failed");
                let mut buf = vec![0u8; PAYLOAD_LEN];
                let mut received = 0;
                while received < PAYLOAD_LEN {
                    let n = stream::receive(&server, &mut buf[received..]).expect("receive failed");
                    if n == 0 {
                        break;
                    }
                    received += n;
                }
                stream::send(&server, &buf[..received]).expect("echo failed");
                stream::close(&server);
            })
            .unwrap();

            let remaining = Arc::clone(&remaining);
            minithreads::fork(move || {
                let mut rng = rand::rng();
                let payload: Vec<u8> = (0..PAYLOAD_LEN).map(|_| rng.random()).collect();
                let client = stream::connect(addr, port).expect("connect failed");

                let mut sent = 0;
                while sent < payload.len() {
                    sent += stream::send(&client, &payload[sent..]).expect("send failed");
                }

                let mut echoed = vec![0u8; PAYLOAD_LEN];
                let mut received = 0;
                while received < PAYLOAD_LEN {
                    let n = stream::receive(&client, &mut echoed[received..]).expect("receive failed");
                    if n == 0 {
                        break;
                    }
                    received += n;
                }
                stream::close(&client);

                assert_eq!(echoed, payload, "stream {port} echoed mismatched bytes");
                println!("stream {port}: {received} bytes echoed correctly");

                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    println!("all {STREAM_COUNT} streams completed without cross-talk");
                    std::process::exit(0);
                }
            })
            .unwrap();
        }
    })
    .unwrap();

    unreachable!("system_initialize never returns");
}
