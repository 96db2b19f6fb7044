mod common;

use common::{recv_timeout, spawn_kernel, DEFAULT_TIMEOUT};
use std::sync::mpsc;

#[test]
fn create_leaves_a_thread_waiting_until_started() {
    let (tx, rx) = mpsc::channel();

    spawn_kernel(move || {
        let id = minithreads::create(move || {
            tx.send("ran").unwrap();
        })
        .unwrap();

        // Give the scheduler a few chances to run something before we
        // start the created thread — it must not run on its own.
        for _ in 0..5 {
            minithreads::yield_now();
        }
        minithreads::start(id);
    });

    assert_eq!(recv_timeout(&rx, DEFAULT_TIMEOUT), "ran");
}
