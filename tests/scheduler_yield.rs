mod common;

use common::{recv_timeout, spawn_kernel, DEFAULT_TIMEOUT};
use std::sync::mpsc;

#[test]
fn yield_now_lets_a_sibling_thread_make_progress() {
    let (tx, rx) = mpsc::channel();

    spawn_kernel(move || {
        minithreads::fork(move || {
            for i in 0..5 {
                minithreads::yield_now();
                tx.send(i).unwrap();
            }
        })
        .unwrap();
    });

    let seen: Vec<_> = (0..5).map(|_| recv_timeout(&rx, DEFAULT_TIMEOUT)).collect();
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}
