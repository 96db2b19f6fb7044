mod common;

use common::{recv_timeout, spawn_kernel, DEFAULT_TIMEOUT};
use minithreads::Semaphore;
use std::sync::mpsc;
use std::sync::Arc;

#[test]
fn v_wakes_waiters_in_fifo_order() {
    let (tx, rx) = mpsc::channel();
    let sem = Arc::new(Semaphore::new());
    sem.initialize(0);

    spawn_kernel(move || {
        for label in 0..3u32 {
            let sem = Arc::clone(&sem);
            let tx = tx.clone();
            minithreads::fork(move || {
                sem.p();
                tx.send(label).unwrap();
            })
            .unwrap();
            // Let each thread actually reach `p()` and block before the
            // next one is forked, so the blocking order matches fork order.
            minithreads::yield_now();
        }
        for _ in 0..3 {
            sem.v();
        }
    });

    let order: Vec<_> = (0..3).map(|_| recv_timeout(&rx, DEFAULT_TIMEOUT)).collect();
    assert_eq!(order, vec![0, 1, 2]);
}
