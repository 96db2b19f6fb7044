mod common;

use common::{recv_timeout, spawn_kernel, DEFAULT_TIMEOUT};
use minithreads::Semaphore;
use std::sync::mpsc;
use std::sync::Arc;

#[test]
fn producer_consumer_exchange_completes() {
    let (tx, rx) = mpsc::channel();
    let items = Arc::new(std::sync::Mutex::new(Vec::new()));
    let has_item = Arc::new(Semaphore::new());
    has_item.initialize(0);

    spawn_kernel(move || {
        let producer_items = Arc::clone(&items);
        let producer_sem = Arc::clone(&has_item);
        minithreads::fork(move || {
            for value in 0..10 {
                producer_items.lock().unwrap().push(value);
                producer_sem.v();
            }
        })
        .unwrap();

        minithreads::fork(move || {
            let mut consumed = Vec::new();
            while consumed.len() < 10 {
                has_item.p();
                let value = items.lock().unwrap().pop().expect("producer already signaled");
                consumed.push(value);
            }
            tx.send(consumed).unwrap();
        })
        .unwrap();
    });

    let mut consumed = recv_timeout(&rx, DEFAULT_TIMEOUT);
    consumed.sort_unstable();
    assert_eq!(consumed, (0..10).collect::<Vec<_>>());
}
