mod common;

use common::{recv_timeout, spawn_kernel, DEFAULT_TIMEOUT};
use std::sync::mpsc;
use std::time::{Duration, Instant};

#[test]
fn sleep_with_timeout_blocks_for_roughly_the_requested_duration() {
    let (tx, rx) = mpsc::channel();
    let delay = Duration::from_millis(150);

    spawn_kernel(move || {
        minithreads::fork(move || {
            let start = Instant::now();
            minithreads::sleep_with_timeout(delay);
            tx.send(start.elapsed()).unwrap();
        })
        .unwrap();
    });

    let elapsed = recv_timeout(&rx, DEFAULT_TIMEOUT);
    assert!(elapsed >= delay, "slept for only {elapsed:?}, wanted at least {delay:?}");
    assert!(elapsed < delay * 5, "slept for {elapsed:?}, far longer than {delay:?}");
}
