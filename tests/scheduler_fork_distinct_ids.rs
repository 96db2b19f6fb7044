//! `minithreads::system_initialize` owns a process-wide singleton (spec §5's
//! "single logical processor"), so each scenario that needs a kernel gets
//! its own test binary rather than sharing one process with other tests.

mod common;

use common::{recv_timeout, spawn_kernel, DEFAULT_TIMEOUT};
use std::sync::mpsc;

#[test]
fn fork_runs_concurrently_and_assigns_distinct_ids() {
    let (tx, rx) = mpsc::channel();

    spawn_kernel(move || {
        let tx1 = tx.clone();
        minithreads::fork(move || {
            tx1.send(minithreads::self_id()).unwrap();
        })
        .unwrap();

        let tx2 = tx.clone();
        minithreads::fork(move || {
            tx2.send(minithreads::self_id()).unwrap();
        })
        .unwrap();
    });

    let first = recv_timeout(&rx, DEFAULT_TIMEOUT);
    let second = recv_timeout(&rx, DEFAULT_TIMEOUT);
    assert_ne!(first, second, "two forked threads must not share an id");
}
