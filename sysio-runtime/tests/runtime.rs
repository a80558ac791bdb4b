use sysio_runtime::{block_on, spawn};

#[test]
fn block_on_returns_the_value() {
    let answer = block_on(async { 42 });
    assert_eq!(answer, 42);
}

#[test]
fn spawned_tasks_run_interleaved() {
    let total = block_on(async {
        let a = spawn(async { 1 });
        let b = spawn(async { 2 });
        a.await + b.await
    });
    assert_eq!(total, 3);
}

#[test]
fn nested_block_on_calls_in_sequence() {
    assert_eq!(block_on(async { 1 }), 1);
    assert_eq!(block_on(async { 2 }), 2);
}
