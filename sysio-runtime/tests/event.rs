use sysio_runtime::{block_on, event::Event, spawn};

#[test]
fn notify_resolves_the_waiter() {
    block_on(async {
        let event = Event::new();
        let handle = event.handle();
        let notifier = spawn(async move {
            handle.notify();
        });
        event.wait().await;
        notifier.await;
    });
}

#[test]
fn notify_before_wait_is_not_lost() {
    block_on(async {
        let event = Event::new();
        event.handle().notify();
        event.wait().await;
    });
}
