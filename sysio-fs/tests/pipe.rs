use sysio_fs::{
    pipe::{pipe, pipe_async},
    PartialWriteError,
};
use sysio_runtime::{block_on, spawn};

#[test]
fn read_returns_zero_at_eof() {
    let (rx, tx) = pipe().unwrap();
    drop(tx);
    let mut buf = [0u8; 10];
    assert_eq!(rx.read(&mut buf).unwrap(), 0);
}

#[test]
fn write_to_a_closed_reader_fails_with_nothing_transferred() {
    let (rx, tx) = pipe().unwrap();
    drop(rx);
    let err = tx.write_all(b"does not arrive").unwrap_err();
    let partial = err
        .get_ref()
        .and_then(|e| e.downcast_ref::<PartialWriteError>())
        .expect("the error should carry the transferred count");
    assert_eq!(partial.transferred, 0);
}

#[test]
fn threaded_round_trip_until_eof() {
    let (rx, tx) = pipe().unwrap();
    let payload: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
    let expected = payload.clone();

    let writer = std::thread::spawn(move || {
        tx.write_all(&payload).unwrap();
    });

    let mut collected = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = rx.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&buf[..n]);
    }
    writer.join().unwrap();
    assert_eq!(collected, expected);
}

#[test]
fn async_round_trip() {
    block_on(async {
        let (rx, tx) = pipe_async().unwrap();
        tx.write_all("ping").await.0.unwrap();
        let (n, buf) = rx.read(Vec::with_capacity(16)).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, b"ping");
    });
}

#[test]
fn async_read_exact_waits_for_the_full_buffer() {
    block_on(async {
        let (rx, tx) = pipe_async().unwrap();
        let writer = spawn(async move {
            tx.write_all("first").await.0.unwrap();
            tx.write_all("second").await.0.unwrap();
        });
        let (n, buf) = rx.read_exact(Vec::with_capacity(11)).await.unwrap();
        assert_eq!(n, 11);
        assert_eq!(buf, b"firstsecond");
        writer.await;
    });
}

// A writer and a reader interleaved through one queue, with a payload far
// beyond the pipe capacity.
#[test]
fn async_large_round_trip() {
    const PATTERN: &[u8] = b"!@#$%^TEST%$#@!\n";
    const REPEAT: usize = 2_000_000;

    block_on(async {
        let (rx, tx) = pipe_async().unwrap();
        let payload = PATTERN.repeat(REPEAT);
        let expected_len = payload.len();

        let writer = spawn(async move {
            let (written, _) = tx.write_all(payload).await.unwrap();
            written
            // tx drops here, signalling EOF to the reader
        });

        let mut collected = Vec::with_capacity(expected_len);
        loop {
            let (n, buf) = rx.read(Vec::with_capacity(1 << 16)).await.unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf);
        }
        assert_eq!(writer.await, expected_len);

        assert_eq!(collected.len(), expected_len);
        assert!(collected == PATTERN.repeat(REPEAT), "pipe corrupted the payload");
    });
}
