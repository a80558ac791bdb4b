use futures_util::try_join;
use sysio::{
    block_on,
    fs::pipe,
    net::{TcpListener, TcpStream},
};

// Pipes and sockets multiplex through the same per-thread queue.
#[test]
fn pipe_and_socket_share_one_queue() {
    block_on(async {
        let (rx, tx) = pipe::pipe_async().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, (server, _)) =
            try_join!(TcpStream::connect(addr), listener.accept()).unwrap();

        tx.write_all("through the pipe").await.0.unwrap();
        client.send_all("through the socket").await.0.unwrap();

        let (n, buf) = rx.read(Vec::with_capacity(32)).await.unwrap();
        assert_eq!(&buf[..n], b"through the pipe");
        let (n, buf) = server.recv(Vec::with_capacity(32)).await.unwrap();
        assert_eq!(&buf[..n], b"through the socket");
    });
}

#[test]
fn queues_are_independent_per_thread() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                block_on(async move {
                    let (rx, tx) = pipe::pipe_async().unwrap();
                    tx.write_all(vec![i as u8; 128]).await.0.unwrap();
                    let (n, buf) = rx.read_exact(Vec::with_capacity(128)).await.unwrap();
                    assert_eq!(n, 128);
                    assert!(buf.iter().all(|&b| b == i as u8));
                })
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
