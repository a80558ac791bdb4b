use std::net::SocketAddr;

use futures_util::try_join;
use sysio_buf::BufResult;
use sysio_net::{TcpListener, TcpStream};
use sysio_runtime::block_on;

fn local() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

#[test]
fn listeners_on_port_zero_get_distinct_ports() {
    let first = TcpListener::bind(local()).unwrap();
    let second = TcpListener::bind(local()).unwrap();

    let first_port = first.local_addr().unwrap().port();
    let second_port = second.local_addr().unwrap().port();
    assert_ne!(first_port, 0);
    assert_ne!(second_port, 0);
    assert_ne!(first_port, second_port);
}

#[test]
fn accept_connect_round_trip() {
    block_on(async {
        let listener = TcpListener::bind(local()).unwrap();
        let addr = listener.local_addr().unwrap();

        let (client, (server, peer)) =
            try_join!(TcpStream::connect(addr), listener.accept()).unwrap();
        assert_eq!(peer, client.local_addr().unwrap());
        assert_eq!(client.peer_addr().unwrap(), addr);

        client.send_all("hello from the client").await.0.unwrap();
        let (n, buf) = server.recv_exact(Vec::with_capacity(21)).await.unwrap();
        assert_eq!(n, 21);
        assert_eq!(buf, b"hello from the client");

        server.send_all("hello from the server").await.0.unwrap();
        let (_, buf) = client.recv_exact(Vec::with_capacity(21)).await.unwrap();
        assert_eq!(buf, b"hello from the server");
    });
}

// The server accepts and immediately closes. The client sees end-of-stream
// on read, and a large enough write fails once the reset arrives.
#[test]
fn write_after_peer_drop_fails() {
    block_on(async {
        let listener = TcpListener::bind(local()).unwrap();
        let addr = listener.local_addr().unwrap();

        let (client, (server, _)) =
            try_join!(TcpStream::connect(addr), listener.accept()).unwrap();
        drop(server);

        let (n, _) = client.recv(Vec::with_capacity(16)).await.unwrap();
        assert_eq!(n, 0);

        let mut payload = vec![0u8; 16 * 1024 * 1024];
        let mut failed = false;
        for _ in 0..10 {
            let BufResult(res, ret) = client.send_all(payload).await;
            payload = ret;
            if res.is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed, "writing into a closed connection kept succeeding");
    });
}

#[test]
fn shutdown_write_signals_eof() {
    block_on(async {
        let listener = TcpListener::bind(local()).unwrap();
        let addr = listener.local_addr().unwrap();

        let (client, (server, _)) =
            try_join!(TcpStream::connect(addr), listener.accept()).unwrap();

        client.send_all("bye").await.0.unwrap();
        client.shutdown(std::net::Shutdown::Write).unwrap();

        let (n, buf) = server.recv(Vec::with_capacity(8)).await.unwrap();
        assert_eq!(&buf[..n], b"bye");
        let (n, _) = server.recv(Vec::with_capacity(8)).await.unwrap();
        assert_eq!(n, 0);
    });
}

#[test]
fn connect_to_a_dead_port_fails() {
    block_on(async {
        // Bind and drop to get a port that very likely refuses.
        let listener = TcpListener::bind(local()).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = TcpStream::connect(addr).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused);
    });
}
