//! Endpoint layout round-trips.

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use socket2::SockAddr;

#[test]
fn v4_endpoint_round_trips_through_the_kernel_layout() {
    let addr: SocketAddr = "192.168.1.17:4242".parse().unwrap();
    let raw = SockAddr::from(addr);
    assert_eq!(raw.as_socket(), Some(addr));
}

#[test]
fn v6_endpoint_keeps_flow_and_scope() {
    let addr = SocketAddrV6::new(Ipv6Addr::new(0x20, 1, 0xd, 0xb8, 0, 0, 0, 1), 443, 7, 3);
    let raw = SockAddr::from(SocketAddr::V6(addr));
    let back = raw.as_socket().unwrap();
    match back {
        SocketAddr::V6(back) => {
            assert_eq!(back.ip(), addr.ip());
            assert_eq!(back.port(), addr.port());
            assert_eq!(back.flowinfo(), 7);
            assert_eq!(back.scope_id(), 3);
        }
        SocketAddr::V4(_) => panic!("family changed in the round trip"),
    }
}

#[test]
fn endpoint_accessors_return_the_inputs() {
    let addr = SocketAddrV4::new("255.255.127.1".parse().unwrap(), 65535);
    assert_eq!(addr.ip().octets(), [255, 255, 127, 1]);
    assert_eq!(addr.port(), 65535);
}

#[test]
fn v4_mapped_v6_formats_with_the_dotted_shortcut() {
    let ip = Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0xffff, 0x7f01);
    assert_eq!(ip.to_string(), "::ffff:255.255.127.1");
}
