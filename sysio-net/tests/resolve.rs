use std::net::{IpAddr, Ipv4Addr};

use sysio_net::{resolve, Family, GaiError};

#[test]
fn numeric_host_passes_through() {
    let addrs = resolve("127.0.0.1", 8080, None).unwrap();
    assert_eq!(addrs.len(), 1);
    assert_eq!(addrs[0].ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(addrs[0].port(), 8080);
}

#[test]
fn localhost_resolves_with_the_requested_port() {
    let addrs = resolve("localhost", 80, None).unwrap();
    assert!(!addrs.is_empty());
    assert!(addrs.iter().all(|a| a.port() == 80));
    assert!(addrs.iter().all(|a| a.ip().is_loopback()));
}

#[test]
fn family_mismatch_is_an_incompatible_endpoint() {
    let err = resolve("127.0.0.1", 80, Some(Family::V6)).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::AddrNotAvailable);
}

#[test]
fn family_filter_keeps_matching_endpoints() {
    let addrs = resolve("127.0.0.1", 80, Some(Family::V4)).unwrap();
    assert!(addrs.iter().all(|a| a.is_ipv4()));
}

#[test]
fn unresolvable_names_preserve_the_resolver_code() {
    // Some environments wildcard unknown names; only check the error shape
    // when the lookup actually fails.
    if let Err(err) = resolve("name.invalid.sysio.test", 80, None) {
        // Either the platform resolver code is carried verbatim, or the
        // failure was reported as a system error; both are acceptable.
        if let Some(gai) = err.get_ref().and_then(|e| e.downcast_ref::<GaiError>()) {
            assert_ne!(gai.code, 0);
        }
    }
}
