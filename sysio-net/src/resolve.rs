//! Name resolution.

use std::{error, fmt, io, net::SocketAddr};

/// An address family preference for [`resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// IPv4 endpoints only.
    V4,
    /// IPv6 endpoints only.
    V6,
}

impl Family {
    fn matches(self, addr: &SocketAddr) -> bool {
        match self {
            Self::V4 => addr.is_ipv4(),
            Self::V6 => addr.is_ipv6(),
        }
    }
}

/// A resolver failure that is not a system error.
///
/// Carries the platform resolver's return code verbatim; the message is
/// the platform's text for it. Carried inside the [`io::Error`] returned
/// by [`resolve`].
#[derive(Debug)]
pub struct GaiError {
    /// The `getaddrinfo` return code.
    pub code: i32,
    message: String,
}

impl fmt::Display for GaiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to look up address: {} ({})", self.message, self.code)
    }
}

impl error::Error for GaiError {}

/// Resolve `host` to endpoints with the given `port`.
///
/// The port is passed numerically (no service-name lookup). When a family
/// preference is given and the host resolves, but to no endpoint of that
/// family, the error is [`io::ErrorKind::AddrNotAvailable`].
pub fn resolve(host: &str, port: u16, family: Option<Family>) -> io::Result<Vec<SocketAddr>> {
    let addrs = sys_resolve(host, port)?;
    match family {
        None => Ok(addrs),
        Some(family) => {
            let matched: Vec<_> = addrs.iter().copied().filter(|a| family.matches(a)).collect();
            if matched.is_empty() {
                Err(io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{host} has no endpoint with the requested address family"),
                ))
            } else {
                Ok(matched)
            }
        }
    }
}

#[cfg(unix)]
fn sys_resolve(host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    use std::ffi::CString;

    use socket2::SockAddr;

    let c_host = CString::new(host)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "host contains a NUL byte"))?;
    let c_port = CString::new(port.to_string()).unwrap();

    let mut hints: libc::addrinfo = unsafe { std::mem::zeroed() };
    hints.ai_flags = libc::AI_NUMERICSERV;
    hints.ai_family = libc::AF_UNSPEC;
    // Restrict to one socket type so each endpoint appears once.
    hints.ai_socktype = libc::SOCK_STREAM;

    let mut res: *mut libc::addrinfo = std::ptr::null_mut();
    let rc = unsafe { libc::getaddrinfo(c_host.as_ptr(), c_port.as_ptr(), &hints, &mut res) };
    if rc != 0 {
        return Err(gai_error(rc));
    }

    let mut addrs = Vec::new();
    let mut cur = res;
    while !cur.is_null() {
        let info = unsafe { &*cur };
        if !info.ai_addr.is_null() {
            let addr = unsafe {
                SockAddr::try_init(|storage, len| {
                    std::ptr::copy_nonoverlapping(
                        info.ai_addr as *const u8,
                        storage as *mut u8,
                        info.ai_addrlen as usize,
                    );
                    *len = info.ai_addrlen;
                    Ok(())
                })
            };
            if let Ok(((), addr)) = addr {
                if let Some(addr) = addr.as_socket() {
                    addrs.push(addr);
                }
            }
        }
        cur = info.ai_next;
    }
    unsafe { libc::freeaddrinfo(res) };

    if addrs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{host} did not resolve to any supported address"),
        ));
    }
    Ok(addrs)
}

#[cfg(unix)]
fn gai_error(rc: i32) -> io::Error {
    use std::ffi::CStr;

    if rc == libc::EAI_SYSTEM {
        return io::Error::last_os_error();
    }
    let message = unsafe { CStr::from_ptr(libc::gai_strerror(rc)) }
        .to_string_lossy()
        .into_owned();
    io::Error::new(io::ErrorKind::Other, GaiError { code: rc, message })
}

#[cfg(windows)]
fn sys_resolve(host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
    use socket2::SockAddr;
    use widestring::U16CString;
    use windows_sys::Win32::Networking::WinSock::{
        FreeAddrInfoW, GetAddrInfoW, ADDRINFOW, AF_UNSPEC, AI_NUMERICSERV, SOCK_STREAM,
    };

    crate::socket::startup()?;

    let w_host = U16CString::from_str(host)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "host contains a NUL"))?;
    let w_port = U16CString::from_str(&port.to_string()).unwrap();

    let mut hints: ADDRINFOW = unsafe { std::mem::zeroed() };
    hints.ai_flags = AI_NUMERICSERV as i32;
    hints.ai_family = AF_UNSPEC as i32;
    hints.ai_socktype = SOCK_STREAM as i32;

    let mut res: *mut ADDRINFOW = std::ptr::null_mut();
    let rc = unsafe { GetAddrInfoW(w_host.as_ptr(), w_port.as_ptr(), &hints, &mut res) };
    if rc != 0 {
        // Windows resolver codes are system error codes.
        return Err(io::Error::from_raw_os_error(rc));
    }

    let mut addrs = Vec::new();
    let mut cur = res;
    while !cur.is_null() {
        let info = unsafe { &*cur };
        if !info.ai_addr.is_null() {
            let addr = unsafe {
                SockAddr::try_init(|storage, len| {
                    std::ptr::copy_nonoverlapping(
                        info.ai_addr as *const u8,
                        storage as *mut u8,
                        info.ai_addrlen,
                    );
                    *len = info.ai_addrlen as _;
                    Ok(())
                })
            }
            .map(|(_, addr)| addr);
            if let Ok(addr) = addr {
                if let Some(addr) = addr.as_socket() {
                    addrs.push(addr);
                }
            }
        }
        cur = info.ai_next;
    }
    unsafe { FreeAddrInfoW(res) };

    if addrs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{host} did not resolve to any supported address"),
        ));
    }
    Ok(addrs)
}
