//! Asynchronous network types over the per-thread event queue.
//!
//! [`TcpListener`], [`TcpStream`] and [`UdpSocket`] wrap the low-level
//! [`Socket`], which owns the socket id, keeps it registered with the
//! calling thread's queue, and submits its operations there. Every type
//! here is bound to the thread that created it.

#![warn(missing_docs)]

mod socket;
pub use socket::Socket;

mod resolve;
pub use resolve::{resolve, Family, GaiError};

mod tcp;
pub use tcp::{TcpListener, TcpStream};

mod udp;
pub use udp::UdpSocket;
