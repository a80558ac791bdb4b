cfg_if::cfg_if! {
    if #[cfg(windows)] {
        mod iocp;
        pub use iocp::*;
    } else if #[cfg(target_os = "linux")] {
        mod unix;
        pub use unix::*;
        mod epoll;
        pub use epoll::*;
    } else if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
        mod kqueue;
        pub use kqueue::*;
    } else {
        compile_error!("unsupported platform: only epoll, kqueue and IOCP backends exist");
    }
}
