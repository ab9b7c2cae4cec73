//! Transport layer and HTTP/2 protocol engine
//!
//! The transport side uses the session operations abstraction so the
//! HTTP/2 client runs unchanged over plain TCP and TLS:
//!
//! - `SessionOps` trait defines operations (poll, read, write, close)
//! - `FdSessionOps` drives a plain `TcpStream`
//! - `tls::TlsSessionOps` drives an OpenSSL stream negotiated with ALPN `h2`
//!
//! The protocol engine itself lives in [`h2`] and never touches sockets.
//!
//! # Examples
//!
//! ```no_run
//! use h2wire::http::{connect_tcp, FdSessionOps, SessionOps};
//! use std::time::Duration;
//!
//! let stream = connect_tcp("127.0.0.1", 8080, Duration::from_secs(5)).unwrap();
//! let mut session = FdSessionOps::new(stream);
//! session.write_all(b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n").unwrap();
//! ```

pub mod h2;
pub mod session;
pub mod tls;

pub use session::{connect_tcp, FdSessionOps, PollEvents, SessionOps};

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not resolve {0}")]
    Resolve(String),

    #[error("Timeout")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,

    /// A transport failure reported to a caller other than the one that hit it
    #[error("Disconnected: {0}")]
    Disconnected(String),
}

/// Default port for `https` authorities
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Default port for cleartext `http` authorities
pub const DEFAULT_HTTP_PORT: u16 = 80;
