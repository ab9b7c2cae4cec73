//! TLS support for HTTP/2 connections
//!
//! Client-side TLS over OpenSSL. The connector offers ALPN `h2` and the
//! resulting `TlsSessionOps` implements `SessionOps`, so the HTTP/2 client
//! runs over it unchanged.
//!
//! Certificate verification is whatever OpenSSL does with its default trust
//! store; this module adds no validation logic of its own.
//!
//! # Examples
//!
//! ```no_run
//! use h2wire::http::tls::{TlsConfig, TlsVersion};
//! use h2wire::http::connect_tcp;
//! use std::time::Duration;
//!
//! let tls_config = TlsConfig::client()
//!     .unwrap()
//!     .version_range(TlsVersion::Tls12, TlsVersion::Tls13)
//!     .unwrap()
//!     .alpn(&["h2"])
//!     .unwrap()
//!     .servername("example.com")
//!     .build()
//!     .unwrap();
//!
//! let tcp_stream = connect_tcp("example.com", 443, Duration::from_secs(5)).unwrap();
//! let tls_session = tls_config.connect(tcp_stream).unwrap();
//! assert_eq!(tls_session.alpn_protocol(), Some(&b"h2"[..]));
//! ```

pub mod config;
pub mod session;

pub use config::{ClientConfigBuilder, TlsConfig, TlsError, TlsVersion};
pub use session::TlsSessionOps;

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
