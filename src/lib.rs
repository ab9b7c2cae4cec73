//! h2wire - HTTP/2 client protocol engine
//!
//! This crate turns application requests into RFC 7540 frames with RFC 7541
//! header compression, and incoming frames back into responses. The engine
//! in [`http::h2`] is sans-IO; the transports in [`http`] (plain TCP and
//! OpenSSL with ALPN `h2`) and the threaded [`http::h2::H2Client`] put it on
//! a real socket.

pub mod http;
