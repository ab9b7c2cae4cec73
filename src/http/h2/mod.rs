//! HTTP/2 client protocol engine
//!
//! The engine is layered leaves first:
//!
//! - [`hpack`]: Huffman coding, the static and dynamic tables, and the header
//!   block encoder/decoder (RFC 7541)
//! - [`codec`]: parsing and serialization of every RFC 7540 frame type,
//!   including CONTINUATION reassembly
//! - [`connection`]: the sans-IO state machine owning settings, streams,
//!   flow-control windows and both HPACK tables
//! - [`client`]: a thread that owns one [`Connection`] and its transport and
//!   serves requests from cloneable [`H2Client`] handles
//!
//! # Examples
//!
//! ## Driving a connection by hand
//!
//! ```no_run
//! use h2wire::http::h2::{Connection, ConnectionConfig, Event};
//! use h2wire::http::{connect_tcp, FdSessionOps, SessionOps};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let tcp = connect_tcp("localhost", 8080, Duration::from_secs(5))?;
//! let mut session = FdSessionOps::new(tcp);
//!
//! let mut conn = Connection::new(ConnectionConfig::new("localhost:8080").scheme("http"))?;
//! let stream_id = conn.request("GET", "/", &[], None, None)?;
//! conn.flush(&mut session)?;
//!
//! let mut buf = [0u8; 16384];
//! loop {
//!     let n = session.read(&mut buf)?;
//!     for event in conn.handle(&buf[..n])? {
//!         if let Event::ResponseComplete(response) = event {
//!             println!("{} -> {}", stream_id, response.status);
//!             return Ok(());
//!         }
//!     }
//!     conn.flush(&mut session)?;
//! }
//! # }
//! ```
//!
//! ## Client handle
//!
//! ```no_run
//! use h2wire::http::h2::H2Client;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = H2Client::open("example.com", 443, true)?;
//! let response = client.get("/", &[])?;
//! println!("Status: {}", response.status());
//! client.close()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod flow_control;
pub mod frames;
pub mod hpack;
pub mod request_builder;
pub mod settings;
pub mod stream;

pub use client::{H2Client, H2ClientBuilder, RequestOptions};
pub use codec::FrameCodec;
pub use connection::{Connection, ConnectionConfig, Event, Response};
pub use error::{Error, ErrorCode, Result};
pub use frames::{Frame, FrameFlags, FrameType, PrioritySpec};
pub use hpack::{HeaderField, IndexingPolicy};
pub use settings::{Settings, SettingsBuilder};
pub use stream::{StreamId, StreamState};

/// HTTP/2 connection preface that must be sent by clients
///
/// From RFC 7540 Section 3.5:
/// "PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Default initial window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Largest SETTINGS_MAX_FRAME_SIZE a peer may announce (2^24 - 1)
pub const MAX_FRAME_SIZE_LIMIT: u32 = 16_777_215;

/// Default header table size (4096 bytes)
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;

/// Largest flow-control window (2^31 - 1)
pub const MAX_WINDOW_SIZE: u32 = 0x7FFF_FFFF;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFF_FFFF;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;

/// Cap on a header block reassembled from CONTINUATION frames
pub const MAX_HEADER_BLOCK_SIZE: usize = 1 << 20;

/// Closed stream ids remembered to tell late frames from protocol errors
pub const DEFAULT_CLOSED_STREAM_RETENTION: usize = 256;
