//! HTTP/2 error types
//!
//! This module defines error types for HTTP/2 operations, mapping to
//! the error codes defined in RFC 7540 Section 7.
//!
//! Errors fall into four families:
//!
//! - **format errors**: malformed bytes seen by the frame codec or the HPACK
//!   decoder. They are always escalated to a connection error because the
//!   codec cannot resynchronize.
//! - **stream errors**: scoped to one stream, answered with RST_STREAM.
//! - **connection errors**: answered with GOAWAY and connection teardown.
//! - **transport errors**: failures of the byte-stream collaborator.

use super::stream::StreamId;
use crate::http::tls::TlsError;
use std::fmt;

/// HTTP/2 errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failure of the underlying transport
    #[error("Transport error: {0}")]
    Transport(#[from] crate::http::Error),

    /// TLS setup failure
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// Malformed bytes at the codec or compression level
    #[error("Format error ({code}): {reason}")]
    Format { code: ErrorCode, reason: String },

    /// Violation scoped to a single stream
    #[error("Stream {stream_id} error ({code}): {reason}")]
    Stream {
        stream_id: StreamId,
        code: ErrorCode,
        reason: String,
    },

    /// Violation with connection-wide blast radius
    #[error("Connection error ({code}): {reason}")]
    Connection { code: ErrorCode, reason: String },

    /// SETTINGS_MAX_CONCURRENT_STREAMS would be exceeded
    #[error("Refused stream: {0} streams already open")]
    RefusedStream(usize),

    /// The peer announced GOAWAY below this stream; it was never processed
    #[error("Stream {0} was not processed by the peer and can be retried")]
    Retryable(StreamId),

    /// Stream cancelled locally
    #[error("Stream cancelled: {0}")]
    Cancelled(StreamId),

    /// Outbound data exceeds the available flow-control window
    #[error("Flow control error: {0}")]
    FlowControl(String),

    /// Request header rejected before encoding
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Invalid settings value
    #[error("Invalid settings value: {0}")]
    InvalidSettings(String),

    /// Caller-side timeout waiting for a response
    #[error("Timeout")]
    Timeout,

    /// Connection already closed (GOAWAY, teardown or actor gone)
    #[error("Connection closed")]
    ConnectionClosed,

    /// ALPN negotiation failed
    #[error("ALPN negotiation failed: expected h2, got {0:?}")]
    AlpnFailed(Option<Vec<u8>>),

    /// Internal error (RFC 7540 Section 7 - Error code 0x2)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a format error
    pub fn format(code: ErrorCode, reason: impl Into<String>) -> Self {
        Error::Format {
            code,
            reason: reason.into(),
        }
    }

    /// Shorthand for a stream error
    pub fn stream(stream_id: StreamId, code: ErrorCode, reason: impl Into<String>) -> Self {
        Error::Stream {
            stream_id,
            code,
            reason: reason.into(),
        }
    }

    /// Shorthand for a connection error
    pub fn connection(code: ErrorCode, reason: impl Into<String>) -> Self {
        Error::Connection {
            code,
            reason: reason.into(),
        }
    }

    /// The RFC 7540 error code carried by protocol-level errors
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Error::Format { code, .. }
            | Error::Stream { code, .. }
            | Error::Connection { code, .. } => Some(*code),
            Error::RefusedStream(_) | Error::Retryable(_) => Some(ErrorCode::RefusedStream),
            Error::Cancelled(_) => Some(ErrorCode::Cancel),
            Error::FlowControl(_) => Some(ErrorCode::FlowControlError),
            _ => None,
        }
    }

    /// Whether the request can be safely re-issued on a new connection
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Retryable(_) | Error::RefusedStream(_))
    }

    /// Whether the error tears down the whole connection
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Format { .. } | Error::Connection { .. } | Error::ConnectionClosed
        )
    }

    /// Copy of a connection-level error handed to every waiting caller.
    ///
    /// Transport errors wrap `io::Error`, which is not `Clone`, so they are
    /// flattened into their message.
    pub(crate) fn for_waiter(&self) -> Error {
        match self {
            Error::Format { code, reason } | Error::Connection { code, reason } => Error::Connection {
                code: *code,
                reason: reason.clone(),
            },
            Error::Transport(e) => Error::Transport(crate::http::Error::Disconnected(e.to_string())),
            _ => Error::ConnectionClosed,
        }
    }
}

/// HTTP/2 error codes as defined in RFC 7540 Section 7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    /// Graceful shutdown
    NoError = 0x0,
    /// Protocol error detected
    ProtocolError = 0x1,
    /// Implementation fault
    InternalError = 0x2,
    /// Flow-control limits exceeded
    FlowControlError = 0x3,
    /// Settings not acknowledged
    SettingsTimeout = 0x4,
    /// Frame received for closed stream
    StreamClosed = 0x5,
    /// Frame size incorrect
    FrameSizeError = 0x6,
    /// Stream not processed
    RefusedStream = 0x7,
    /// Stream cancelled
    Cancel = 0x8,
    /// Compression state not updated
    CompressionError = 0x9,
    /// TCP connection error for CONNECT method
    ConnectError = 0xa,
    /// Processing capacity exceeded
    EnhanceYourCalm = 0xb,
    /// Negotiated TLS parameters not acceptable
    InadequateSecurity = 0xc,
    /// Use HTTP/1.1 for the request
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Convert error code to u32
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Create error code from u32
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x0 => Some(ErrorCode::NoError),
            0x1 => Some(ErrorCode::ProtocolError),
            0x2 => Some(ErrorCode::InternalError),
            0x3 => Some(ErrorCode::FlowControlError),
            0x4 => Some(ErrorCode::SettingsTimeout),
            0x5 => Some(ErrorCode::StreamClosed),
            0x6 => Some(ErrorCode::FrameSizeError),
            0x7 => Some(ErrorCode::RefusedStream),
            0x8 => Some(ErrorCode::Cancel),
            0x9 => Some(ErrorCode::CompressionError),
            0xa => Some(ErrorCode::ConnectError),
            0xb => Some(ErrorCode::EnhanceYourCalm),
            0xc => Some(ErrorCode::InadequateSecurity),
            0xd => Some(ErrorCode::Http11Required),
            _ => None,
        }
    }

    /// Decode a code read off the wire.
    ///
    /// Unknown codes carry no special meaning (RFC 7540 Section 7) and are
    /// treated as INTERNAL_ERROR.
    pub fn from_wire(code: u32) -> Self {
        Self::from_u32(code).unwrap_or(ErrorCode::InternalError)
    }

    /// Get error name
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameSizeError => "FRAME_SIZE_ERROR",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            ErrorCode::InadequateSecurity => "INADEQUATE_SECURITY",
            ErrorCode::Http11Required => "HTTP_1_1_REQUIRED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u32())
    }
}

/// Result type for HTTP/2 operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_conversion() {
        assert_eq!(ErrorCode::NoError.as_u32(), 0x0);
        assert_eq!(ErrorCode::ProtocolError.as_u32(), 0x1);
        assert_eq!(ErrorCode::Http11Required.as_u32(), 0xd);

        assert_eq!(ErrorCode::from_u32(0x0), Some(ErrorCode::NoError));
        assert_eq!(ErrorCode::from_u32(0x1), Some(ErrorCode::ProtocolError));
        assert_eq!(ErrorCode::from_u32(0xff), None);
        assert_eq!(ErrorCode::from_wire(0xff), ErrorCode::InternalError);
    }

    #[test]
    fn test_error_code_name() {
        assert_eq!(ErrorCode::NoError.name(), "NO_ERROR");
        assert_eq!(ErrorCode::ProtocolError.name(), "PROTOCOL_ERROR");
        assert_eq!(ErrorCode::FlowControlError.name(), "FLOW_CONTROL_ERROR");
    }

    #[test]
    fn test_error_display() {
        let err = Error::connection(ErrorCode::ProtocolError, "test error");
        assert_eq!(
            err.to_string(),
            "Connection error (PROTOCOL_ERROR (0x1)): test error"
        );

        let err = Error::Cancelled(42);
        assert_eq!(err.to_string(), "Stream cancelled: 42");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::Retryable(7).is_retryable());
        assert!(Error::RefusedStream(100).is_retryable());
        assert!(!Error::Cancelled(1).is_retryable());

        let err = Error::stream(3, ErrorCode::FlowControlError, "window");
        assert_eq!(err.code(), Some(ErrorCode::FlowControlError));
        assert!(!err.is_connection_level());

        let err = Error::format(ErrorCode::FrameSizeError, "too big");
        assert!(err.is_connection_level());
        match err.for_waiter() {
            Error::Connection { code, .. } => assert_eq!(code, ErrorCode::FrameSizeError),
            other => panic!("unexpected {:?}", other),
        }
    }
}
