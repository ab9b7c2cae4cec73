//! HTTP/2 stream management
//!
//! This module implements stream management as defined in RFC 7540 Section 5.1.
//!
//! Only client-initiated (odd) streams exist: push is disabled, so the
//! reserved states never occur.

use super::error::{Error, ErrorCode, Result};
use super::flow_control::FlowControl;
use super::frames::PrioritySpec;
use super::hpack::HeaderField;
use super::MAX_STREAM_ID;
use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, VecDeque};

/// Stream ID type
pub type StreamId = u32;

/// Stream state as defined in RFC 7540 Section 5.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Idle: No frames have been sent/received
    Idle,
    /// Open: Both sides can send frames
    Open,
    /// Half-closed (local): We can't send, they can
    HalfClosedLocal,
    /// Half-closed (remote): They can't send, we can
    HalfClosedRemote,
    /// Closed: Stream is closed
    Closed,
}

impl StreamState {
    /// Check if stream can send data
    pub fn can_send(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Check if stream can receive data
    pub fn can_receive(&self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// Check if stream is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed)
    }
}

/// Why a stream reached `closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// END_STREAM in both directions
    Complete,
    /// We sent RST_STREAM
    LocalReset(ErrorCode),
    /// The peer sent RST_STREAM
    RemoteReset(ErrorCode),
    /// Above the last stream id of a GOAWAY
    Refused,
}

/// HTTP/2 stream
#[derive(Debug)]
pub struct H2Stream {
    /// Stream ID
    id: StreamId,
    /// Stream state
    state: StreamState,
    /// Flow control
    flow_control: FlowControl,
    /// Priority information
    priority: PrioritySpec,
    /// Final response status, once the response HEADERS arrived
    status: Option<u16>,
    /// Response header list, pseudo-headers stripped
    headers: Vec<HeaderField>,
    /// Accumulated body data
    body: BytesMut,
    trailers: Vec<HeaderField>,
    /// Request body not yet sent for lack of window
    pending: Bytes,
    /// Whether the last pending octet carries END_STREAM
    pending_end_stream: bool,
    close_reason: Option<CloseReason>,
}

impl H2Stream {
    /// Create a new stream with specified window sizes
    pub fn with_window_sizes(id: StreamId, send_size: u32, recv_size: u32) -> Self {
        H2Stream {
            id,
            state: StreamState::Idle,
            flow_control: FlowControl::with_initial_sizes(send_size, recv_size),
            priority: PrioritySpec::default(),
            status: None,
            headers: Vec::new(),
            body: BytesMut::new(),
            trailers: Vec::new(),
            pending: Bytes::new(),
            pending_end_stream: false,
            close_reason: None,
        }
    }

    /// Get stream ID
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Get stream state
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Get flow control
    pub fn flow_control(&self) -> &FlowControl {
        &self.flow_control
    }

    /// Get mutable flow control
    pub fn flow_control_mut(&mut self) -> &mut FlowControl {
        &mut self.flow_control
    }

    pub fn priority(&self) -> &PrioritySpec {
        &self.priority
    }

    pub fn set_priority(&mut self, priority: PrioritySpec) {
        self.priority = priority;
    }

    /// Final status, `None` until the response headers arrived
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn headers(&self) -> &[HeaderField] {
        &self.headers
    }

    /// Store the final response header list
    pub fn set_response(&mut self, status: u16, headers: Vec<HeaderField>) {
        self.status = Some(status);
        self.headers = headers;
    }

    /// Get accumulated body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn append_body(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    pub fn trailers(&self) -> &[HeaderField] {
        &self.trailers
    }

    pub fn set_trailers(&mut self, trailers: Vec<HeaderField>) {
        self.trailers = trailers;
    }

    /// Move the response parts out of the stream
    pub fn take_response(&mut self) -> (u16, Vec<HeaderField>, Bytes, Vec<HeaderField>) {
        (
            self.status.unwrap_or_default(),
            std::mem::take(&mut self.headers),
            std::mem::take(&mut self.body).freeze(),
            std::mem::take(&mut self.trailers),
        )
    }

    /// Queue request body octets behind any already pending
    pub fn queue_data(&mut self, data: Bytes, end_stream: bool) {
        if self.pending.is_empty() {
            self.pending = data;
        } else {
            let mut joined = BytesMut::with_capacity(self.pending.len() + data.len());
            joined.extend_from_slice(&self.pending);
            joined.extend_from_slice(&data);
            self.pending = joined.freeze();
        }
        self.pending_end_stream = end_stream;
    }

    /// Whether request body octets (or a bare END_STREAM) still wait for window
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || self.pending_end_stream
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Split off the next `len` pending octets; the flag tells whether they
    /// end the stream
    pub fn take_pending(&mut self, len: usize) -> (Bytes, bool) {
        let chunk = self.pending.split_to(len.min(self.pending.len()));
        let end_stream = self.pending.is_empty() && self.pending_end_stream;
        if end_stream {
            self.pending_end_stream = false;
        }
        (chunk, end_stream)
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Transition for HEADERS sent by us
    pub fn send_headers(&mut self, end_stream: bool) -> Result<()> {
        match self.state {
            StreamState::Idle => {
                self.state = if end_stream {
                    StreamState::HalfClosedLocal
                } else {
                    StreamState::Open
                };
                Ok(())
            }
            state => Err(Error::Internal(format!(
                "Cannot send HEADERS on stream {} in state {:?}",
                self.id, state
            ))),
        }
    }

    /// Transition for END_STREAM sent by us
    pub fn send_end_stream(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            state => state,
        };
    }

    /// Transition for END_STREAM received from the peer
    pub fn recv_end_stream(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            state => state,
        };
    }

    /// Close the stream and release its buffers
    pub fn close(&mut self, reason: CloseReason) {
        self.state = StreamState::Closed;
        self.close_reason = Some(reason);
        self.pending = Bytes::new();
        self.pending_end_stream = false;
        if reason != CloseReason::Complete {
            self.body.clear();
            self.headers.clear();
            self.trailers.clear();
        }
    }
}

/// Where a stream id stands from the connection's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamLookup {
    /// In the stream table
    Active,
    /// Closed and still remembered
    Closed,
    /// Closed long enough ago to have left the retention window
    Forgotten,
    /// Never opened by us (includes every even id)
    Idle,
}

/// Stream manager
///
/// Holds the active streams and a bounded FIFO of recently closed ids.
#[derive(Debug)]
pub struct StreamManager {
    /// Active streams
    streams: HashMap<StreamId, H2Stream>,
    /// Recently closed ids, oldest first
    closed: VecDeque<StreamId>,
    retention: usize,
    /// Next stream ID (odd)
    next_stream_id: StreamId,
    /// Maximum number of concurrent streams (from the peer's SETTINGS)
    max_concurrent_streams: Option<u32>,
}

impl StreamManager {
    /// Create a new stream manager remembering `retention` closed ids
    pub fn new(retention: usize) -> Self {
        StreamManager {
            streams: HashMap::new(),
            closed: VecDeque::with_capacity(retention),
            retention,
            next_stream_id: 1,
            max_concurrent_streams: None,
        }
    }

    /// Set maximum concurrent streams
    pub fn set_max_concurrent_streams(&mut self, max: Option<u32>) {
        self.max_concurrent_streams = max;
    }

    /// Get maximum concurrent streams
    pub fn max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }

    /// Get next stream ID (without incrementing)
    pub fn peek_next_stream_id(&self) -> StreamId {
        self.next_stream_id
    }

    /// Allocate next stream ID and create stream
    pub fn create_stream(&mut self, send_window: u32, recv_window: u32) -> Result<StreamId> {
        if let Some(max) = self.max_concurrent_streams {
            let active_count = self.active_stream_count();
            if active_count >= max as usize {
                return Err(Error::RefusedStream(active_count));
            }
        }

        let stream_id = self.next_stream_id;
        if stream_id > MAX_STREAM_ID {
            return Err(Error::ConnectionClosed);
        }
        self.next_stream_id += 2;

        let stream = H2Stream::with_window_sizes(stream_id, send_window, recv_window);
        self.streams.insert(stream_id, stream);

        Ok(stream_id)
    }

    /// Get a stream by ID
    pub fn get_stream(&self, stream_id: StreamId) -> Option<&H2Stream> {
        self.streams.get(&stream_id)
    }

    /// Get a mutable stream by ID
    pub fn get_stream_mut(&mut self, stream_id: StreamId) -> Option<&mut H2Stream> {
        self.streams.get_mut(&stream_id)
    }

    /// Classify a stream id
    pub fn lookup(&self, stream_id: StreamId) -> StreamLookup {
        if self.streams.contains_key(&stream_id) {
            StreamLookup::Active
        } else if stream_id % 2 == 0 || stream_id >= self.next_stream_id {
            StreamLookup::Idle
        } else if self.closed.contains(&stream_id) {
            StreamLookup::Closed
        } else {
            StreamLookup::Forgotten
        }
    }

    /// Close a stream, move it out of the table and remember its id
    pub fn close_stream(&mut self, stream_id: StreamId, reason: CloseReason) -> Option<H2Stream> {
        let mut stream = self.streams.remove(&stream_id)?;
        stream.close(reason);

        if self.retention > 0 {
            if self.closed.len() == self.retention {
                self.closed.pop_front();
            }
            self.closed.push_back(stream_id);
        }

        Some(stream)
    }

    /// Get number of active streams
    pub fn active_stream_count(&self) -> usize {
        self.streams.len()
    }

    /// All active stream IDs, ascending
    pub fn stream_ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self.streams.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Iterate over the active streams
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut H2Stream> {
        self.streams.values_mut()
    }

    /// Drop every stream at once (connection teardown)
    pub fn clear(&mut self) {
        self.streams.clear();
        self.closed.clear();
    }
}
