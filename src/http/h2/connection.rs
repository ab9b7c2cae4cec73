//! HTTP/2 client connection state machine
//!
//! [`Connection`] is sans-IO: [`Connection::handle`] consumes bytes read from
//! the transport and returns [`Event`]s, while every operation that produces
//! frames appends them to an internal send buffer drained with
//! [`Connection::take_pending_send`] or [`Connection::flush`]. All methods take
//! `&mut self`, so frame handling, header compression and window accounting
//! happen strictly in wire order on whichever thread owns the connection.
//!
//! Errors returned from `handle` are always connection-level: the GOAWAY has
//! already been queued and all stream and HPACK state discarded. Stream-level
//! violations are answered with RST_STREAM internally and surface as
//! [`Event::StreamReset`].

use super::codec::FrameCodec;
use super::error::{Error, ErrorCode, Result};
use super::flow_control::FlowControl;
use super::frames::*;
use super::hpack::{Decoder, DynamicTable, Encoder, HeaderField, IndexingPolicy};
use super::request_builder;
use super::settings::Settings;
use super::stream::{CloseReason, StreamId, StreamLookup, StreamManager, StreamState};
use super::{CONNECTION_STREAM_ID, DEFAULT_CLOSED_STREAM_RETENTION, DEFAULT_HEADER_TABLE_SIZE, DEFAULT_INITIAL_WINDOW_SIZE};
use crate::http::SessionOps;
use bytes::{Bytes, BytesMut};

/// Header fields that only make sense hop-by-hop in HTTP/1 (RFC 7540
/// Section 8.1.2.2)
const CONNECTION_SPECIFIC_HEADERS: &[&[u8]] = &[
    b"connection",
    b"keep-alive",
    b"proxy-connection",
    b"transfer-encoding",
    b"upgrade",
];

/// Longest debug string put into an error GOAWAY
const MAX_GOAWAY_DEBUG: usize = 128;

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Settings advertised to the server; absent values keep RFC defaults
    pub settings: Settings,
    /// `:authority` of every request
    pub authority: String,
    /// `:scheme` of every request
    pub scheme: String,
    pub indexing_policy: IndexingPolicy,
    /// Recently closed stream ids remembered
    pub closed_stream_retention: usize,
}

impl ConnectionConfig {
    /// Configuration for an `https` origin at `authority`
    pub fn new(authority: impl Into<String>) -> Self {
        ConnectionConfig {
            settings: Settings::new(),
            authority: authority.into(),
            scheme: "https".to_string(),
            indexing_policy: IndexingPolicy::default(),
            closed_stream_retention: DEFAULT_CLOSED_STREAM_RETENTION,
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn indexing_policy(mut self, policy: IndexingPolicy) -> Self {
        self.indexing_policy = policy;
        self
    }

    pub fn closed_stream_retention(mut self, retention: usize) -> Self {
        self.closed_stream_retention = retention;
        self
    }
}

/// A complete response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Stream ID
    pub stream_id: StreamId,
    /// Status code
    pub status: u16,
    /// Headers in received order, `:status` removed
    pub headers: Vec<HeaderField>,
    /// Body
    pub body: Bytes,
    /// Trailing header fields, empty if none were sent
    pub trailers: Vec<HeaderField>,
}

impl Response {
    /// Get status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Value of the first header named `name` (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|field| field.name().eq_ignore_ascii_case(name.as_bytes()))
            .map(HeaderField::value)
    }

    /// Get body as bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get body as string
    pub fn body_string(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| Error::Internal(format!("Invalid UTF-8 in body: {}", e)))
    }
}

/// Something that happened while handling received bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Final response headers arrived
    HeadersReceived {
        stream_id: StreamId,
        status: u16,
        headers: Vec<HeaderField>,
    },
    /// Body octets arrived (padding excluded)
    DataReceived { stream_id: StreamId, data: Bytes },
    TrailersReceived {
        stream_id: StreamId,
        trailers: Vec<HeaderField>,
    },
    /// The peer ended the stream; the response is complete
    ResponseComplete(Response),
    /// Both directions ended normally
    StreamClosed { stream_id: StreamId },
    /// RST_STREAM was received (`remote`) or sent after a stream error
    StreamReset {
        stream_id: StreamId,
        code: ErrorCode,
        remote: bool,
    },
    /// The stream is above a GOAWAY's last stream id and can be retried
    StreamRefused { stream_id: StreamId },
    SettingsReceived(Settings),
    /// The server acknowledged our SETTINGS
    SettingsAcked,
    PingAck([u8; 8]),
    GoAway {
        last_stream_id: StreamId,
        code: ErrorCode,
        debug_data: Bytes,
    },
}

/// HTTP/2 client connection
#[derive(Debug)]
pub struct Connection {
    codec: FrameCodec,
    encoder: Encoder,
    decoder: Decoder,
    policy: IndexingPolicy,
    local_settings: Settings,
    remote_settings: Settings,
    /// Connection-level windows
    flow_control: FlowControl,
    streams: StreamManager,
    authority: Bytes,
    scheme: Bytes,
    /// Last stream id of the most restrictive GOAWAY received
    goaway_received: Option<StreamId>,
    goaway_sent: bool,
    closed: bool,
    send_buffer: BytesMut,
    events: Vec<Event>,
}

impl Connection {
    /// Create a connection and queue the preface, our SETTINGS and, for a
    /// large initial window, the connection WINDOW_UPDATE.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.settings.validate()?;
        if config.settings.initial_window_size == Some(0) {
            return Err(Error::InvalidSettings("initial window size must be non-zero".into()));
        }

        let mut local_settings = config.settings;
        local_settings.enable_push = Some(false);

        let mut decoder = Decoder::new(DEFAULT_HEADER_TABLE_SIZE as usize);
        if let Some(size) = local_settings.max_header_list_size {
            decoder.set_max_header_list_size(size as usize);
        }

        let recv_window = local_settings.get_initial_window_size().max(DEFAULT_INITIAL_WINDOW_SIZE);

        let mut send_buffer = BytesMut::with_capacity(64);
        send_buffer.extend_from_slice(&request_builder::handshake(&local_settings));
        log::debug!("queued preface for {} with {:?}", config.authority, local_settings);

        Ok(Connection {
            codec: FrameCodec::with_max_frame_size(local_settings.get_max_frame_size()),
            encoder: Encoder::with_policy(DEFAULT_HEADER_TABLE_SIZE as usize, config.indexing_policy),
            decoder,
            policy: config.indexing_policy,
            remote_settings: Settings::new(),
            flow_control: FlowControl::with_initial_sizes(DEFAULT_INITIAL_WINDOW_SIZE, recv_window),
            streams: StreamManager::new(config.closed_stream_retention),
            authority: Bytes::from(config.authority),
            scheme: Bytes::from(config.scheme),
            local_settings,
            goaway_received: None,
            goaway_sent: false,
            closed: false,
            send_buffer,
            events: Vec::new(),
        })
    }

    /// Create a connection and write the preface to `session` right away
    pub fn init<S: SessionOps + ?Sized>(session: &mut S, config: ConnectionConfig) -> Result<Self> {
        let mut conn = Connection::new(config)?;
        conn.flush(session)?;
        Ok(conn)
    }

    /// Issue a request on a new stream.
    ///
    /// `headers` are sent after the pseudo-headers, in order. A body that
    /// does not fit the current windows is queued on the stream and sent as
    /// WINDOW_UPDATE or SETTINGS frames open them.
    pub fn request(
        &mut self,
        method: &str,
        path: &str,
        headers: &[HeaderField],
        body: Option<Bytes>,
        priority: Option<PrioritySpec>,
    ) -> Result<StreamId> {
        if self.closed || self.goaway_sent || self.goaway_received.is_some() {
            return Err(Error::ConnectionClosed);
        }
        if method.is_empty() || path.is_empty() {
            return Err(Error::InvalidHeader("method and path must not be empty".to_string()));
        }
        validate_request_headers(headers)?;

        let stream_id = self.streams.create_stream(
            self.remote_settings.get_initial_window_size(),
            self.local_settings.get_initial_window_size(),
        )?;

        let mut fields = Vec::with_capacity(headers.len() + 4);
        fields.push(HeaderField::new(":method", Bytes::copy_from_slice(method.as_bytes())));
        fields.push(HeaderField::new(":scheme", self.scheme.clone()));
        fields.push(HeaderField::new(":authority", self.authority.clone()));
        fields.push(HeaderField::new(":path", Bytes::copy_from_slice(path.as_bytes())));
        fields.extend(headers.iter().cloned());

        let body = body.filter(|body| !body.is_empty());
        let end_stream = body.is_none();

        let mut block = BytesMut::new();
        self.encoder.encode(&fields, &mut block);
        log::debug!("stream {}: {} {} ({} header octets)", stream_id, method, path, block.len());

        FrameCodec::encode_headers(
            stream_id,
            block.freeze(),
            end_stream,
            priority,
            self.remote_settings.get_max_frame_size(),
            &mut self.send_buffer,
        );

        let stream = self
            .streams
            .get_stream_mut(stream_id)
            .ok_or_else(|| Error::Internal(format!("stream {} vanished", stream_id)))?;
        stream.send_headers(end_stream)?;
        if let Some(priority) = priority {
            stream.set_priority(priority);
        }
        if let Some(body) = body {
            stream.queue_data(body, true);
        }

        self.flush_data();
        Ok(stream_id)
    }

    /// Feed bytes read from the transport.
    ///
    /// On error the connection is closed, a GOAWAY is queued and every stream
    /// is gone; the caller should flush and drop the transport. Events from
    /// frames decoded before the failing one stay available through
    /// [`Connection::take_events`].
    pub fn handle(&mut self, bytes: &[u8]) -> Result<Vec<Event>> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        self.codec.push(bytes);
        loop {
            let frame = match self.codec.decode() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => return Err(self.fail(err)),
            };

            log::trace!("recv {}", frame);
            match self.dispatch(frame) {
                Ok(()) => {}
                Err(Error::Stream { stream_id, code, reason }) => self.stream_error(stream_id, code, &reason),
                Err(err) => return Err(self.fail(err)),
            }
        }

        self.flush_data();
        Ok(std::mem::take(&mut self.events))
    }

    /// Events produced outside of [`Connection::handle`], such as a stream
    /// closing once its queued body went out
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Reset a stream we no longer care about
    pub fn reset_stream(&mut self, stream_id: StreamId, code: ErrorCode) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        if self.streams.close_stream(stream_id, CloseReason::LocalReset(code)).is_some() {
            log::debug!("stream {}: reset locally ({})", stream_id, code);
            FrameCodec::encode_rst_stream_frame(&RstStreamFrame::new(stream_id, code), &mut self.send_buffer);
        }
        Ok(())
    }

    /// Queue a PING; the answer surfaces as [`Event::PingAck`]
    pub fn ping(&mut self, data: [u8; 8]) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        FrameCodec::encode_ping_frame(&PingFrame::new(data), &mut self.send_buffer);
        Ok(())
    }

    /// Queue a GOAWAY. With NO_ERROR streams in flight may still finish;
    /// any other code tears the connection down at once.
    pub fn goaway(&mut self, code: ErrorCode, debug_data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        log::debug!("sending GOAWAY ({})", code);
        let frame = GoawayFrame::new(CONNECTION_STREAM_ID, code, Bytes::copy_from_slice(debug_data));
        FrameCodec::encode_goaway_frame(&frame, &mut self.send_buffer);
        self.goaway_sent = true;
        if code != ErrorCode::NoError {
            self.teardown();
        }
        Ok(())
    }

    /// Bytes queued for the transport
    pub fn take_pending_send(&mut self) -> Bytes {
        self.send_buffer.split().freeze()
    }

    pub fn has_pending_send(&self) -> bool {
        !self.send_buffer.is_empty()
    }

    /// Write everything queued to `session`
    pub fn flush<S: SessionOps + ?Sized>(&mut self, session: &mut S) -> Result<()> {
        if self.send_buffer.is_empty() {
            return Ok(());
        }
        let bytes = self.take_pending_send();
        log::trace!("writing {} octets", bytes.len());
        session.write_all(&bytes)?;
        Ok(())
    }

    /// Whether the connection is finished: torn down, or past a GOAWAY with
    /// no stream left in flight
    pub fn is_closed(&self) -> bool {
        self.closed
            || ((self.goaway_sent || self.goaway_received.is_some()) && self.streams.active_stream_count() == 0)
    }

    /// Whether new requests are still accepted
    pub fn is_accepting(&self) -> bool {
        !self.closed && !self.goaway_sent && self.goaway_received.is_none()
    }

    pub fn local_settings(&self) -> &Settings {
        &self.local_settings
    }

    /// Settings received from the server so far
    pub fn remote_settings(&self) -> &Settings {
        &self.remote_settings
    }

    /// Connection send window
    pub fn send_window(&self) -> i64 {
        self.flow_control.send_window().size()
    }

    /// Connection receive window
    pub fn recv_window(&self) -> i64 {
        self.flow_control.recv_window().size()
    }

    /// Send window of an active stream
    pub fn stream_send_window(&self, stream_id: StreamId) -> Option<i64> {
        self.streams
            .get_stream(stream_id)
            .map(|stream| stream.flow_control().send_window().size())
    }

    /// State of a stream; ids we closed or forgot report `Closed`
    pub fn stream_state(&self, stream_id: StreamId) -> StreamState {
        match self.streams.lookup(stream_id) {
            StreamLookup::Active => self
                .streams
                .get_stream(stream_id)
                .map_or(StreamState::Closed, |stream| stream.state()),
            StreamLookup::Idle => StreamState::Idle,
            StreamLookup::Closed | StreamLookup::Forgotten => StreamState::Closed,
        }
    }

    /// Number of streams not yet closed
    pub fn active_streams(&self) -> usize {
        self.streams.active_stream_count()
    }

    /// Ids of streams not yet closed, ascending
    pub fn active_stream_ids(&self) -> Vec<StreamId> {
        self.streams.stream_ids()
    }

    /// Last stream id of a received GOAWAY
    pub fn goaway_received(&self) -> Option<StreamId> {
        self.goaway_received
    }

    /// Table used to compress our header blocks
    pub fn encoder_table(&self) -> &DynamicTable {
        self.encoder.table()
    }

    /// Table used to decompress the server's header blocks
    pub fn decoder_table(&self) -> &DynamicTable {
        self.decoder.table()
    }

    fn dispatch(&mut self, frame: Frame) -> Result<()> {
        match frame {
            Frame::Data(frame) => self.recv_data(frame),
            Frame::Headers(frame) => self.recv_headers(frame),
            Frame::Priority(frame) => self.recv_priority(frame),
            Frame::RstStream(frame) => self.recv_rst_stream(frame),
            Frame::Settings(frame) => self.recv_settings(frame),
            Frame::PushPromise(frame) => Err(Error::connection(
                ErrorCode::ProtocolError,
                format!("PUSH_PROMISE on stream {} with push disabled", frame.stream_id),
            )),
            Frame::Ping(frame) => {
                if frame.ack {
                    self.events.push(Event::PingAck(frame.data));
                } else {
                    FrameCodec::encode_ping_frame(&PingFrame::ack(frame.data), &mut self.send_buffer);
                }
                Ok(())
            }
            Frame::Goaway(frame) => {
                self.recv_goaway(frame);
                Ok(())
            }
            Frame::WindowUpdate(frame) => self.recv_window_update(frame),
            Frame::Continuation(frame) => Err(Error::connection(
                ErrorCode::ProtocolError,
                format!("unexpected CONTINUATION on stream {}", frame.stream_id),
            )),
            Frame::Unknown(frame) => {
                log::trace!("ignoring frame of unknown type 0x{:x}", frame.frame_type);
                Ok(())
            }
        }
    }

    /// Reject ids that were never opened or that left the retention window
    fn classify(&self, stream_id: StreamId, frame_type: FrameType) -> Result<StreamLookup> {
        match self.streams.lookup(stream_id) {
            StreamLookup::Idle => Err(Error::connection(
                ErrorCode::ProtocolError,
                format!("{} on idle stream {}", frame_type.name(), stream_id),
            )),
            StreamLookup::Forgotten => Err(Error::connection(
                ErrorCode::ProtocolError,
                format!("{} on long closed stream {}", frame_type.name(), stream_id),
            )),
            lookup => Ok(lookup),
        }
    }

    fn recv_headers(&mut self, frame: HeadersFrame) -> Result<()> {
        // The decoder table must see every block, whatever becomes of the stream
        let fields = self.decoder.decode(&frame.header_block)?;
        let stream_id = frame.stream_id;

        if self.classify(stream_id, FrameType::Headers)? == StreamLookup::Closed {
            return Err(Error::stream(stream_id, ErrorCode::StreamClosed, "HEADERS on closed stream"));
        }
        if let Some(priority) = frame.priority {
            if priority.stream_dependency == stream_id {
                return Err(Error::stream(stream_id, ErrorCode::ProtocolError, "stream depends on itself"));
            }
        }

        let stream = self
            .streams
            .get_stream_mut(stream_id)
            .ok_or_else(|| Error::Internal(format!("stream {} vanished", stream_id)))?;
        if !stream.state().can_receive() {
            return Err(Error::stream(stream_id, ErrorCode::StreamClosed, "HEADERS after END_STREAM"));
        }
        if let Some(priority) = frame.priority {
            stream.set_priority(priority);
        }

        if stream.status().is_none() {
            let (status, headers) = validate_response_headers(stream_id, fields)?;
            if (100..200).contains(&status) {
                if frame.end_stream {
                    return Err(Error::stream(
                        stream_id,
                        ErrorCode::ProtocolError,
                        "informational response ends the stream",
                    ));
                }
                log::debug!("stream {}: informational {}", stream_id, status);
                return Ok(());
            }
            log::debug!("stream {}: response {}", stream_id, status);
            stream.set_response(status, headers.clone());
            self.events.push(Event::HeadersReceived {
                stream_id,
                status,
                headers,
            });
        } else {
            if !frame.end_stream {
                return Err(Error::stream(stream_id, ErrorCode::ProtocolError, "trailers without END_STREAM"));
            }
            let trailers = validate_trailers(stream_id, fields)?;
            stream.set_trailers(trailers.clone());
            self.events.push(Event::TrailersReceived { stream_id, trailers });
        }

        if frame.end_stream {
            self.finish_remote(stream_id);
        }
        Ok(())
    }

    fn recv_data(&mut self, frame: DataFrame) -> Result<()> {
        let stream_id = frame.stream_id;
        let size = frame.frame_size();
        let lookup = self.classify(stream_id, FrameType::Data)?;

        // Counts against the connection even when the stream is gone
        self.flow_control.consume_recv_window(size).map_err(|_| {
            Error::connection(
                ErrorCode::FlowControlError,
                format!("DATA of {} octets overruns the connection window", size),
            )
        })?;
        self.replenish_connection();

        if lookup == StreamLookup::Closed {
            return Err(Error::stream(stream_id, ErrorCode::StreamClosed, "DATA on closed stream"));
        }

        let stream = self
            .streams
            .get_stream_mut(stream_id)
            .ok_or_else(|| Error::Internal(format!("stream {} vanished", stream_id)))?;
        if !stream.state().can_receive() {
            return Err(Error::stream(stream_id, ErrorCode::StreamClosed, "DATA after END_STREAM"));
        }
        if stream.status().is_none() {
            return Err(Error::stream(stream_id, ErrorCode::ProtocolError, "DATA before response headers"));
        }
        stream.flow_control_mut().consume_recv_window(size).map_err(|_| {
            Error::stream(
                stream_id,
                ErrorCode::FlowControlError,
                format!("DATA of {} octets overruns the stream window", size),
            )
        })?;
        stream.append_body(&frame.data);

        if !frame.end_stream {
            if let Some(increment) = stream.flow_control().should_send_window_update() {
                if stream.flow_control_mut().send_window_update(increment).is_ok() {
                    let update = WindowUpdateFrame::new(stream_id, increment);
                    FrameCodec::encode_window_update_frame(&update, &mut self.send_buffer);
                }
            }
        }

        if !frame.data.is_empty() {
            self.events.push(Event::DataReceived {
                stream_id,
                data: frame.data,
            });
        }
        if frame.end_stream {
            self.finish_remote(stream_id);
        }
        Ok(())
    }

    fn recv_priority(&mut self, frame: PriorityFrame) -> Result<()> {
        if frame.priority.stream_dependency == frame.stream_id {
            return Err(Error::stream(frame.stream_id, ErrorCode::ProtocolError, "stream depends on itself"));
        }
        if let Some(stream) = self.streams.get_stream_mut(frame.stream_id) {
            stream.set_priority(frame.priority);
        }
        Ok(())
    }

    fn recv_rst_stream(&mut self, frame: RstStreamFrame) -> Result<()> {
        let stream_id = frame.stream_id;
        match self.classify(stream_id, FrameType::RstStream)? {
            StreamLookup::Active => {
                log::debug!("stream {}: reset by peer ({})", stream_id, frame.error_code);
                self.streams.close_stream(stream_id, CloseReason::RemoteReset(frame.error_code));
                self.events.push(Event::StreamReset {
                    stream_id,
                    code: frame.error_code,
                    remote: true,
                });
            }
            _ => log::trace!("ignoring RST_STREAM on closed stream {}", stream_id),
        }
        Ok(())
    }

    fn recv_settings(&mut self, frame: SettingsFrame) -> Result<()> {
        if frame.ack {
            // Our header table size is in force once acknowledged
            self.decoder
                .set_max_table_size(self.local_settings.get_header_table_size() as usize);
            self.events.push(Event::SettingsAcked);
            return Ok(());
        }

        let settings = frame.settings;
        log::debug!("peer settings {:?}", settings);

        if let Some(size) = settings.initial_window_size {
            if size != self.remote_settings.get_initial_window_size() {
                for stream in self.streams.iter_mut() {
                    let stream_id = stream.id();
                    stream
                        .flow_control_mut()
                        .send_window_mut()
                        .update_initial_size(size)
                        .map_err(|_| {
                            Error::connection(
                                ErrorCode::FlowControlError,
                                format!("initial window {} overflows stream {}", size, stream_id),
                            )
                        })?;
                }
            }
        }
        if let Some(size) = settings.header_table_size {
            self.encoder.set_max_table_size(size as usize);
        }
        if settings.max_concurrent_streams.is_some() {
            self.streams.set_max_concurrent_streams(settings.max_concurrent_streams);
        }
        self.remote_settings.merge(&settings);

        FrameCodec::encode_settings_frame(&SettingsFrame::ack(), &mut self.send_buffer);
        self.events.push(Event::SettingsReceived(settings));
        Ok(())
    }

    fn recv_goaway(&mut self, frame: GoawayFrame) {
        let last = frame.last_stream_id;
        if frame.error_code == ErrorCode::NoError {
            log::debug!("GOAWAY last_stream_id={}", last);
        } else {
            log::warn!(
                "GOAWAY last_stream_id={} ({}): {}",
                last,
                frame.error_code,
                String::from_utf8_lossy(&frame.debug_data)
            );
        }

        self.goaway_received = Some(self.goaway_received.map_or(last, |prev| prev.min(last)));
        for stream_id in self.streams.stream_ids() {
            if stream_id > last {
                self.streams.close_stream(stream_id, CloseReason::Refused);
                self.events.push(Event::StreamRefused { stream_id });
            }
        }

        self.events.push(Event::GoAway {
            last_stream_id: last,
            code: frame.error_code,
            debug_data: frame.debug_data,
        });
    }

    fn recv_window_update(&mut self, frame: WindowUpdateFrame) -> Result<()> {
        let stream_id = frame.stream_id;
        let increment = frame.size_increment;

        if stream_id == CONNECTION_STREAM_ID {
            if increment == 0 {
                return Err(Error::connection(ErrorCode::ProtocolError, "WINDOW_UPDATE of 0 on the connection"));
            }
            self.flow_control.increase_send_window(increment).map_err(|_| {
                Error::connection(ErrorCode::FlowControlError, "connection window above 2^31-1")
            })?;
            return Ok(());
        }

        if self.classify(stream_id, FrameType::WindowUpdate)? != StreamLookup::Active {
            return Ok(());
        }
        if increment == 0 {
            return Err(Error::stream(stream_id, ErrorCode::ProtocolError, "WINDOW_UPDATE of 0"));
        }
        if let Some(stream) = self.streams.get_stream_mut(stream_id) {
            stream.flow_control_mut().increase_send_window(increment).map_err(|_| {
                Error::stream(stream_id, ErrorCode::FlowControlError, "stream window above 2^31-1")
            })?;
        }
        Ok(())
    }

    /// The peer ended its side of `stream_id`
    fn finish_remote(&mut self, stream_id: StreamId) {
        let stream = match self.streams.get_stream_mut(stream_id) {
            Some(stream) => stream,
            None => return,
        };
        stream.recv_end_stream();
        let (status, headers, body, trailers) = stream.take_response();
        let closed = stream.state().is_closed();

        self.events.push(Event::ResponseComplete(Response {
            stream_id,
            status,
            headers,
            body,
            trailers,
        }));

        if closed {
            self.streams.close_stream(stream_id, CloseReason::Complete);
            self.events.push(Event::StreamClosed { stream_id });
        }
    }

    fn replenish_connection(&mut self) {
        if let Some(increment) = self.flow_control.should_send_window_update() {
            if self.flow_control.send_window_update(increment).is_ok() {
                let update = WindowUpdateFrame::new(CONNECTION_STREAM_ID, increment);
                FrameCodec::encode_window_update_frame(&update, &mut self.send_buffer);
            }
        }
    }

    /// Send queued request bodies as far as the windows allow, lowest stream
    /// id first
    fn flush_data(&mut self) {
        let max_frame_size = self.remote_settings.get_max_frame_size() as usize;

        for stream_id in self.streams.stream_ids() {
            let stream = match self.streams.get_stream_mut(stream_id) {
                Some(stream) => stream,
                None => continue,
            };

            let mut closed = false;
            while stream.has_pending() && stream.state().can_send() {
                let len = stream
                    .pending_len()
                    .min(max_frame_size)
                    .min(stream.flow_control().available())
                    .min(self.flow_control.available());
                if len == 0 && stream.pending_len() > 0 {
                    log::trace!("stream {}: {} octets blocked on window", stream_id, stream.pending_len());
                    break;
                }
                if stream.flow_control_mut().consume_send_window(len).is_err()
                    || self.flow_control.consume_send_window(len).is_err()
                {
                    break;
                }

                let (chunk, end_stream) = stream.take_pending(len);
                FrameCodec::encode_data_frame(&DataFrame::new(stream_id, chunk, end_stream), &mut self.send_buffer);
                if end_stream {
                    stream.send_end_stream();
                    closed = stream.state().is_closed();
                }
            }

            if closed {
                self.streams.close_stream(stream_id, CloseReason::Complete);
                self.events.push(Event::StreamClosed { stream_id });
            }
        }
    }

    /// Answer a stream error with RST_STREAM and drop the stream
    fn stream_error(&mut self, stream_id: StreamId, code: ErrorCode, reason: &str) {
        log::debug!("stream {} error ({}): {}", stream_id, code, reason);
        FrameCodec::encode_rst_stream_frame(&RstStreamFrame::new(stream_id, code), &mut self.send_buffer);
        if self.streams.close_stream(stream_id, CloseReason::LocalReset(code)).is_some() {
            self.events.push(Event::StreamReset {
                stream_id,
                code,
                remote: false,
            });
        }
    }

    /// Queue GOAWAY for a connection error and drop all state
    fn fail(&mut self, err: Error) -> Error {
        let code = err.code().unwrap_or(ErrorCode::InternalError);
        log::warn!("connection error: {}", err);

        let reason = err.to_string();
        let debug = &reason.as_bytes()[..reason.len().min(MAX_GOAWAY_DEBUG)];
        let frame = GoawayFrame::new(CONNECTION_STREAM_ID, code, Bytes::copy_from_slice(debug));
        FrameCodec::encode_goaway_frame(&frame, &mut self.send_buffer);
        self.goaway_sent = true;
        self.teardown();
        err
    }

    fn teardown(&mut self) {
        self.closed = true;
        self.streams.clear();
        self.codec = FrameCodec::new();
        self.encoder = Encoder::with_policy(DEFAULT_HEADER_TABLE_SIZE as usize, self.policy);
        self.decoder = Decoder::new(DEFAULT_HEADER_TABLE_SIZE as usize);
    }
}

fn is_connection_specific(name: &[u8]) -> bool {
    CONNECTION_SPECIFIC_HEADERS.contains(&name)
}

fn validate_request_headers(headers: &[HeaderField]) -> Result<()> {
    for field in headers {
        let name = field.name();
        let printable = String::from_utf8_lossy(name);
        if name.is_empty() {
            return Err(Error::InvalidHeader("empty header name".to_string()));
        }
        if field.is_pseudo() {
            return Err(Error::InvalidHeader(format!("{} is set by the connection", printable)));
        }
        if name.iter().any(u8::is_ascii_uppercase) {
            return Err(Error::InvalidHeader(format!("{} is not lowercase", printable)));
        }
        if is_connection_specific(name) {
            return Err(Error::InvalidHeader(format!("{} is connection-specific", printable)));
        }
        if name == b"te" && field.value() != b"trailers" {
            return Err(Error::InvalidHeader("te only allows \"trailers\"".to_string()));
        }
    }
    Ok(())
}

fn malformed(stream_id: StreamId, reason: impl Into<String>) -> Error {
    Error::stream(stream_id, ErrorCode::ProtocolError, reason)
}

fn check_regular_field(stream_id: StreamId, field: &HeaderField) -> Result<()> {
    let name = field.name();
    if name.is_empty() || name.iter().any(u8::is_ascii_uppercase) {
        return Err(malformed(
            stream_id,
            format!("invalid header name {:?}", String::from_utf8_lossy(name)),
        ));
    }
    if is_connection_specific(name) {
        return Err(malformed(
            stream_id,
            format!("connection-specific header {}", String::from_utf8_lossy(name)),
        ));
    }
    Ok(())
}

fn parse_status(value: &[u8]) -> Option<u16> {
    if value.len() != 3 || !value.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(value.iter().fold(0u16, |acc, digit| acc * 10 + (digit - b'0') as u16))
}

/// Split a response header list into `:status` and regular fields
fn validate_response_headers(stream_id: StreamId, fields: Vec<HeaderField>) -> Result<(u16, Vec<HeaderField>)> {
    let mut status = None;
    let mut headers = Vec::with_capacity(fields.len());

    for field in fields {
        if field.is_pseudo() {
            if !headers.is_empty() {
                return Err(malformed(stream_id, "pseudo-header after regular header"));
            }
            if field.name() != b":status" {
                return Err(malformed(
                    stream_id,
                    format!("unexpected pseudo-header {}", String::from_utf8_lossy(field.name())),
                ));
            }
            if status.is_some() {
                return Err(malformed(stream_id, "duplicate :status"));
            }
            let parsed = parse_status(field.value()).ok_or_else(|| {
                malformed(
                    stream_id,
                    format!("invalid :status {:?}", String::from_utf8_lossy(field.value())),
                )
            })?;
            status = Some(parsed);
        } else {
            check_regular_field(stream_id, &field)?;
            headers.push(field);
        }
    }

    let status = status.ok_or_else(|| malformed(stream_id, "missing :status"))?;
    Ok((status, headers))
}

fn validate_trailers(stream_id: StreamId, fields: Vec<HeaderField>) -> Result<Vec<HeaderField>> {
    for field in &fields {
        if field.is_pseudo() {
            return Err(malformed(stream_id, "pseudo-header in trailers"));
        }
        check_regular_field(stream_id, field)?;
    }
    Ok(fields)
}
