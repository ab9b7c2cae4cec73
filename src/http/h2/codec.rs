//! HTTP/2 frame encoding and decoding
//!
//! [`FrameCodec::parse`] turns one frame's worth of bytes into a typed
//! [`Frame`] and performs every check that needs no connection state: frame
//! size, stream-id placement, fixed payload lengths and padding. The stateful
//! [`FrameCodec`] owns the read buffer and reassembles HEADERS/PUSH_PROMISE
//! with their CONTINUATION frames, so callers only ever see complete header
//! blocks.

use super::error::{Error, ErrorCode, Result};
use super::frames::*;
use super::settings::{Settings, SETTING_SIZE};
use super::stream::StreamId;
use super::{DEFAULT_MAX_FRAME_SIZE, MAX_HEADER_BLOCK_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// HTTP/2 frame header size (9 bytes)
pub const FRAME_HEADER_SIZE: usize = 9;

/// Decoded 9-byte frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: usize,
    pub frame_type: u8,
    pub flags: FrameFlags,
    pub stream_id: StreamId,
}

/// Header block being reassembled from CONTINUATION frames
#[derive(Debug)]
struct PartialBlock {
    head: Frame,
    block: BytesMut,
}

/// Frame codec for encoding/decoding HTTP/2 frames
#[derive(Debug)]
pub struct FrameCodec {
    /// Buffer for reading
    read_buffer: BytesMut,
    /// Local SETTINGS_MAX_FRAME_SIZE, enforced on received frames
    max_frame_size: u32,
    /// Cap on a reassembled header block
    max_header_block: usize,
    partial: Option<PartialBlock>,
}

impl FrameCodec {
    /// Create a new frame codec
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a codec accepting frames up to `max_frame_size` octets
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        FrameCodec {
            read_buffer: BytesMut::with_capacity(16 * 1024),
            max_frame_size,
            max_header_block: MAX_HEADER_BLOCK_SIZE,
            partial: None,
        }
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Bytes received but not yet decoded into frames
    pub fn buffered(&self) -> usize {
        self.read_buffer.len()
    }

    /// Whether a header block is waiting for CONTINUATION frames
    pub fn in_header_block(&self) -> bool {
        self.partial.is_some()
    }

    /// Append received bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.read_buffer.extend_from_slice(bytes);
    }

    /// Decode the next complete frame, `Ok(None)` if more bytes are needed.
    ///
    /// HEADERS and PUSH_PROMISE are returned once, with the full header block
    /// and `end_headers` set, after their last CONTINUATION arrives.
    pub fn decode(&mut self) -> Result<Option<Frame>> {
        loop {
            let (frame, consumed) = match Self::parse(&self.read_buffer, self.max_frame_size)? {
                Some(parsed) => parsed,
                None => return Ok(None),
            };
            self.read_buffer.advance(consumed);

            if let Some(partial) = self.partial.as_mut() {
                let cont = match frame {
                    Frame::Continuation(cont) if cont.stream_id == partial.head.stream_id() => cont,
                    other => {
                        return Err(Error::format(
                            ErrorCode::ProtocolError,
                            format!(
                                "expected CONTINUATION for stream {}, got {}",
                                partial.head.stream_id(),
                                other
                            ),
                        ))
                    }
                };

                if partial.block.len() + cont.header_block.len() > self.max_header_block {
                    return Err(Error::format(
                        ErrorCode::EnhanceYourCalm,
                        format!("header block exceeds {} octets", self.max_header_block),
                    ));
                }
                partial.block.extend_from_slice(&cont.header_block);

                if cont.end_headers {
                    if let Some(partial) = self.partial.take() {
                        return Ok(Some(complete(partial)));
                    }
                }
                continue;
            }

            let open_block = match &frame {
                Frame::Continuation(cont) => {
                    return Err(Error::format(
                        ErrorCode::ProtocolError,
                        format!("CONTINUATION on stream {} without a header block", cont.stream_id),
                    ))
                }
                Frame::Headers(headers) if !headers.end_headers => Some(BytesMut::from(&headers.header_block[..])),
                Frame::PushPromise(promise) if !promise.end_headers => Some(BytesMut::from(&promise.header_block[..])),
                _ => None,
            };

            match open_block {
                Some(block) => self.partial = Some(PartialBlock { head: frame, block }),
                None => return Ok(Some(frame)),
            }
        }
    }

    /// Encode a frame header into a buffer
    pub fn encode_header(frame_type: FrameType, flags: FrameFlags, stream_id: StreamId, length: usize) -> [u8; FRAME_HEADER_SIZE] {
        let mut header = [0u8; FRAME_HEADER_SIZE];

        // Length (24 bits, big-endian)
        header[0] = ((length >> 16) & 0xFF) as u8;
        header[1] = ((length >> 8) & 0xFF) as u8;
        header[2] = (length & 0xFF) as u8;

        header[3] = frame_type.as_u8();
        header[4] = flags.as_u8();

        // Stream ID (31 bits, big-endian, reserved bit is 0)
        header[5..9].copy_from_slice(&(stream_id & 0x7FFF_FFFF).to_be_bytes());

        header
    }

    /// Decode a frame header from bytes
    pub fn decode_header(bytes: &[u8; FRAME_HEADER_SIZE]) -> FrameHeader {
        let length = ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | (bytes[2] as usize);

        // Stream ID (31 bits, ignore reserved bit)
        let stream_id = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) & 0x7FFF_FFFF;

        FrameHeader {
            length,
            frame_type: bytes[3],
            flags: FrameFlags::from_u8(bytes[4]),
            stream_id,
        }
    }

    /// Parse one frame from the front of `buf`.
    ///
    /// Returns the frame and the number of bytes it occupied, or `None` when
    /// `buf` does not yet hold a complete frame. CONTINUATION frames are
    /// returned as they are; reassembly is the job of [`FrameCodec::decode`].
    pub fn parse(buf: &[u8], max_frame_size: u32) -> Result<Option<(Frame, usize)>> {
        let header: &[u8; FRAME_HEADER_SIZE] = match buf.get(..FRAME_HEADER_SIZE).and_then(|h| h.try_into().ok()) {
            Some(header) => header,
            None => return Ok(None),
        };
        let header = Self::decode_header(header);

        if header.length > max_frame_size as usize {
            return Err(Error::format(
                ErrorCode::FrameSizeError,
                format!("frame of {} octets exceeds max frame size {}", header.length, max_frame_size),
            ));
        }

        let total = FRAME_HEADER_SIZE + header.length;
        if buf.len() < total {
            return Ok(None);
        }
        let payload = Bytes::copy_from_slice(&buf[FRAME_HEADER_SIZE..total]);

        let frame = match FrameType::from_u8(header.frame_type) {
            Some(frame_type) => {
                check_stream_id(frame_type, header.stream_id)?;
                parse_payload(frame_type, &header, payload)?
            }
            None => Frame::Unknown(UnknownFrame {
                frame_type: header.frame_type,
                flags: header.flags,
                stream_id: header.stream_id,
                payload,
            }),
        };

        log::trace!("decoded {} flags=0x{:x} len={}", frame, header.flags.as_u8(), header.length);
        Ok(Some((frame, total)))
    }

    /// Serialize one frame.
    ///
    /// The frame is written as given; splitting an oversized header block is
    /// done by [`FrameCodec::encode_headers`].
    pub fn encode(frame: &Frame, dst: &mut BytesMut) {
        match frame {
            Frame::Data(f) => Self::encode_data_frame(f, dst),
            Frame::Headers(f) => Self::encode_headers_frame(f, dst),
            Frame::Priority(f) => Self::encode_priority_frame(f, dst),
            Frame::RstStream(f) => Self::encode_rst_stream_frame(f, dst),
            Frame::Settings(f) => Self::encode_settings_frame(f, dst),
            Frame::PushPromise(f) => Self::encode_push_promise_frame(f, dst),
            Frame::Ping(f) => Self::encode_ping_frame(f, dst),
            Frame::Goaway(f) => Self::encode_goaway_frame(f, dst),
            Frame::WindowUpdate(f) => Self::encode_window_update_frame(f, dst),
            Frame::Continuation(f) => Self::encode_continuation_frame(f, dst),
            Frame::Unknown(f) => {
                dst.reserve(FRAME_HEADER_SIZE + f.payload.len());
                let mut header = Self::encode_header(FrameType::Data, f.flags, f.stream_id, f.payload.len());
                header[3] = f.frame_type;
                dst.put_slice(&header);
                dst.put_slice(&f.payload);
            }
        }
    }

    /// Serialize a complete header block as HEADERS followed by as many
    /// CONTINUATION frames as `max_frame_size` requires.
    pub fn encode_headers(
        stream_id: StreamId,
        block: Bytes,
        end_stream: bool,
        priority: Option<PrioritySpec>,
        max_frame_size: u32,
        dst: &mut BytesMut,
    ) {
        let max = max_frame_size as usize;
        let first_len = block.len().min(max - if priority.is_some() { 5 } else { 0 });

        let mut rest = block;
        let first = rest.split_to(first_len);
        let mut headers = HeadersFrame::new(stream_id, first, end_stream, rest.is_empty());
        headers.priority = priority;
        Self::encode_headers_frame(&headers, dst);

        while !rest.is_empty() {
            let chunk = rest.split_to(rest.len().min(max));
            let cont = ContinuationFrame {
                stream_id,
                header_block: chunk,
                end_headers: rest.is_empty(),
            };
            Self::encode_continuation_frame(&cont, dst);
        }
    }

    /// Encode a DATA frame
    pub fn encode_data_frame(frame: &DataFrame, dst: &mut BytesMut) {
        let mut flags = FrameFlags::empty();
        flags.set_if(FrameFlags::END_STREAM, frame.end_stream);
        flags.set_if(FrameFlags::PADDED, frame.padding.is_some());

        let header = Self::encode_header(FrameType::Data, flags, frame.stream_id, frame.frame_size());
        dst.reserve(FRAME_HEADER_SIZE + frame.frame_size());
        dst.put_slice(&header);

        if let Some(pad_len) = frame.padding {
            dst.put_u8(pad_len);
        }
        dst.put_slice(&frame.data);
        if let Some(pad_len) = frame.padding {
            dst.put_bytes(0, pad_len as usize);
        }
    }

    /// Encode a HEADERS frame
    pub fn encode_headers_frame(frame: &HeadersFrame, dst: &mut BytesMut) {
        let mut payload_len = frame.header_block.len();
        let mut flags = FrameFlags::empty();
        flags.set_if(FrameFlags::END_STREAM, frame.end_stream);
        flags.set_if(FrameFlags::END_HEADERS, frame.end_headers);

        if frame.priority.is_some() {
            flags.set(FrameFlags::PRIORITY);
            payload_len += 5;
        }
        if let Some(pad_len) = frame.padding {
            flags.set(FrameFlags::PADDED);
            payload_len += 1 + pad_len as usize;
        }

        let header = Self::encode_header(FrameType::Headers, flags, frame.stream_id, payload_len);
        dst.reserve(FRAME_HEADER_SIZE + payload_len);
        dst.put_slice(&header);

        if let Some(pad_len) = frame.padding {
            dst.put_u8(pad_len);
        }
        if let Some(priority) = &frame.priority {
            put_priority(priority, dst);
        }
        dst.put_slice(&frame.header_block);
        if let Some(pad_len) = frame.padding {
            dst.put_bytes(0, pad_len as usize);
        }
    }

    /// Encode a PRIORITY frame
    pub fn encode_priority_frame(frame: &PriorityFrame, dst: &mut BytesMut) {
        let header = Self::encode_header(FrameType::Priority, FrameFlags::empty(), frame.stream_id, 5);
        dst.put_slice(&header);
        put_priority(&frame.priority, dst);
    }

    /// Encode a RST_STREAM frame
    pub fn encode_rst_stream_frame(frame: &RstStreamFrame, dst: &mut BytesMut) {
        let header = Self::encode_header(FrameType::RstStream, FrameFlags::empty(), frame.stream_id, 4);
        dst.put_slice(&header);
        dst.put_u32(frame.error_code.as_u32());
    }

    /// Encode a SETTINGS frame
    pub fn encode_settings_frame(frame: &SettingsFrame, dst: &mut BytesMut) {
        let mut flags = FrameFlags::empty();
        flags.set_if(FrameFlags::ACK, frame.ack);

        let payload_len = if frame.ack { 0 } else { frame.settings.encoded_len() };
        let header = Self::encode_header(FrameType::Settings, flags, 0, payload_len);
        dst.put_slice(&header);
        if !frame.ack {
            frame.settings.encode(dst);
        }
    }

    /// Encode a PUSH_PROMISE frame
    pub fn encode_push_promise_frame(frame: &PushPromiseFrame, dst: &mut BytesMut) {
        let mut flags = FrameFlags::empty();
        flags.set_if(FrameFlags::END_HEADERS, frame.end_headers);
        flags.set_if(FrameFlags::PADDED, frame.padding.is_some());

        let pad = frame.padding.map_or(0, |p| 1 + p as usize);
        let payload_len = 4 + frame.header_block.len() + pad;
        let header = Self::encode_header(FrameType::PushPromise, flags, frame.stream_id, payload_len);
        dst.put_slice(&header);

        if let Some(pad_len) = frame.padding {
            dst.put_u8(pad_len);
        }
        dst.put_u32(frame.promised_stream_id & 0x7FFF_FFFF);
        dst.put_slice(&frame.header_block);
        if let Some(pad_len) = frame.padding {
            dst.put_bytes(0, pad_len as usize);
        }
    }

    /// Encode a PING frame
    pub fn encode_ping_frame(frame: &PingFrame, dst: &mut BytesMut) {
        let mut flags = FrameFlags::empty();
        flags.set_if(FrameFlags::ACK, frame.ack);

        let header = Self::encode_header(FrameType::Ping, flags, 0, 8);
        dst.put_slice(&header);
        dst.put_slice(&frame.data);
    }

    /// Encode a GOAWAY frame
    pub fn encode_goaway_frame(frame: &GoawayFrame, dst: &mut BytesMut) {
        // 4 bytes last stream ID + 4 bytes error code + debug data
        let payload_len = 8 + frame.debug_data.len();
        let header = Self::encode_header(FrameType::Goaway, FrameFlags::empty(), 0, payload_len);
        dst.put_slice(&header);
        dst.put_u32(frame.last_stream_id & 0x7FFF_FFFF);
        dst.put_u32(frame.error_code.as_u32());
        dst.put_slice(&frame.debug_data);
    }

    /// Encode a WINDOW_UPDATE frame
    pub fn encode_window_update_frame(frame: &WindowUpdateFrame, dst: &mut BytesMut) {
        let header = Self::encode_header(FrameType::WindowUpdate, FrameFlags::empty(), frame.stream_id, 4);
        dst.put_slice(&header);
        dst.put_u32(frame.size_increment & 0x7FFF_FFFF);
    }

    /// Encode a CONTINUATION frame
    pub fn encode_continuation_frame(frame: &ContinuationFrame, dst: &mut BytesMut) {
        let mut flags = FrameFlags::empty();
        flags.set_if(FrameFlags::END_HEADERS, frame.end_headers);

        let header = Self::encode_header(FrameType::Continuation, flags, frame.stream_id, frame.header_block.len());
        dst.put_slice(&header);
        dst.put_slice(&frame.header_block);
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn protocol_error(reason: impl Into<String>) -> Error {
    Error::format(ErrorCode::ProtocolError, reason)
}

fn frame_size_error(reason: impl Into<String>) -> Error {
    Error::format(ErrorCode::FrameSizeError, reason)
}

fn put_priority(priority: &PrioritySpec, dst: &mut BytesMut) {
    let mut dep = priority.stream_dependency & 0x7FFF_FFFF;
    if priority.exclusive {
        dep |= 0x8000_0000;
    }
    dst.put_u32(dep);
    dst.put_u8(priority.wire_weight());
}

fn check_stream_id(frame_type: FrameType, stream_id: StreamId) -> Result<()> {
    match frame_type {
        FrameType::Settings | FrameType::Ping | FrameType::Goaway if stream_id != 0 => Err(protocol_error(
            format!("{} on stream {}", frame_type.name(), stream_id),
        )),
        FrameType::Data
        | FrameType::Headers
        | FrameType::Priority
        | FrameType::RstStream
        | FrameType::PushPromise
        | FrameType::Continuation
            if stream_id == 0 =>
        {
            Err(protocol_error(format!("{} on stream 0", frame_type.name())))
        }
        FrameType::Data | FrameType::Headers if stream_id % 2 == 0 => Err(protocol_error(format!(
            "{} on even stream {}",
            frame_type.name(),
            stream_id
        ))),
        _ => Ok(()),
    }
}

/// Strip padding: returns the pad length and the payload without the
/// pad-length octet and the trailing padding. `reserved` counts the octets
/// that must remain after the pad-length octet besides padding (priority
/// fields, promised stream id).
fn strip_padding(frame_type: FrameType, flags: FrameFlags, mut payload: Bytes, reserved: usize) -> Result<(Option<u8>, Bytes)> {
    if !flags.is_padded() {
        if payload.len() < reserved {
            return Err(frame_size_error(format!("{} payload too short", frame_type.name())));
        }
        return Ok((None, payload));
    }

    if payload.is_empty() {
        return Err(frame_size_error(format!("padded {} without pad length", frame_type.name())));
    }
    let pad_len = payload.get_u8();
    if payload.len() < reserved {
        return Err(frame_size_error(format!("{} payload too short", frame_type.name())));
    }
    if pad_len as usize > payload.len() - reserved {
        return Err(protocol_error(format!(
            "{} padding of {} octets exceeds payload",
            frame_type.name(),
            pad_len
        )));
    }
    payload.truncate(payload.len() - pad_len as usize);
    Ok((Some(pad_len), payload))
}

fn expect_len(frame_type: FrameType, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(frame_size_error(format!(
            "{} payload must be {} octets, got {}",
            frame_type.name(),
            expected,
            actual
        )));
    }
    Ok(())
}

fn parse_payload(frame_type: FrameType, header: &FrameHeader, payload: Bytes) -> Result<Frame> {
    let flags = header.flags;
    let stream_id = header.stream_id;

    let frame = match frame_type {
        FrameType::Data => {
            let (padding, data) = strip_padding(frame_type, flags, payload, 0)?;
            Frame::Data(DataFrame {
                stream_id,
                data,
                end_stream: flags.is_end_stream(),
                padding,
            })
        }
        FrameType::Headers => {
            let reserved = if flags.is_priority() { 5 } else { 0 };
            let (padding, mut block) = strip_padding(frame_type, flags, payload, reserved)?;
            let priority = if flags.is_priority() {
                let dependency = block.get_u32();
                let weight = block.get_u8();
                Some(PrioritySpec::from_wire(dependency, weight))
            } else {
                None
            };
            Frame::Headers(HeadersFrame {
                stream_id,
                header_block: block,
                end_stream: flags.is_end_stream(),
                end_headers: flags.is_end_headers(),
                priority,
                padding,
            })
        }
        FrameType::Priority => {
            expect_len(frame_type, payload.len(), 5)?;
            let mut payload = payload;
            let dependency = payload.get_u32();
            let weight = payload.get_u8();
            Frame::Priority(PriorityFrame {
                stream_id,
                priority: PrioritySpec::from_wire(dependency, weight),
            })
        }
        FrameType::RstStream => {
            expect_len(frame_type, payload.len(), 4)?;
            let mut payload = payload;
            Frame::RstStream(RstStreamFrame {
                stream_id,
                error_code: ErrorCode::from_wire(payload.get_u32()),
            })
        }
        FrameType::Settings => {
            if flags.is_ack() {
                expect_len(frame_type, payload.len(), 0)?;
                Frame::Settings(SettingsFrame::ack())
            } else {
                if payload.len() % SETTING_SIZE != 0 {
                    return Err(frame_size_error(format!(
                        "SETTINGS payload of {} octets is not a multiple of 6",
                        payload.len()
                    )));
                }
                Frame::Settings(SettingsFrame::new(Settings::decode(&payload)?))
            }
        }
        FrameType::PushPromise => {
            let (padding, mut block) = strip_padding(frame_type, flags, payload, 4)?;
            let promised_stream_id = block.get_u32() & 0x7FFF_FFFF;
            Frame::PushPromise(PushPromiseFrame {
                stream_id,
                promised_stream_id,
                header_block: block,
                end_headers: flags.is_end_headers(),
                padding,
            })
        }
        FrameType::Ping => {
            expect_len(frame_type, payload.len(), 8)?;
            let mut data = [0u8; 8];
            data.copy_from_slice(&payload);
            Frame::Ping(PingFrame {
                ack: flags.is_ack(),
                data,
            })
        }
        FrameType::Goaway => {
            if payload.len() < 8 {
                return Err(frame_size_error("GOAWAY payload shorter than 8 octets"));
            }
            let mut payload = payload;
            let last_stream_id = payload.get_u32() & 0x7FFF_FFFF;
            let error_code = ErrorCode::from_wire(payload.get_u32());
            Frame::Goaway(GoawayFrame {
                last_stream_id,
                error_code,
                debug_data: payload,
            })
        }
        FrameType::WindowUpdate => {
            expect_len(frame_type, payload.len(), 4)?;
            let mut payload = payload;
            Frame::WindowUpdate(WindowUpdateFrame {
                stream_id,
                size_increment: payload.get_u32() & 0x7FFF_FFFF,
            })
        }
        FrameType::Continuation => Frame::Continuation(ContinuationFrame {
            stream_id,
            header_block: payload,
            end_headers: flags.is_end_headers(),
        }),
    };

    Ok(frame)
}

/// Turn a reassembled block back into a single HEADERS/PUSH_PROMISE frame
fn complete(partial: PartialBlock) -> Frame {
    let block = partial.block.freeze();
    match partial.head {
        Frame::Headers(mut headers) => {
            headers.header_block = block;
            headers.end_headers = true;
            Frame::Headers(headers)
        }
        Frame::PushPromise(mut promise) => {
            promise.header_block = block;
            promise.end_headers = true;
            Frame::PushPromise(promise)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::h2::settings::SettingsBuilder;

    fn encoded(frame: &Frame) -> BytesMut {
        let mut dst = BytesMut::new();
        FrameCodec::encode(frame, &mut dst);
        dst
    }

    fn parse_one(bytes: &[u8]) -> Result<Frame> {
        let (frame, consumed) = FrameCodec::parse(bytes, DEFAULT_MAX_FRAME_SIZE)?.expect("complete frame");
        assert_eq!(consumed, bytes.len());
        Ok(frame)
    }

    #[test]
    fn test_encode_decode_header() {
        let flags = FrameFlags::from_u8(FrameFlags::END_STREAM | FrameFlags::END_HEADERS);
        let header = FrameCodec::encode_header(FrameType::Headers, flags, 42, 1234);
        let decoded = FrameCodec::decode_header(&header);

        assert_eq!(decoded.frame_type, FrameType::Headers.as_u8());
        assert_eq!(decoded.flags, flags);
        assert_eq!(decoded.stream_id, 42);
        assert_eq!(decoded.length, 1234);
    }

    #[test]
    fn test_reserved_bit_ignored() {
        let mut header = FrameCodec::encode_header(FrameType::Data, FrameFlags::empty(), 1, 0);
        header[5] |= 0x80;
        assert_eq!(FrameCodec::decode_header(&header).stream_id, 1);
    }

    #[test]
    fn test_encode_data_frame() {
        let encoded = encoded(&DataFrame::new(1, Bytes::from("Hello"), true).into());

        assert_eq!(encoded[0..3], [0, 0, 5]);
        assert_eq!(encoded[3], FrameType::Data.as_u8());
        assert_eq!(encoded[4], FrameFlags::END_STREAM);
        assert_eq!(&encoded[5..9], &[0, 0, 0, 1]);
        assert_eq!(&encoded[9..], b"Hello");
    }

    #[test]
    fn test_encode_data_frame_with_padding() {
        let encoded = encoded(&DataFrame::new(1, Bytes::from("Hi"), false).with_padding(10).into());

        // 1 (pad length) + 2 (data) + 10 (padding)
        assert_eq!(encoded[0..3], [0, 0, 13]);
        assert_eq!(encoded[4] & FrameFlags::PADDED, FrameFlags::PADDED);
        assert_eq!(encoded[9], 10);
        assert_eq!(&encoded[10..12], b"Hi");
        assert_eq!(&encoded[12..22], &[0u8; 10]);
    }

    #[test]
    fn test_encode_settings_frame() {
        let settings = SettingsBuilder::new()
            .header_table_size(8192)
            .enable_push(false)
            .initial_window_size(65535)
            .build()
            .unwrap();

        let encoded = encoded(&SettingsFrame::new(settings).into());
        assert_eq!(encoded[3], FrameType::Settings.as_u8());
        assert_eq!(&encoded[5..9], &[0, 0, 0, 0]);
        // 3 settings * 6 bytes
        assert_eq!(encoded[0..3], [0, 0, 18]);

        let ack = self::encoded(&SettingsFrame::ack().into());
        assert_eq!(ack[0..3], [0, 0, 0]);
        assert_eq!(ack[4], FrameFlags::ACK);
    }

    #[test]
    fn test_roundtrip_each_type() {
        let frames: Vec<Frame> = vec![
            DataFrame::new(3, Bytes::from_static(b"body"), true).with_padding(4).into(),
            HeadersFrame::new(5, Bytes::from_static(b"\x82\x84"), false, true)
                .with_priority(PrioritySpec::new(3, true, 200))
                .with_padding(2)
                .into(),
            PriorityFrame {
                stream_id: 7,
                priority: PrioritySpec::new(1, false, 1),
            }
            .into(),
            RstStreamFrame::new(9, ErrorCode::Cancel).into(),
            SettingsFrame::new(SettingsBuilder::new().max_frame_size(32768).build().unwrap()).into(),
            PingFrame::ack(*b"12345678").into(),
            GoawayFrame::new(11, ErrorCode::EnhanceYourCalm, Bytes::from_static(b"calm")).into(),
            WindowUpdateFrame::new(0, 1 << 20).into(),
        ];

        for frame in frames {
            let bytes = encoded(&frame);
            assert_eq!(parse_one(&bytes).unwrap(), frame);
        }
    }

    #[test]
    fn test_incomplete_input() {
        let bytes = encoded(&PingFrame::new([1; 8]).into());
        assert!(FrameCodec::parse(&bytes[..5], DEFAULT_MAX_FRAME_SIZE).unwrap().is_none());
        assert!(FrameCodec::parse(&bytes[..12], DEFAULT_MAX_FRAME_SIZE).unwrap().is_none());
    }

    #[test]
    fn test_oversize_declared_length() {
        // Only the header is present; the declared length alone is enough
        let header = FrameCodec::encode_header(FrameType::Data, FrameFlags::empty(), 1, 16385);
        let err = FrameCodec::parse(&header, DEFAULT_MAX_FRAME_SIZE).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::FrameSizeError));
        assert!(err.is_connection_level());
    }

    #[test]
    fn test_stream_id_placement() {
        let ping_on_stream = {
            let mut b = FrameCodec::encode_header(FrameType::Ping, FrameFlags::empty(), 1, 8).to_vec();
            b.extend_from_slice(&[0; 8]);
            b
        };
        assert_eq!(parse_one(&ping_on_stream).unwrap_err().code(), Some(ErrorCode::ProtocolError));

        let data_on_zero = FrameCodec::encode_header(FrameType::Data, FrameFlags::empty(), 0, 0);
        assert_eq!(parse_one(&data_on_zero).unwrap_err().code(), Some(ErrorCode::ProtocolError));

        let headers_even = FrameCodec::encode_header(FrameType::Headers, FrameFlags::empty(), 2, 0);
        assert_eq!(parse_one(&headers_even).unwrap_err().code(), Some(ErrorCode::ProtocolError));

        // WINDOW_UPDATE may use either
        let mut wu = FrameCodec::encode_header(FrameType::WindowUpdate, FrameFlags::empty(), 0, 4).to_vec();
        wu.extend_from_slice(&[0, 0, 0, 1]);
        assert!(parse_one(&wu).is_ok());
    }

    #[test]
    fn test_fixed_sizes() {
        let cases: &[(FrameType, u32, usize)] = &[
            (FrameType::Priority, 1, 4),
            (FrameType::RstStream, 1, 5),
            (FrameType::Ping, 0, 7),
            (FrameType::WindowUpdate, 1, 3),
            (FrameType::Settings, 0, 5),
            (FrameType::Goaway, 0, 7),
        ];
        for &(frame_type, stream_id, len) in cases {
            let mut bytes = FrameCodec::encode_header(frame_type, FrameFlags::empty(), stream_id, len).to_vec();
            bytes.resize(FRAME_HEADER_SIZE + len, 0);
            let err = parse_one(&bytes).unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::FrameSizeError), "{}", frame_type);
        }

        let mut ack = FrameCodec::encode_header(FrameType::Settings, FrameFlags::from_u8(FrameFlags::ACK), 0, 6).to_vec();
        ack.resize(FRAME_HEADER_SIZE + 6, 0);
        assert_eq!(parse_one(&ack).unwrap_err().code(), Some(ErrorCode::FrameSizeError));
    }

    #[test]
    fn test_padding_bounds() {
        let padded = FrameFlags::from_u8(FrameFlags::PADDED);

        // pad length 4 with 4 octets remaining: legal, empty data
        let mut ok = FrameCodec::encode_header(FrameType::Data, padded, 1, 5).to_vec();
        ok.extend_from_slice(&[4, 0, 0, 0, 0]);
        match parse_one(&ok).unwrap() {
            Frame::Data(data) => {
                assert!(data.data.is_empty());
                assert_eq!(data.frame_size(), 5);
            }
            other => panic!("unexpected {:?}", other),
        }

        // pad length equal to the whole payload
        let mut bad = FrameCodec::encode_header(FrameType::Data, padded, 1, 5).to_vec();
        bad.extend_from_slice(&[5, 0, 0, 0, 0]);
        assert_eq!(parse_one(&bad).unwrap_err().code(), Some(ErrorCode::ProtocolError));

        // HEADERS: priority fields count against the room for padding
        let flags = FrameFlags::from_u8(FrameFlags::PADDED | FrameFlags::PRIORITY | FrameFlags::END_HEADERS);
        let mut bad = FrameCodec::encode_header(FrameType::Headers, flags, 1, 8).to_vec();
        bad.extend_from_slice(&[3, 0, 0, 0, 0, 15, 0, 0]);
        assert_eq!(parse_one(&bad).unwrap_err().code(), Some(ErrorCode::ProtocolError));
    }

    #[test]
    fn test_unknown_frame_type_passes_through() {
        let mut bytes = FrameCodec::encode_header(FrameType::Data, FrameFlags::empty(), 0, 3).to_vec();
        bytes[3] = 0xbb;
        bytes.extend_from_slice(b"xyz");
        match parse_one(&bytes).unwrap() {
            Frame::Unknown(f) => {
                assert_eq!(f.frame_type, 0xbb);
                assert_eq!(&f.payload[..], b"xyz");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_continuation_reassembly() {
        let block: Vec<u8> = (0..40u8).collect();
        let mut wire = BytesMut::new();
        FrameCodec::encode_headers(1, Bytes::from(block.clone()), true, None, 16, &mut wire);
        // 16 + 16 + 8
        assert_eq!(wire.len(), 3 * FRAME_HEADER_SIZE + 40);

        let mut codec = FrameCodec::new();
        // Feed one byte at a time
        let mut out = Vec::new();
        for byte in wire.iter() {
            codec.push(&[*byte]);
            while let Some(frame) = codec.decode().unwrap() {
                out.push(frame);
            }
        }

        assert_eq!(out.len(), 1);
        match &out[0] {
            Frame::Headers(h) => {
                assert_eq!(&h.header_block[..], &block[..]);
                assert!(h.end_headers);
                assert!(h.end_stream);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!codec.in_header_block());
        assert_eq!(codec.buffered(), 0);
    }

    #[test]
    fn test_continuation_interleaving_rejected() {
        let mut wire = BytesMut::new();
        FrameCodec::encode_headers_frame(&HeadersFrame::new(1, Bytes::from_static(b"\x82"), false, false), &mut wire);
        FrameCodec::encode_ping_frame(&PingFrame::new([0; 8]), &mut wire);

        let mut codec = FrameCodec::new();
        codec.push(&wire);
        let err = codec.decode().unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ProtocolError));

        // CONTINUATION for another stream
        let mut wire = BytesMut::new();
        FrameCodec::encode_headers_frame(&HeadersFrame::new(1, Bytes::from_static(b"\x82"), false, false), &mut wire);
        FrameCodec::encode_continuation_frame(
            &ContinuationFrame {
                stream_id: 3,
                header_block: Bytes::from_static(b"\x84"),
                end_headers: true,
            },
            &mut wire,
        );
        let mut codec = FrameCodec::new();
        codec.push(&wire);
        assert!(codec.decode().is_err());
    }

    #[test]
    fn test_stray_continuation_rejected() {
        let mut wire = BytesMut::new();
        FrameCodec::encode_continuation_frame(
            &ContinuationFrame {
                stream_id: 1,
                header_block: Bytes::new(),
                end_headers: true,
            },
            &mut wire,
        );
        let mut codec = FrameCodec::new();
        codec.push(&wire);
        assert_eq!(codec.decode().unwrap_err().code(), Some(ErrorCode::ProtocolError));
    }

    #[test]
    fn test_header_block_cap() {
        let mut codec = FrameCodec::with_max_frame_size(1 << 20);
        let mut wire = BytesMut::new();
        FrameCodec::encode_headers_frame(&HeadersFrame::new(1, Bytes::from(vec![0; 1 << 19]), false, false), &mut wire);
        for _ in 0..2 {
            FrameCodec::encode_continuation_frame(
                &ContinuationFrame {
                    stream_id: 1,
                    header_block: Bytes::from(vec![0; 1 << 19]),
                    end_headers: false,
                },
                &mut wire,
            );
        }
        codec.push(&wire);
        assert_eq!(codec.decode().unwrap_err().code(), Some(ErrorCode::EnhanceYourCalm));
    }

    #[test]
    fn test_encode_headers_with_priority_split() {
        let mut wire = BytesMut::new();
        let priority = Some(PrioritySpec::new(0, false, 16));
        FrameCodec::encode_headers(1, Bytes::from(vec![1u8; 20]), false, priority, 16, &mut wire);

        let (first, used) = FrameCodec::parse(&wire, 16).unwrap().unwrap();
        match first {
            Frame::Headers(h) => {
                assert_eq!(h.header_block.len(), 11);
                assert!(!h.end_headers);
            }
            other => panic!("unexpected {:?}", other),
        }
        let (second, _) = FrameCodec::parse(&wire[used..], 16).unwrap().unwrap();
        match second {
            Frame::Continuation(c) => {
                assert_eq!(c.header_block.len(), 9);
                assert!(c.end_headers);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
