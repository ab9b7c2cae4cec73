//! Connection preface and initial SETTINGS
//!
//! The first bytes a client puts on the wire (RFC 7540 Section 3.5): the
//! 24-octet magic, a SETTINGS frame and, when the local initial window is
//! larger than the default, a connection-level WINDOW_UPDATE that grants the
//! difference.

use super::codec::FrameCodec;
use super::frames::{SettingsFrame, WindowUpdateFrame};
use super::settings::Settings;
use super::{CONNECTION_PREFACE, CONNECTION_STREAM_ID, DEFAULT_INITIAL_WINDOW_SIZE};
use bytes::{Bytes, BytesMut};

/// The 24-octet connection preface
pub fn preface() -> Bytes {
    Bytes::from_static(CONNECTION_PREFACE)
}

/// Serialize the client's SETTINGS frame.
///
/// Server push is always disabled; the other parameters are sent as carried
/// by `settings`.
pub fn settings(settings: &Settings) -> Bytes {
    let mut settings = settings.clone();
    settings.enable_push = Some(false);

    let mut dst = BytesMut::with_capacity(9 + settings.encoded_len());
    FrameCodec::encode_settings_frame(&SettingsFrame::new(settings), &mut dst);
    dst.freeze()
}

/// Connection WINDOW_UPDATE raising the receive window from the RFC
/// default to the advertised initial window size, if it is larger
pub fn connection_window_update(settings: &Settings) -> Option<WindowUpdateFrame> {
    let initial = settings.get_initial_window_size();
    if initial > DEFAULT_INITIAL_WINDOW_SIZE {
        Some(WindowUpdateFrame::new(
            CONNECTION_STREAM_ID,
            initial - DEFAULT_INITIAL_WINDOW_SIZE,
        ))
    } else {
        None
    }
}

/// Everything a client writes before its first request
pub fn handshake(settings: &Settings) -> Bytes {
    let mut dst = BytesMut::new();
    dst.extend_from_slice(CONNECTION_PREFACE);
    dst.extend_from_slice(&self::settings(settings));
    if let Some(update) = connection_window_update(settings) {
        FrameCodec::encode_window_update_frame(&update, &mut dst);
    }
    dst.freeze()
}
