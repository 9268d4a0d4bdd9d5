//! Native-messaging framing: each message is UTF-8 JSON preceded by its byte
//! length as a 32-bit unsigned integer in native byte order.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::codec::LengthDelimitedCodec;

use crate::error::FrameError;

/// Largest frame accepted in either direction (the browser's host→extension cap).
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .native_endian()
        .max_frame_length(MAX_MESSAGE_BYTES)
        .new_codec()
}

pub fn encode<T: Serialize>(message: &T) -> Result<Bytes, FrameError> {
    Ok(Bytes::from(serde_json::to_vec(message)?))
}

pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, FrameError> {
    Ok(serde_json::from_slice(frame)?)
}
