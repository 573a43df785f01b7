//! Error taxonomy for the decode pipeline.
//!
//! Per spec.md §7, almost none of these ever abort the process: they are
//! either logged-and-skip (one event, one message) or logged-and-poison (one
//! connection). `Decoder::feed` is the only place that inspects the
//! `is_poisoning` distinction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("event header too short: {0} bytes")]
    EventTooShort(usize),

    #[error("malformed http/2 frame: {0}")]
    InvalidHttp2(&'static str),

    #[error("hpack decode failed: {0}")]
    InvalidHpack(String),

    #[error("protobuf decode failed: {0}")]
    InvalidProtobuf(#[from] prost::DecodeError),
}

impl DecodeError {
    /// Protocol-level violations poison the connection (spec.md §7,
    /// "Protocol violation"); everything else is a per-event or per-message
    /// condition the decoder recovers from on its own.
    pub fn poisons_connection(&self) -> bool {
        matches!(self, DecodeError::InvalidHttp2(_) | DecodeError::InvalidHpack(_))
    }
}
