//! Incremental HTTP/2 framer: turns an append-only byte stream into a lazy
//! sequence of frames, tolerant of arbitrary kernel-to-user segmentation
//! (spec.md §4.3). Adapted from the teacher's read-side frame parser
//! (`http2::Frame::parse`), generalized from "parse one frame out of a
//! fully-buffered read" to "parse frames out of a buffer fed by many small
//! `push`es", since a tracer — unlike a server reading its own socket — has
//! no control over how much of a frame arrives in one kernel event.

use crate::error::DecodeError;

/// Header-list size cap from spec.md §4.3.
const MAX_HEADER_LIST_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Headers,
    Priority,
    Reset,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl FrameKind {
    fn from(byte: u8) -> Self {
        match byte {
            0 => FrameKind::Data,
            1 => FrameKind::Headers,
            2 => FrameKind::Priority,
            3 => FrameKind::Reset,
            4 => FrameKind::Settings,
            5 => FrameKind::PushPromise,
            6 => FrameKind::Ping,
            7 => FrameKind::GoAway,
            8 => FrameKind::WindowUpdate,
            9 => FrameKind::Continuation,
            other => FrameKind::Unknown(other),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct HeadFlags(u8);

impl HeadFlags {
    const END_STREAM: u8 = 0x1;
    const END_HEADERS: u8 = 0x4;
    const PADDED: u8 = 0x8;
    const PRIORITY: u8 = 0x20;

    pub fn is_end_stream(self) -> bool {
        self.0 & Self::END_STREAM != 0
    }
    pub fn is_end_headers(self) -> bool {
        self.0 & Self::END_HEADERS != 0
    }
    fn is_padded(self) -> bool {
        self.0 & Self::PADDED != 0
    }
    fn is_priority(self) -> bool {
        self.0 & Self::PRIORITY != 0
    }
}

/// A complete frame, header parsed and padding/priority already stripped
/// from `payload` where applicable. Owns its payload: unlike the teacher's
/// server-side framer (which borrows directly from a single synchronous
/// read), frames here frequently outlive the buffer they were cut from —
/// CONTINUATION accumulation and gRPC reassembly both need to hold onto
/// frame bytes across later `push`es, which would otherwise alias a buffer
/// we're about to compact.
#[derive(Debug)]
pub struct Frame {
    pub kind: FrameKind,
    pub flags: HeadFlags,
    pub stream_id: u32,
    pub payload: Vec<u8>,
}

const HEAD_SIZE: usize = 9;

impl Frame {
    fn parse_at(buf: &[u8]) -> Option<(Frame, usize)> {
        if buf.len() < HEAD_SIZE {
            return None;
        }
        let len = u32::from_be_bytes([0, buf[0], buf[1], buf[2]]) as usize;
        if buf.len() - HEAD_SIZE < len {
            return None;
        }
        let kind = FrameKind::from(buf[3]);
        let flags = HeadFlags(buf[4]);
        let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7fff_ffff;
        let payload = buf[HEAD_SIZE..HEAD_SIZE + len].to_vec();

        Some((
            Frame {
                kind,
                flags,
                stream_id,
                payload,
            },
            HEAD_SIZE + len,
        ))
    }

    /// Strip RFC 7540 PADDED framing and, for HEADERS, the priority prefix,
    /// returning the header-block fragment this frame actually contributes.
    pub fn header_block_fragment(&self) -> Result<&[u8], DecodeError> {
        let buf = self.skip_padded(&self.payload)?;
        if self.kind == FrameKind::Headers {
            self.skip_priority(buf)
        } else {
            Ok(buf)
        }
    }

    /// Strip RFC 7540 PADDED framing from a DATA frame.
    pub fn data_payload(&self) -> Result<&[u8], DecodeError> {
        self.skip_padded(&self.payload)
    }

    fn skip_padded<'b>(&self, buf: &'b [u8]) -> Result<&'b [u8], DecodeError> {
        if !self.flags.is_padded() {
            return Ok(buf);
        }
        if buf.is_empty() {
            return Err(DecodeError::InvalidHttp2("PADDED frame missing pad length"));
        }
        let pad_len = buf[0] as usize;
        if buf.len() < 1 + pad_len {
            return Err(DecodeError::InvalidHttp2("pad length exceeds frame"));
        }
        Ok(&buf[1..buf.len() - pad_len])
    }

    fn skip_priority<'b>(&self, buf: &'b [u8]) -> Result<&'b [u8], DecodeError> {
        if !self.flags.is_priority() {
            return Ok(buf);
        }
        if buf.len() < 5 {
            return Err(DecodeError::InvalidHttp2("PRIORITY flag set but frame too short"));
        }
        Ok(&buf[5..])
    }
}

/// Incremental per-direction byte-stream parser. One `Framer` belongs to one
/// `ConnectionState` (spec.md §3).
#[derive(Debug, Default)]
pub struct Framer {
    buf: Vec<u8>,
    pos: usize,
    poisoned: bool,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn poison(&mut self) {
        self.poisoned = true;
    }

    /// Append newly captured bytes to the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete frame, if any. Returns `Ok(None)` ("need
    /// more") without consuming anything when the buffer doesn't yet hold a
    /// full frame — segmentation of the underlying bytes is never
    /// observable in what frames come out (spec.md §8, invariant 1).
    pub fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.poisoned {
            return Ok(None);
        }
        match Frame::parse_at(&self.buf[self.pos..]) {
            Some((frame, consumed)) => {
                self.pos += consumed;
                // Reclaim consumed bytes once they stop being referenced by
                // any in-flight frame, bounding memory for long connections.
                if self.pos > 0 && self.pos == self.buf.len() {
                    self.buf.clear();
                    self.pos = 0;
                } else if self.pos > 64 * 1024 {
                    self.buf.drain(0..self.pos);
                    self.pos = 0;
                }
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    pub fn header_list_size_cap() -> usize {
        MAX_HEADER_LIST_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_frame(kind: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let len = (payload.len() as u32).to_be_bytes();
        out.extend_from_slice(&len[1..]);
        out.push(kind);
        out.push(flags);
        out.extend_from_slice(&stream_id.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn needs_more_on_partial_header() {
        let mut f = Framer::new();
        f.push(&[0, 0]);
        assert!(f.next_frame().unwrap().is_none());
    }

    #[test]
    fn needs_more_on_partial_payload() {
        let full = build_frame(0, 0, 1, b"hello world");
        let mut f = Framer::new();
        f.push(&full[..full.len() - 3]);
        assert!(f.next_frame().unwrap().is_none());
        f.push(&full[full.len() - 3..]);
        let frame = f.next_frame().unwrap().unwrap();
        assert_eq!(frame.payload, b"hello world");
    }

    #[test]
    fn segmentation_is_not_observable() {
        let a = build_frame(0, 0, 1, b"first");
        let b = build_frame(1, 4, 3, b"second-frame-body");
        let whole: Vec<u8> = a.iter().chain(b.iter()).copied().collect();

        // Whole buffer at once.
        let mut f1 = Framer::new();
        f1.push(&whole);
        let mut frames1 = Vec::new();
        while let Some(fr) = f1.next_frame().unwrap() {
            frames1.push((fr.stream_id, fr.payload));
        }

        // Byte-at-a-time.
        let mut f2 = Framer::new();
        let mut frames2 = Vec::new();
        for byte in &whole {
            f2.push(std::slice::from_ref(byte));
            while let Some(fr) = f2.next_frame().unwrap() {
                frames2.push((fr.stream_id, fr.payload));
            }
        }

        assert_eq!(frames1, frames2);
    }

    #[test]
    fn strips_padding_and_priority() {
        // HEADERS with PADDED(0x8)+PRIORITY(0x20): pad_len(1) + priority(5) + data + pad
        let mut payload = vec![2u8]; // pad_len = 2
        payload.extend_from_slice(&[0, 0, 0, 0, 0]); // priority block (stream dep + weight)
        payload.extend_from_slice(b"hdrs");
        payload.extend_from_slice(&[0, 0]); // padding
        let raw = build_frame(1, 0x8 | 0x20 | 0x4, 5, &payload);

        let mut f = Framer::new();
        f.push(&raw);
        let frame = f.next_frame().unwrap().unwrap();
        assert_eq!(frame.header_block_fragment().unwrap(), b"hdrs");
    }
}
