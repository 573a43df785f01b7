//! Per-stream state machine (spec.md §4.5): tracks the method path and
//! request/response direction classification for one HTTP/2 stream id
//! within one connection.

use crate::reassembly::Reassembler;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
    Unknown,
}

#[derive(Debug, Default)]
pub struct StreamState {
    pub method_path: Option<String>,
    pub direction_hint: DirectionHint,
    pub req_reassembly: Reassembler,
    pub resp_reassembly: Reassembler,
    /// A CONTINUATION run in progress: the concatenated header-block
    /// fragments seen so far for this stream, flushed to the HPACK decoder
    /// once END_HEADERS arrives.
    pub pending_header_block: Vec<u8>,
    /// How many complete HEADERS(+CONTINUATION) blocks this stream has
    /// handed to an HPACK decoder. A stream's first block is always the
    /// request (the initiator always opens with `:path`); every later one
    /// — the response headers, and any trailers — belongs to the peer
    /// (spec.md §9, "Open question: HPACK directionality"). This lets the
    /// decoder be picked before decoding, rather than guessed from content.
    pub header_blocks_seen: u32,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum DirectionHint {
    #[default]
    Unknown,
    Request,
    Response,
}

impl From<DirectionHint> for Direction {
    fn from(hint: DirectionHint) -> Self {
        match hint {
            DirectionHint::Unknown => Direction::Unknown,
            DirectionHint::Request => Direction::Request,
            DirectionHint::Response => Direction::Response,
        }
    }
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the pseudo-headers observed on a HEADERS/trailers block.
    /// `:path` sets both the method and the REQUEST hint; `:status` sets
    /// the RESPONSE hint. Both may appear across a stream's life (trailers
    /// on a response) — the last one observed wins (spec.md §4.5).
    pub fn observe_headers(&mut self, path: Option<Vec<u8>>, has_status: bool) {
        if let Some(path) = path {
            self.method_path = String::from_utf8(path).ok();
            self.direction_hint = DirectionHint::Request;
        }
        if has_status {
            self.direction_hint = DirectionHint::Response;
        }
    }

    pub fn reassembler_for(&mut self, dir: Direction) -> &mut Reassembler {
        match dir {
            Direction::Request | Direction::Unknown => &mut self.req_reassembly,
            Direction::Response => &mut self.resp_reassembly,
        }
    }

    /// Which HPACK decoder and which direction the next complete header
    /// block on this stream belongs to, per `header_blocks_seen`.
    pub fn next_header_block_direction(&mut self) -> Direction {
        let dir = if self.header_blocks_seen == 0 {
            Direction::Request
        } else {
            Direction::Response
        };
        self.header_blocks_seen += 1;
        dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_sets_request_direction() {
        let mut s = StreamState::new();
        s.observe_headers(Some(b"/pkg.Svc/Method".to_vec()), false);
        assert_eq!(Direction::from(s.direction_hint), Direction::Request);
        assert_eq!(s.method_path.as_deref(), Some("/pkg.Svc/Method"));
    }

    #[test]
    fn status_sets_response_direction() {
        let mut s = StreamState::new();
        s.observe_headers(Some(b"/pkg.Svc/Method".to_vec()), false);
        s.observe_headers(None, true);
        assert_eq!(Direction::from(s.direction_hint), Direction::Response);
        // trailers carrying :status don't erase the method path learned
        // from the request HEADERS.
        assert_eq!(s.method_path.as_deref(), Some("/pkg.Svc/Method"));
    }

    #[test]
    fn first_header_block_is_request_rest_are_response() {
        let mut s = StreamState::new();
        assert_eq!(s.next_header_block_direction(), Direction::Request);
        assert_eq!(s.next_header_block_direction(), Direction::Response);
        assert_eq!(s.next_header_block_direction(), Direction::Response);
    }
}
