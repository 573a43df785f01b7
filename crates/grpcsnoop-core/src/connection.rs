//! Per-connection state and the connection demultiplexer (spec.md §4.1's
//! "Connection demultiplexer", §3). One `ConnectionState` exists per
//! `conn_id` the kernel probe reports; one `ConnectionTable` exists per
//! running `Decoder`.

use std::collections::HashMap;

use crate::frame::Framer;
use crate::hpack::HpackDecoder;
use crate::stream::StreamState;

#[derive(Debug, Default)]
pub struct ConnectionState {
    pub framer: Framer,
    pub preface_seen: bool,
    /// HPACK state for the request direction (spec.md §9, "Open question:
    /// HPACK directionality") — this connection's first HEADERS block on
    /// every stream decodes here.
    pub req_hpack: HpackDecoder,
    /// HPACK state for the response direction: every HEADERS block after a
    /// stream's first (response headers, trailers) decodes here.
    pub resp_hpack: HpackDecoder,
    pub streams: HashMap<u32, StreamState>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(&mut self, stream_id: u32) -> &mut StreamState {
        self.streams.entry(stream_id).or_insert_with(StreamState::new)
    }

    /// Drop a stream's state once it closes (END_STREAM both ways, or
    /// RST_STREAM) so a long-lived connection doesn't accumulate state for
    /// streams that will never be referenced again (spec.md §4.5).
    pub fn close_stream(&mut self, stream_id: u32) {
        self.streams.remove(&stream_id);
    }
}

/// conn_id -> ConnectionState. Connections are never explicitly torn down
/// by a FIN observed at this layer (the probe only sees `sendmsg`, not
/// socket close) — spec.md doesn't define a conn_id reuse policy, so state
/// simply accumulates per conn_id for the tracer's lifetime, same as the
/// original implementation's `framers`/`paths`/`side` maps.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    conns: HashMap<u64, ConnectionState>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert(&mut self, conn_id: u64) -> &mut ConnectionState {
        self.conns.entry(conn_id).or_insert_with(ConnectionState::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_conn_ids_get_isolated_state() {
        let mut table = ConnectionTable::new();
        table.get_or_insert(1).preface_seen = true;
        assert!(!table.get_or_insert(2).preface_seen);
        assert!(table.get_or_insert(1).preface_seen);
    }

    #[test]
    fn closing_a_stream_drops_its_state() {
        let mut conn = ConnectionState::new();
        conn.stream(7).method_path = Some("/a/b".into());
        conn.close_stream(7);
        assert!(conn.stream(7).method_path.is_none());
    }
}
