//! Top-level orchestrator: kernel-probe record -> connection demux ->
//! preface strip -> HTTP/2 framing -> HEADERS/DATA handling -> gRPC
//! reassembly -> schema dispatch -> rendering (spec.md §4 end to end).

use crate::connection::ConnectionTable;
use crate::error::DecodeError;
use crate::event::Event;
use crate::frame::{Frame, FrameKind};
use crate::preface;
use crate::render::{self, RenderInput, RenderOptions, Rendered};
use crate::schema;
use crate::stream::Direction;

#[derive(Debug)]
pub struct Decoder {
    conns: ConnectionTable,
    opts: RenderOptions,
}

impl Decoder {
    pub fn new(opts: RenderOptions) -> Self {
        Self {
            conns: ConnectionTable::new(),
            opts,
        }
    }

    /// Feed one kernel-probe record's raw bytes through the whole pipeline.
    /// Returns every message this event completed — usually zero or one,
    /// occasionally more than one when a single DATA frame carries two
    /// gRPC messages back to back (spec.md §8).
    ///
    /// Per-event and per-message errors (everything `DecodeError` names
    /// except a protocol violation) are logged here and do not propagate:
    /// the caller keeps feeding subsequent events. A protocol violation
    /// poisons the connection's framer, per spec.md §7; this function still
    /// returns `Ok` so the caller's loop doesn't need special handling.
    pub fn feed(&mut self, buf: &[u8]) -> Result<Vec<Rendered>, DecodeError> {
        let event = Event::parse(buf)?;
        let comm = event.comm_str().into_owned();
        let conn = self.conns.get_or_insert(event.conn_id);

        let payload = if conn.preface_seen {
            event.payload
        } else {
            conn.preface_seen = true;
            preface::strip(event.payload)
        };

        if conn.framer.is_poisoned() {
            return Ok(Vec::new());
        }
        conn.framer.push(payload);

        let mut out = Vec::new();
        loop {
            let frame = match conn.framer.next_frame() {
                Ok(Some(f)) => f,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(conn_id = event.conn_id, error = %e, "malformed http/2 frame");
                    if e.poisons_connection() {
                        conn.framer.poison();
                    }
                    break;
                }
            };

            match frame.kind {
                FrameKind::Headers | FrameKind::Continuation => {
                    if let Err(e) = Self::handle_headers(conn, &frame) {
                        tracing::warn!(conn_id = event.conn_id, stream_id = frame.stream_id, error = %e, "bad header block");
                        if e.poisons_connection() {
                            conn.framer.poison();
                        }
                        break;
                    }
                }
                FrameKind::Data => {
                    let stream_id = frame.stream_id;
                    let data = match frame.data_payload() {
                        Ok(d) => d,
                        Err(e) => {
                            tracing::warn!(conn_id = event.conn_id, stream_id, error = %e, "bad DATA framing");
                            if e.poisons_connection() {
                                conn.framer.poison();
                            }
                            break;
                        }
                    };

                    if !data.is_empty() {
                        let stream = conn.stream(stream_id);
                        if let Some(method) = stream.method_path.clone() {
                            let direction = Direction::from(stream.direction_hint);

                            let mut messages = Vec::new();
                            stream.reassembler_for(direction).feed(data, &mut messages);

                            for msg in messages {
                                if msg.compressed {
                                    tracing::warn!(conn_id = event.conn_id, stream_id, method = %method, "compressed gRPC message body, decoding not supported, skipping");
                                    continue;
                                }

                                let Some(schema) = schema::lookup(&method) else {
                                    if schema::mark_unknown_logged(&method) {
                                        tracing::warn!(conn_id = event.conn_id, stream_id, method = %method, "no known schema for method, skipping message");
                                    }
                                    continue;
                                };
                                let decode = match direction {
                                    Direction::Response => schema.response,
                                    Direction::Request | Direction::Unknown => schema.request,
                                };
                                let decoded = match decode(&msg.body) {
                                    Ok(d) => d,
                                    Err(e) => {
                                        tracing::warn!(conn_id = event.conn_id, stream_id, method = %method, error = %e, "protobuf decode failed, skipping message");
                                        if e.poisons_connection() {
                                            conn.framer.poison();
                                            break;
                                        }
                                        continue;
                                    }
                                };

                                let input = RenderInput {
                                    comm: &comm,
                                    pid: event.pid,
                                    tid: event.tid,
                                    peer_pid: event.peer_pid,
                                    direction,
                                    stream_id,
                                    method: &method,
                                    message: decoded.as_ref(),
                                };
                                out.push(render::render(&input, self.opts));
                            }
                        } else {
                            tracing::warn!(conn_id = event.conn_id, stream_id, "DATA frame with no preceding HEADERS, dropping");
                        }
                    }

                    if frame.flags.is_end_stream() {
                        let stream = conn.stream(stream_id);
                        let direction = Direction::from(stream.direction_hint);
                        if let Some(leftover) = stream.reassembler_for(direction).finish() {
                            tracing::warn!(conn_id = event.conn_id, stream_id, leftover, "stream ended with an incomplete gRPC message, discarding buffered bytes");
                        }
                        conn.close_stream(stream_id);
                    }
                }
                FrameKind::Reset => {
                    conn.close_stream(frame.stream_id);
                }
                _ => {}
            }
        }

        Ok(out)
    }

    /// Accumulate a HEADERS/CONTINUATION fragment; once END_HEADERS
    /// arrives, HPACK-decode the full block and update the stream's
    /// direction/method-path classification (spec.md §4.3, §4.5).
    fn handle_headers(
        conn: &mut crate::connection::ConnectionState,
        frame: &Frame,
    ) -> Result<(), DecodeError> {
        let fragment = frame.header_block_fragment()?;
        let stream_id = frame.stream_id;
        let stream = conn.stream(stream_id);
        stream.pending_header_block.extend_from_slice(fragment);
        if stream.pending_header_block.len() > crate::frame::Framer::header_list_size_cap() {
            return Err(DecodeError::InvalidHttp2("header block exceeds size cap"));
        }

        if !frame.flags.is_end_headers() {
            return Ok(());
        }

        let block = std::mem::take(&mut conn.stream(stream_id).pending_header_block);
        let direction = conn.stream(stream_id).next_header_block_direction();
        let hpack = match direction {
            Direction::Request => &mut conn.req_hpack,
            Direction::Response | Direction::Unknown => &mut conn.resp_hpack,
        };
        let fields = hpack.decode(&block)?;

        let mut path = None;
        let mut has_status = false;
        for field in &fields {
            if field.name_is(":path") {
                path = Some(field.value.clone());
            } else if field.name_is(":status") {
                has_status = true;
            }
        }
        conn.stream(stream_id).observe_headers(path, has_status);

        if frame.flags.is_end_stream() {
            conn.close_stream(stream_id);
        }
        Ok(())
    }
}

pub fn header_line() -> &'static str {
    render::HEADER_LINE
}

#[cfg(test)]
mod tests {
    use super::*;

    const END_STREAM: u8 = 0x1;
    const END_HEADERS: u8 = 0x4;
    const KIND_DATA: u8 = 0;
    const KIND_HEADERS: u8 = 1;

    fn build_event(conn_id: u64, comm: &str, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&100u32.to_ne_bytes()); // pid
        buf.extend_from_slice(&1u32.to_ne_bytes()); // tid
        buf.extend_from_slice(&2u32.to_ne_bytes()); // peer_pid
        buf.extend_from_slice(&(payload.len() as u32).to_ne_bytes());
        buf.extend_from_slice(&conn_id.to_ne_bytes());
        let mut c = [0u8; 16];
        let bytes = comm.as_bytes();
        c[..bytes.len().min(16)].copy_from_slice(&bytes[..bytes.len().min(16)]);
        buf.extend_from_slice(&c);
        buf.extend_from_slice(payload);
        buf
    }

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

    /// HPACK literal-header-without-indexing wire encoding for one field.
    fn literal_header(name: &str, value: &str) -> Vec<u8> {
        let mut out = vec![0u8];
        out.push(name.len() as u8);
        out.extend_from_slice(name.as_bytes());
        out.push(value.len() as u8);
        out.extend_from_slice(value.as_bytes());
        out
    }

    fn headers_frame(stream_id: u32, flags: u8, fields: &[(&str, &str)]) -> Vec<u8> {
        let mut block = Vec::new();
        for (name, value) in fields {
            block.extend_from_slice(&literal_header(name, value));
        }
        build_frame(KIND_HEADERS, flags, stream_id, &block)
    }

    /// gRPC length-prefixed framing: 1-byte compression flag + 4-byte
    /// big-endian length + body.
    fn grpc_message(body: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8];
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    /// Protobuf length-delimited (wire type 2) field: a single short string.
    fn pb_string_field(field_number: u32, s: &str) -> Vec<u8> {
        let mut out = vec![((field_number << 3) | 2) as u8];
        out.push(s.len() as u8);
        out.extend_from_slice(s.as_bytes());
        out
    }

    const GET_CONTAINER: &str = "/containerd.services.containers.v1.Containers/Get";

    #[test]
    fn req_line_decodes_end_to_end_headers_then_data() {
        let mut dec = Decoder::new(RenderOptions { complete_content: true });

        let headers = headers_frame(1, END_HEADERS, &[(":path", GET_CONTAINER)]);
        let out = dec.feed(&build_event(1, "containerd", &headers)).unwrap();
        assert!(out.is_empty());

        let body = pb_string_field(1, "abc");
        let data = build_frame(KIND_DATA, END_STREAM, 1, &grpc_message(&body));
        let out = dec.feed(&build_event(1, "containerd", &data)).unwrap();

        assert_eq!(out.len(), 1);
        assert!(out[0].line.contains("REQ"));
        assert!(out[0].line.contains(GET_CONTAINER));
    }

    #[test]
    fn resp_line_after_second_header_block_flips_direction() {
        let mut dec = Decoder::new(RenderOptions { complete_content: true });

        // First header block (no :status) establishes the method and
        // claims the request slot.
        let req_headers = headers_frame(1, END_HEADERS, &[(":path", GET_CONTAINER)]);
        dec.feed(&build_event(1, "containerd", &req_headers)).unwrap();

        // Second header block on the same stream carries :status, so it's
        // the response per-stream header_blocks_seen counting.
        let resp_headers = headers_frame(1, END_HEADERS, &[(":status", "200")]);
        dec.feed(&build_event(1, "containerd", &resp_headers)).unwrap();

        let data = build_frame(KIND_DATA, END_STREAM, 1, &grpc_message(&[]));
        let out = dec.feed(&build_event(1, "containerd", &data)).unwrap();

        assert_eq!(out.len(), 1);
        assert!(out[0].line.contains("RESP"));
    }

    #[test]
    fn unknown_method_is_skipped_without_rendering() {
        let mut dec = Decoder::new(RenderOptions { complete_content: true });

        let headers = headers_frame(1, END_HEADERS, &[(":path", "/not.a.Service/Method")]);
        dec.feed(&build_event(1, "containerd", &headers)).unwrap();

        let body = pb_string_field(1, "abc");
        let data1 = build_frame(KIND_DATA, 0, 1, &grpc_message(&body));
        let out1 = dec.feed(&build_event(1, "containerd", &data1)).unwrap();
        assert!(out1.is_empty());

        // A second message on the same unknown-method stream is still
        // skipped cleanly — the per-path dedup (schema::mark_unknown_logged)
        // only affects whether it's logged again, never whether it decodes.
        let data2 = build_frame(KIND_DATA, END_STREAM, 1, &grpc_message(&body));
        let out2 = dec.feed(&build_event(1, "containerd", &data2)).unwrap();
        assert!(out2.is_empty());
    }

    #[test]
    fn malformed_protobuf_body_does_not_poison_the_connection() {
        let mut dec = Decoder::new(RenderOptions { complete_content: true });

        let headers = headers_frame(1, END_HEADERS, &[(":path", GET_CONTAINER)]);
        dec.feed(&build_event(1, "containerd", &headers)).unwrap();

        // Declares a length-2 wire-type-2 field but supplies zero bytes of
        // content: a genuine prost::DecodeError, not a crash.
        let malformed = vec![0x0Au8, 0x02];
        let bad = build_frame(KIND_DATA, 0, 1, &grpc_message(&malformed));
        let out = dec.feed(&build_event(1, "containerd", &bad)).unwrap();
        assert!(out.is_empty());

        // The connection must still be usable: a well-formed message on the
        // same stream right after still decodes and renders.
        let good = pb_string_field(1, "abc");
        let ok = build_frame(KIND_DATA, END_STREAM, 1, &grpc_message(&good));
        let out = dec.feed(&build_event(1, "containerd", &ok)).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].line.contains(GET_CONTAINER));
    }

    #[test]
    fn stream_ending_mid_message_does_not_panic_or_hang() {
        let mut dec = Decoder::new(RenderOptions { complete_content: true });

        let headers = headers_frame(1, END_HEADERS, &[(":path", GET_CONTAINER)]);
        dec.feed(&build_event(1, "containerd", &headers)).unwrap();

        // Fewer than 5 bytes, and the stream ends right here: the old
        // unconditional b[5:]-style slice would wait forever for bytes
        // that are never coming. Decoder::feed must just log and move on.
        let short = build_frame(KIND_DATA, END_STREAM, 1, &[0u8, 0, 0]);
        let out = dec.feed(&build_event(1, "containerd", &short)).unwrap();
        assert!(out.is_empty());
    }
}
