//! HPACK header decompression (spec.md §4.4).
//!
//! Thin wrapper over `fluke_hpack::Decoder`, which owns the dynamic table
//! and honors in-band table-size updates on our behalf. One `HpackDecoder`
//! is created per `(conn_id, direction)` pair (spec.md §9, "Open question:
//! HPACK directionality") since each half-duplex direction of an HTTP/2
//! connection keeps its own compression state.

use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl HeaderField {
    pub fn name_is(&self, name: &str) -> bool {
        self.name == name.as_bytes()
    }
}

pub struct HpackDecoder {
    inner: fluke_hpack::Decoder<'static>,
}

impl std::fmt::Debug for HpackDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackDecoder").finish_non_exhaustive()
    }
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackDecoder {
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Decoder::new(),
        }
    }

    /// Decode one header block (a HEADERS frame's fragment, or the
    /// concatenation of a HEADERS frame plus its CONTINUATION fragments)
    /// into an ordered list of header fields.
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<HeaderField>, DecodeError> {
        let pairs = self
            .inner
            .decode(block)
            .map_err(|e| DecodeError::InvalidHpack(format!("{e:?}")))?;
        Ok(pairs
            .into_iter()
            .map(|(name, value)| HeaderField { name, value })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal_without_indexing(name: &str, value: &str) -> Vec<u8> {
        // 0000_0000 prefix (literal without indexing, name not indexed),
        // then length-prefixed plain strings for name and value.
        let mut out = vec![0u8];
        out.push(name.len() as u8);
        out.extend_from_slice(name.as_bytes());
        out.push(value.len() as u8);
        out.extend_from_slice(value.as_bytes());
        out
    }

    #[test]
    fn decodes_literal_header_without_indexing() {
        let block = literal_without_indexing(":path", "/containerd.services.version.v1.Version/Version");
        let mut dec = HpackDecoder::new();
        let fields = dec.decode(&block).unwrap();
        assert_eq!(fields.len(), 1);
        assert!(fields[0].name_is(":path"));
        assert_eq!(fields[0].value, b"/containerd.services.version.v1.Version/Version");
    }

    #[test]
    fn dynamic_table_persists_across_calls() {
        let mut dec = HpackDecoder::new();
        // Literal with incremental indexing: prefix 0b01 + name/value literal.
        let mut insert = vec![0b0100_0000u8];
        insert.push(7);
        insert.extend_from_slice(b"x-token");
        insert.push(3);
        insert.extend_from_slice(b"abc");
        dec.decode(&insert).unwrap();

        // Indexed header field referencing dynamic table entry 62 (first
        // dynamic entry, right after the 61 static entries).
        let indexed = vec![0b1000_0000u8 | 62];
        let fields = dec.decode(&indexed).unwrap();
        assert_eq!(fields.len(), 1);
        assert!(fields[0].name_is("x-token"));
        assert_eq!(fields[0].value, b"abc");
    }
}
