//! HTTP/2 client connection preface stripping (spec.md §4.2).
//!
//! The original implementation (`original_source/dockersnoop.go`,
//! `drainClientPreface`) runs this check unconditionally on every event,
//! which the spec (§9, "Preface detection bug in source") calls out as
//! harmless-but-fragile: it happens to be a no-op after the first match
//! because later bytes never start with the preface again, but a
//! pathological payload could still be mangled. Here the check is gated on
//! `ConnectionState::preface_seen` so it only ever runs once per connection,
//! per the note's own suggested fix.

pub const PREFACE: &[u8; 24] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// If `payload` begins with the HTTP/2 client preface, return the remainder
/// with the preface dropped. Otherwise return `payload` unchanged.
pub fn strip(payload: &[u8]) -> &[u8] {
    if payload.len() >= PREFACE.len() && &payload[..PREFACE.len()] == PREFACE {
        &payload[PREFACE.len()..]
    } else {
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_exact_preface() {
        let mut payload = PREFACE.to_vec();
        payload.extend_from_slice(b"rest");
        assert_eq!(strip(&payload), b"rest");
    }

    #[test]
    fn leaves_non_matching_payload_untouched() {
        let payload = b"not the preface at all";
        assert_eq!(strip(payload), payload);
    }

    #[test]
    fn leaves_short_payload_untouched() {
        let payload = b"PRI * HTTP";
        assert_eq!(strip(payload), payload);
    }
}
