//! Event ingress: decode the fixed-size kernel-probe record prefix and slice
//! out the payload. See spec.md §4.1 and §6 for the wire layout.

use crate::error::DecodeError;

/// Byte layout of the fixed prefix, host byte order (spec.md §6):
/// `pid:u32, tid:u32, peer_pid:u32, len:u32, conn_id:u64, comm:[u8;16]`.
pub const HEADER_SIZE: usize = 4 + 4 + 4 + 4 + 8 + 16;

/// One decoded kernel-probe record: a raw slice of a single `sendmsg`
/// payload plus the task identity that produced it.
#[derive(Debug)]
pub struct Event<'a> {
    pub pid: u32,
    pub tid: u32,
    pub peer_pid: u32,
    pub conn_id: u64,
    pub comm: [u8; 16],
    pub payload: &'a [u8],
}

impl<'a> Event<'a> {
    /// Parse one record out of `buf`. `buf` must contain exactly one
    /// record's fixed prefix plus its declared payload length — the probe
    /// submits one record per iovec segment, never a batch (spec.md §4.1).
    pub fn parse(buf: &'a [u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_SIZE {
            return Err(DecodeError::EventTooShort(buf.len()));
        }

        let pid = u32::from_ne_bytes(buf[0..4].try_into().unwrap());
        let tid = u32::from_ne_bytes(buf[4..8].try_into().unwrap());
        let peer_pid = u32::from_ne_bytes(buf[8..12].try_into().unwrap());
        let len = u32::from_ne_bytes(buf[12..16].try_into().unwrap()) as usize;
        let conn_id = u64::from_ne_bytes(buf[16..24].try_into().unwrap());
        let mut comm = [0u8; 16];
        comm.copy_from_slice(&buf[24..40]);

        let payload_end = HEADER_SIZE + len;
        if buf.len() < payload_end {
            return Err(DecodeError::EventTooShort(buf.len()));
        }

        Ok(Event {
            pid,
            tid,
            peer_pid,
            conn_id,
            comm,
            payload: &buf[HEADER_SIZE..payload_end],
        })
    }

    /// `comm` with embedded NUL bytes stripped, not just trailing ones — the
    /// original implementation uses `strings.Replace(comm, "\x00", "", -1)`,
    /// which matters if a short comm still has garbage after the first NUL.
    pub fn comm_str(&self) -> std::borrow::Cow<'_, str> {
        let cleaned: Vec<u8> = self.comm.iter().copied().filter(|&b| b != 0).collect();
        match String::from_utf8(cleaned) {
            Ok(s) => std::borrow::Cow::Owned(s),
            Err(_) => String::from_utf8_lossy(&self.comm).into_owned().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_record(pid: u32, conn_id: u64, comm: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&pid.to_ne_bytes());
        buf.extend_from_slice(&1u32.to_ne_bytes()); // tid
        buf.extend_from_slice(&2u32.to_ne_bytes()); // peer_pid
        buf.extend_from_slice(&(payload.len() as u32).to_ne_bytes());
        buf.extend_from_slice(&conn_id.to_ne_bytes());
        let mut c = [0u8; 16];
        c[..comm.len()].copy_from_slice(comm);
        buf.extend_from_slice(&c);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn parses_fixed_prefix_and_payload() {
        let record = build_record(42, 7, b"containerd", b"hello");
        let ev = Event::parse(&record).unwrap();
        assert_eq!(ev.pid, 42);
        assert_eq!(ev.tid, 1);
        assert_eq!(ev.peer_pid, 2);
        assert_eq!(ev.conn_id, 7);
        assert_eq!(ev.payload, b"hello");
        assert_eq!(ev.comm_str(), "containerd");
    }

    #[test]
    fn rejects_truncated_header() {
        let record = build_record(1, 1, b"x", b"y");
        assert!(Event::parse(&record[..HEADER_SIZE - 1]).is_err());
    }

    #[test]
    fn rejects_truncated_payload() {
        let record = build_record(1, 1, b"x", b"longer payload here");
        assert!(Event::parse(&record[..record.len() - 1]).is_err());
    }

    #[test]
    fn comm_strips_interior_nul() {
        let record = build_record(1, 1, b"a\0b", b"");
        let ev = Event::parse(&record).unwrap();
        assert_eq!(ev.comm_str(), "ab");
    }
}
