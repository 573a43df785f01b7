//! Line rendering (spec.md §4.8). Format and column widths are carried over
//! from the original implementation's `%-17s %-14s %-6d %-6d %-6d %-6s %-6d
//! %-55s %s\n` (SPEC_FULL.md "Header line"), reproduced once at startup and
//! then once per decoded message.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::stream::Direction;

pub const HEADER_LINE: &str =
    "TIMESTAMP         COMM           PID    TID    PEER   TYPE   STREAM METHOD                                                  MESSAGE";

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub complete_content: bool,
}

#[derive(Debug)]
pub struct Rendered {
    pub line: String,
}

/// Everything needed to render one decoded message, gathered by the
/// orchestrator from the event and stream state.
#[derive(Debug)]
pub struct RenderInput<'a> {
    pub comm: &'a str,
    pub pid: u32,
    pub tid: u32,
    pub peer_pid: u32,
    pub direction: Direction,
    pub stream_id: u32,
    pub method: &'a str,
    pub message: &'a dyn std::fmt::Debug,
}

pub fn render(input: &RenderInput<'_>, opts: RenderOptions) -> Rendered {
    let ts = format_timestamp(SystemTime::now());
    let dtype = match input.direction {
        Direction::Request => "REQ",
        Direction::Response => "RESP",
        Direction::Unknown => "?",
    };
    let body = format!("{:?}", input.message);
    let body = if !opts.complete_content && body.len() > 100 {
        truncate_at_char_boundary(&body, 100)
    } else {
        body
    };

    let line = format!(
        "{:<17} {:<14} {:<6} {:<6} {:<6} {:<6} {:<6} {:<55} {}",
        ts, input.comm, input.pid, input.tid, input.peer_pid, dtype, input.stream_id, input.method, body
    );
    Rendered { line }
}

fn truncate_at_char_boundary(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// `HH:MM:SS.microseconds`, UTC (there is no timezone database dependency
/// in this workspace, so unlike the Go original's local-time
/// `time.Now().Format`, this is always UTC wall-clock-of-day).
fn format_timestamp(now: SystemTime) -> String {
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs_of_day = since_epoch.as_secs() % 86_400;
    let hours = secs_of_day / 3600;
    let minutes = (secs_of_day % 3600) / 60;
    let seconds = secs_of_day % 60;
    let micros = since_epoch.subsec_micros();
    format!("{hours:02}:{minutes:02}:{seconds:02}.{micros:06}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_message_unless_complete_content() {
        let msg = "x".repeat(200);
        let input = RenderInput {
            comm: "containerd",
            pid: 1,
            tid: 1,
            peer_pid: 2,
            direction: Direction::Request,
            stream_id: 3,
            method: "/pkg.Svc/Method",
            message: &msg,
        };
        let short = render(&input, RenderOptions { complete_content: false });
        let long = render(&input, RenderOptions { complete_content: true });
        assert!(short.line.len() < long.line.len());
    }

    #[test]
    fn timestamp_has_expected_shape() {
        let ts = format_timestamp(SystemTime::now());
        assert_eq!(ts.len(), 15);
        assert_eq!(ts.as_bytes()[2], b':');
        assert_eq!(ts.as_bytes()[8], b'.');
    }
}
