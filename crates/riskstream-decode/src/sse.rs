//! Server-Sent Events (SSE) frame parsing
//!
//! The vendor stream delivers named frames (`heartbeat`, `events`) separated
//! by blank lines. Frames are surfaced even when their payload is empty so
//! the consumer can observe and discard heartbeats explicitly.

/// Kind of a single SSE frame, derived from its `event:` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Heartbeat,
    Events,
    Unknown,
}

impl FrameKind {
    fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("heartbeat") => FrameKind::Heartbeat,
            Some("events") => FrameKind::Events,
            _ => FrameKind::Unknown,
        }
    }
}

/// A single SSE frame; ephemeral, consumed immediately after parsing
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub kind: FrameKind,

    /// Frame name as sent by the server, for diagnostics on unknown kinds
    pub name: Option<String>,

    /// Joined `data:` lines; empty for bare keep-alives
    pub data: String,
}

/// Incremental SSE parser for streaming response bodies
pub struct FrameParser {
    buffer: String,
    frames: Vec<RawFrame>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            frames: Vec::new(),
        }
    }

    /// Add body bytes to the parser. Non-UTF-8 chunks are replaced rather
    /// than aborting the stream.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.push_str(&String::from_utf8_lossy(data));
        self.parse_buffer();
    }

    /// Take all completely parsed frames
    pub fn take_frames(&mut self) -> Vec<RawFrame> {
        std::mem::take(&mut self.frames)
    }

    fn parse_buffer(&mut self) {
        loop {
            // Frames are separated by blank lines; accept LF and CRLF
            let (pos, sep_len) = match (self.buffer.find("\n\n"), self.buffer.find("\r\n\r\n")) {
                (Some(lf), Some(crlf)) if crlf < lf => (crlf, 4),
                (Some(lf), _) => (lf, 2),
                (None, Some(crlf)) => (crlf, 4),
                (None, None) => break,
            };

            let frame_text = self.buffer[..pos].to_string();
            self.buffer.drain(..pos + sep_len);

            if let Some(frame) = Self::parse_frame(&frame_text) {
                self.frames.push(frame);
            }
        }
    }

    fn parse_frame(text: &str) -> Option<RawFrame> {
        let mut name = None;
        let mut data_lines = Vec::new();
        let mut saw_field = false;

        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.starts_with(':') {
                // Comment line, ignored per the SSE spec
                continue;
            }
            if let Some(rest) = line.strip_prefix("event:") {
                name = Some(rest.trim().to_string());
                saw_field = true;
            } else if let Some(rest) = line.strip_prefix("data:") {
                data_lines.push(rest.trim().to_string());
                saw_field = true;
            }
            // id: and retry: carry no meaning for this stream
        }

        if !saw_field {
            return None;
        }

        Some(RawFrame {
            kind: FrameKind::from_name(name.as_deref()),
            name,
            data: data_lines.join("\n"),
        })
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_frame_with_data() {
        let mut parser = FrameParser::new();
        parser.feed(b"event: events\ndata: {\"events\":[]}\n\n");

        let frames = parser.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Events);
        assert_eq!(frames[0].data, r#"{"events":[]}"#);
    }

    #[test]
    fn test_heartbeat_without_payload_is_surfaced() {
        let mut parser = FrameParser::new();
        parser.feed(b"event: heartbeat\n\n");

        let frames = parser.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Heartbeat);
        assert!(frames[0].data.is_empty());
    }

    #[test]
    fn test_partial_frame_waits_for_delimiter() {
        let mut parser = FrameParser::new();
        parser.feed(b"event: events\ndata: {\"ev");
        assert!(parser.take_frames().is_empty());

        parser.feed(b"ents\":[]}\n\n");
        let frames = parser.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, r#"{"events":[]}"#);
    }

    #[test]
    fn test_crlf_delimited_frames() {
        let mut parser = FrameParser::new();
        parser.feed(b"event: heartbeat\r\n\r\nevent: events\r\ndata: {}\r\n\r\n");

        let frames = parser.take_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].kind, FrameKind::Heartbeat);
        assert_eq!(frames[1].kind, FrameKind::Events);
        assert_eq!(frames[1].data, "{}");
    }

    #[test]
    fn test_multi_line_data_is_joined() {
        let mut parser = FrameParser::new();
        parser.feed(b"event: events\ndata: line1\ndata: line2\n\n");

        let frames = parser.take_frames();
        assert_eq!(frames[0].data, "line1\nline2");
    }

    #[test]
    fn test_unknown_frame_name() {
        let mut parser = FrameParser::new();
        parser.feed(b"event: devices\ndata: x\n\n");

        let frames = parser.take_frames();
        assert_eq!(frames[0].kind, FrameKind::Unknown);
        assert_eq!(frames[0].name.as_deref(), Some("devices"));
    }

    #[test]
    fn test_comments_are_ignored() {
        let mut parser = FrameParser::new();
        parser.feed(b": keep-alive comment\n\nevent: heartbeat\n\n");

        let frames = parser.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, FrameKind::Heartbeat);
    }
}
