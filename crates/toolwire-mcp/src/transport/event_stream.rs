//! Incremental decoder for `text/event-stream` bodies.
//!
//! Both HTTP sub-protocols carry JSON-RPC messages inside server-sent events:
//! the streamable variant may answer a POST with an event stream, and the SSE
//! variant keeps one stream open for the whole session.

/// One dispatched server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    /// Event type, defaulting to `message` as the format prescribes
    pub fn name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Accepts arbitrary byte chunks and yields complete events
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns the events completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush an event left unterminated at end of stream
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            let line = line.trim_end_matches('\r');
            if let Some(event) = self.process_line(line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    /// Decode a complete body in one go
    pub fn decode_all(body: &str) -> Vec<SseEvent> {
        let mut decoder = Self::new();
        let mut events = decoder.feed(body.as_bytes());
        events.extend(decoder.finish());
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() && self.event.is_none() {
            return None;
        }
        let event = SseEvent {
            event: self.event.take(),
            data: self.data.join("\n"),
            id: self.id.take(),
        };
        self.data.clear();
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: endpoint\r\nda").is_empty());
        let events = decoder.feed(b"ta: /messages?sessionId=abc\r\n\r\ndata: {\"id\":1}\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name(), "endpoint");
        assert_eq!(events[0].data, "/messages?sessionId=abc");
        assert_eq!(events[1].name(), "message");
        assert_eq!(events[1].data, "{\"id\":1}");
    }

    #[test]
    fn test_comments_and_multiline_data() {
        let events = SseDecoder::decode_all(": keep-alive\nid: 7\ndata: a\ndata: b\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a\nb");
        assert_eq!(events[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn test_unterminated_final_event_flushed() {
        let events = SseDecoder::decode_all("event: message\ndata: {}");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{}");
    }
}
