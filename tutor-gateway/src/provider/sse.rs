//! Incremental decoder for OpenAI-style Server-Sent Event streams.
//!
//! Network chunks do not respect line boundaries (or even UTF-8 boundaries),
//! so bytes are buffered until a full line is available.

use serde::Deserialize;

/// Event decoded from one `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A non-empty piece of assistant text
    Delta(String),
    /// The `[DONE]` terminator
    Done,
    /// Upstream reported an error, or the chunk could not be parsed
    Error(String),
}

/// Line-buffering SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk, returning every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = parse_line(line.trim_end_matches(['\r', '\n'])) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        parse_line(line.trim()).into_iter().collect()
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

/// Parse one line; comments, blank lines, and non-data fields yield nothing.
fn parse_line(line: &str) -> Option<SseEvent> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => return Some(SseEvent::Error(format!("Malformed stream chunk: {}", e))),
    };

    if let Some(error) = chunk.error {
        return Some(SseEvent::Error(error.message));
    }

    // Role-only and finish deltas carry no content.
    let content = chunk.choices.into_iter().next()?.delta.content?;
    if content.is_empty() {
        None
    } else {
        Some(SseEvent::Delta(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_line(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": content } }] })
        )
    }

    #[test]
    fn test_decodes_deltas_and_done() {
        let mut decoder = SseDecoder::new();
        let body = format!("{}{}data: [DONE]\n\n", delta_line("Lists "), delta_line("are "));

        let events = decoder.push(body.as_bytes());
        assert_eq!(
            events,
            vec![
                SseEvent::Delta("Lists ".into()),
                SseEvent::Delta("are ".into()),
                SseEvent::Done,
            ]
        );
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let body = delta_line("ordered.");
        let (a, b) = body.as_bytes().split_at(10);

        assert!(decoder.push(a).is_empty());
        assert_eq!(decoder.push(b), vec![SseEvent::Delta("ordered.".into())]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let body = delta_line("héllo");
        let split = body.find('é').unwrap() + 1;
        let (a, b) = body.as_bytes().split_at(split);

        assert!(decoder.push(a).is_empty());
        assert_eq!(decoder.push(b), vec![SseEvent::Delta("héllo".into())]);
    }

    #[test]
    fn test_role_only_and_empty_deltas_are_skipped() {
        let mut decoder = SseDecoder::new();
        let role = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n";
        let finish = "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n";
        let empty = delta_line("");

        let body = format!("{role}{finish}{empty}: keep-alive\n\nevent: ping\n");
        assert!(decoder.push(body.as_bytes()).is_empty());
    }

    #[test]
    fn test_error_payload() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"error\":{\"message\":\"overloaded\"}}\n");
        assert_eq!(events, vec![SseEvent::Error("overloaded".into())]);
    }

    #[test]
    fn test_malformed_chunk_is_an_error() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {not json\n");
        assert!(matches!(&events[..], [SseEvent::Error(msg)] if msg.starts_with("Malformed")));
    }

    #[test]
    fn test_crlf_and_unterminated_tail() {
        let mut decoder = SseDecoder::new();
        assert_eq!(
            decoder.push(b"data: [DONE]\r\n"),
            vec![SseEvent::Done]
        );

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), vec![SseEvent::Done]);
        assert!(decoder.finish().is_empty());
    }
}
