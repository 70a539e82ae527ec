use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One `data: ...` line (or multi-line concatenation) decoded into
    /// a raw text payload — translators further decode it as JSON when
    /// the shape calls for it.
    Data(String),
    /// A provider-specific terminal sentinel (`data: [DONE]` for
    /// OpenAI-like providers, or a `message_stop` event for
    /// Anthropic-like ones).
    Terminal,
    /// A non-data SSE field (`event:`, `id:`, `retry:`) forwarded as-is.
    Comment(String),
}

/// Accumulated usage captured from a terminal event, when the provider
/// reports token counts inline in the stream rather than only in a
/// final non-streamed response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedUsage {
    pub total_tokens: Option<u64>,
}

/// One upstream "shape": how to recognize a terminal marker and how to
/// pull a running token usage total out of data frames as they arrive.
pub trait ProviderParser {
    fn is_terminal(&self, data: &str) -> bool;
    fn extract_usage(&self, data: &str) -> Option<u64>;
}

pub struct OpenAiLike;

impl ProviderParser for OpenAiLike {
    fn is_terminal(&self, data: &str) -> bool {
        data.trim() == "[DONE]"
    }

    fn extract_usage(&self, data: &str) -> Option<u64> {
        let v: Value = serde_json::from_str(data).ok()?;
        v.get("usage")?.get("total_tokens")?.as_u64()
    }
}

pub struct AnthropicLike;

impl ProviderParser for AnthropicLike {
    fn is_terminal(&self, data: &str) -> bool {
        serde_json::from_str::<Value>(data)
            .ok()
            .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|s| s == "message_stop"))
            .unwrap_or(false)
    }

    fn extract_usage(&self, data: &str) -> Option<u64> {
        let v: Value = serde_json::from_str(data).ok()?;
        let input = v.pointer("/message/usage/input_tokens")?.as_u64()?;
        let output = v.pointer("/usage/output_tokens").and_then(|x| x.as_u64()).unwrap_or(0);
        Some(input + output)
    }
}

pub fn parser_for(shape: &str) -> Box<dyn ProviderParser> {
    match shape {
        "anthropic_like" => Box::new(AnthropicLike),
        _ => Box::new(OpenAiLike),
    }
}

/// Parse one logical SSE frame: a run of lines up to (and consuming) the
/// blank-line terminator. Returns the accumulated event and the unused
/// remainder of the buffer.
pub fn parse_frame<'a>(buf: &'a str) -> Option<(StreamEvent, &'a str)> {
    let end = buf.find("\n\n").or_else(|| buf.find("\r\n\r\n"))?;
    let sep_len = if buf[end..].starts_with("\r\n\r\n") { 4 } else { 2 };
    let frame = &buf[..end];
    let rest = &buf[end + sep_len..];

    let mut data_lines = Vec::new();
    let mut other_lines = Vec::new();
    for line in frame.lines() {
        if let Some(d) = line.strip_prefix("data:") {
            data_lines.push(d.trim_start());
        } else if !line.is_empty() {
            other_lines.push(line);
        }
    }

    if data_lines.is_empty() {
        return Some((StreamEvent::Comment(other_lines.join("\n")), rest));
    }

    let data = data_lines.join("\n");
    Some((StreamEvent::Data(data), rest))
}

/// A streaming translator that reads line-oriented SSE frames off a
/// growing buffer, forwarding `StreamEvent`s and tracking idle time.
/// The "reset on every line" idle timer is reconstructed as a per-read
/// `monoio::time::timeout` — monoio has no resettable timer primitive,
/// so re-issuing a fresh deadline on each read is the idiomatic
/// equivalent.
pub struct SseTranslator {
    parser: Box<dyn ProviderParser>,
    idle_timeout: Duration,
    buf: String,
    captured_usage: CapturedUsage,
}

impl SseTranslator {
    pub fn new(shape: &str, idle_timeout: Duration) -> Self {
        Self { parser: parser_for(shape), idle_timeout, buf: String::new(), captured_usage: CapturedUsage::default() }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn captured_usage(&self) -> &CapturedUsage {
        &self.captured_usage
    }

    /// Feed newly read bytes in, draining every complete frame found.
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.buf.push_str(chunk);
        let mut events = Vec::new();
        loop {
            let owned = self.buf.clone();
            match parse_frame(&owned) {
                Some((event, rest)) => {
                    if let StreamEvent::Data(ref data) = event {
                        if self.parser.is_terminal(data) {
                            self.buf = rest.to_string();
                            events.push(StreamEvent::Terminal);
                            continue;
                        }
                        if let Some(tokens) = self.parser.extract_usage(data) {
                            self.captured_usage.total_tokens = Some(tokens);
                        }
                    }
                    self.buf = rest.to_string();
                    events.push(event);
                }
                None => break,
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_data_frame() {
        let mut t = SseTranslator::new("openai_like", Duration::from_secs(30));
        let events = t.feed("data: {\"choices\":[]}\n\n");
        assert_eq!(events, vec![StreamEvent::Data("{\"choices\":[]}".to_string())]);
    }

    #[test]
    fn recognizes_openai_done_sentinel() {
        let mut t = SseTranslator::new("openai_like", Duration::from_secs(30));
        let events = t.feed("data: [DONE]\n\n");
        assert_eq!(events, vec![StreamEvent::Terminal]);
    }

    #[test]
    fn recognizes_anthropic_message_stop() {
        let mut t = SseTranslator::new("anthropic_like", Duration::from_secs(30));
        let events = t.feed("data: {\"type\":\"message_stop\"}\n\n");
        assert_eq!(events, vec![StreamEvent::Terminal]);
    }

    #[test]
    fn captures_usage_from_data_frame() {
        let mut t = SseTranslator::new("openai_like", Duration::from_secs(30));
        t.feed("data: {\"usage\":{\"total_tokens\":42}}\n\n");
        assert_eq!(t.captured_usage().total_tokens, Some(42));
    }

    #[test]
    fn partial_frame_waits_for_more_data() {
        let mut t = SseTranslator::new("openai_like", Duration::from_secs(30));
        let events = t.feed("data: {\"partial\":");
        assert!(events.is_empty());
        let events = t.feed("true}\n\n");
        assert_eq!(events, vec![StreamEvent::Data("{\"partial\":true}".to_string())]);
    }

    #[test]
    fn multiple_frames_in_one_feed_are_all_returned() {
        let mut t = SseTranslator::new("openai_like", Duration::from_secs(30));
        let events = t.feed("data: a\n\ndata: b\n\ndata: [DONE]\n\n");
        assert_eq!(events, vec![
            StreamEvent::Data("a".to_string()),
            StreamEvent::Data("b".to_string()),
            StreamEvent::Terminal,
        ]);
    }

    #[test]
    fn comment_only_frame_is_forwarded() {
        let mut t = SseTranslator::new("openai_like", Duration::from_secs(30));
        let events = t.feed("event: ping\n\n");
        assert_eq!(events, vec![StreamEvent::Comment("event: ping".to_string())]);
    }
}
