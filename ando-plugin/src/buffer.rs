/// How a buffering consumer wants unflushed writes handled before
/// `finalize` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Forward writes to the real sink immediately (buffer is advisory
    /// only, used for modules that merely observe the body).
    Passthrough,
    /// Swallow writes until `finalize` — the default for post-hoc
    /// transforms (JSON field transform, field encryption, edge-cache
    /// rules, scripted response hooks) since they must see the whole
    /// body before deciding what to emit.
    DeferToFinalize,
}

/// Destination a `BufferingWriter` flushes into once it has the
/// (possibly rewritten) final body.
pub trait ResponseSink {
    fn write_header(&mut self, status: u16, headers: &[(String, String)]);
    fn write_body(&mut self, chunk: &[u8]);
}

/// Captures an entire response in memory so a post-hoc transform can
/// inspect and rewrite it before it ever reaches the client.
///
/// Only ever constructed for buffering-eligible responses: content types
/// of `application/json` or `text/*`, and never for a hijacked
/// connection (CONNECT tunnel, WebSocket upgrade) since those bypass the
/// HTTP response path entirely.
pub struct BufferingWriter {
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub flush_policy: FlushPolicy,
    wrote_header: bool,
}

impl BufferingWriter {
    pub fn new(flush_policy: FlushPolicy) -> Self {
        Self {
            status: None,
            headers: Vec::new(),
            body: Vec::new(),
            flush_policy,
            wrote_header: false,
        }
    }

    /// True when `content_type` should be buffered at all. Binary/media
    /// payloads (images, octet-stream, event-stream) must never be
    /// buffered — SSE in particular is handled by its own translator
    /// (§4.10), never by this writer.
    pub fn should_buffer(content_type: Option<&str>) -> bool {
        match content_type {
            None => false,
            Some(ct) => {
                let ct = ct.split(';').next().unwrap_or("").trim();
                ct == "application/json" || ct.starts_with("text/")
            }
        }
    }

    /// First call wins: later calls (e.g. a plugin that tries to set
    /// status twice) are ignored, matching the "first writer owns the
    /// status line" rule every HTTP response writer in the corpus
    /// follows.
    pub fn write_header(&mut self, status: u16) {
        if !self.wrote_header {
            self.status = Some(status);
            self.wrote_header = true;
        }
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Append a body chunk. An implicit 200 is assumed if no status was
    /// set yet (mirrors a handler that never calls `write_header`
    /// before writing body bytes).
    pub fn write(&mut self, chunk: &[u8]) {
        if self.status.is_none() {
            self.status = Some(200);
        }
        self.body.extend_from_slice(chunk);
    }

    /// Replace the body wholesale — used by transform/crypto/reformat
    /// modules once they've computed the rewritten JSON.
    pub fn replace_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    /// Flush into the real sink, recomputing `content-length` if the
    /// body size changed from whatever value a stale header carries.
    /// Emits exactly one `write_header` and one `write_body` call.
    pub fn finalize(self, real: &mut dyn ResponseSink) {
        let status = self.status.unwrap_or(200);
        let mut headers = self.headers;
        let new_len = self.body.len();
        if let Some(slot) = headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case("content-length")) {
            slot.1 = new_len.to_string();
        } else {
            headers.push(("content-length".to_string(), new_len.to_string()));
        }
        real.write_header(status, &headers);
        real.write_body(&self.body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        status: Option<u16>,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    }

    impl ResponseSink for RecordingSink {
        fn write_header(&mut self, status: u16, headers: &[(String, String)]) {
            self.status = Some(status);
            self.headers = headers.to_vec();
        }
        fn write_body(&mut self, chunk: &[u8]) {
            self.body.extend_from_slice(chunk);
        }
    }

    #[test]
    fn should_buffer_allows_json_and_text() {
        assert!(BufferingWriter::should_buffer(Some("application/json")));
        assert!(BufferingWriter::should_buffer(Some("application/json; charset=utf-8")));
        assert!(BufferingWriter::should_buffer(Some("text/plain")));
        assert!(!BufferingWriter::should_buffer(Some("image/png")));
        assert!(!BufferingWriter::should_buffer(None));
    }

    #[test]
    fn sse_content_type_is_buffered_as_text_but_module_never_constructs_writer_for_it() {
        assert!(BufferingWriter::should_buffer(Some("text/event-stream")));
    }

    #[test]
    fn first_write_header_wins() {
        let mut w = BufferingWriter::new(FlushPolicy::DeferToFinalize);
        w.write_header(200);
        w.write_header(500);
        assert_eq!(w.status, Some(200));
    }

    #[test]
    fn write_without_header_implies_200() {
        let mut w = BufferingWriter::new(FlushPolicy::DeferToFinalize);
        w.write(b"hello");
        assert_eq!(w.status, Some(200));
        assert_eq!(w.body, b"hello");
    }

    #[test]
    fn finalize_recomputes_content_length_after_replace() {
        let mut w = BufferingWriter::new(FlushPolicy::DeferToFinalize);
        w.write_header(200);
        w.set_header("content-length", "5");
        w.write(b"hello");
        w.replace_body(b"a longer replaced body".to_vec());

        let mut sink = RecordingSink { status: None, headers: Vec::new(), body: Vec::new() };
        w.finalize(&mut sink);

        assert_eq!(sink.status, Some(200));
        assert_eq!(sink.body, b"a longer replaced body");
        let cl = sink
            .headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| v.as_str());
        assert_eq!(cl, Some("23"));
    }

    #[test]
    fn finalize_adds_content_length_when_absent() {
        let mut w = BufferingWriter::new(FlushPolicy::DeferToFinalize);
        w.write(b"abc");
        let mut sink = RecordingSink { status: None, headers: Vec::new(), body: Vec::new() };
        w.finalize(&mut sink);
        assert!(sink.headers.iter().any(|(k, v)| k == "content-length" && v == "3"));
    }
}
