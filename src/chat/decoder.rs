//! Incremental decoder for chunked chat replies.
//!
//! A reply body is a sequence of `\n`-terminated lines, each of which may be
//! an SSE `data:` field, a bare JSON object or plain text. The transport is
//! free to split a line, a JSON token or a UTF-8 codepoint across reads, so
//! the decoder keeps both a text buffer and the tail of any incomplete
//! multi-byte sequence between calls to [`StreamDecoder::feed`].

use serde_json::Value;

/// Payload that ends a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// What a single complete line resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Blank line, SSE comment/keepalive, or JSON without any text
    Skip,
    /// The `[DONE]` sentinel
    Done,
    /// Text to append to the target message
    Delta(String),
}

/// Line-buffering decoder for one streaming call.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Decoded text that does not yet form a complete line
    buffer: String,
    /// Leading bytes of a UTF-8 sequence that was cut by the chunk boundary
    utf8_tail: Vec<u8>,
    done: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes into the decoder and resolve every complete line.
    ///
    /// Returns the deltas in arrival order. Anything after the last newline
    /// stays buffered for the next call. Once the `[DONE]` sentinel has been
    /// seen, the rest of the chunk and all later chunks are ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.done {
            return deltas;
        }

        self.decode_utf8(chunk);

        let mut consumed = 0;
        while let Some(offset) = self.buffer[consumed..].find('\n') {
            let end = consumed + offset;
            let outcome = resolve_line(&self.buffer[consumed..end]);
            consumed = end + 1;

            match outcome {
                LineOutcome::Skip => {}
                LineOutcome::Delta(text) => deltas.push(text),
                LineOutcome::Done => {
                    log::debug!("chat stream ended by {DONE_SENTINEL} sentinel");
                    self.mark_done();
                    return deltas;
                }
            }
        }
        self.buffer.drain(..consumed);

        deltas
    }

    /// Resolve whatever is left once the byte source is exhausted.
    ///
    /// A final line without a trailing newline is still a line. Calling this
    /// more than once, or after the sentinel, yields nothing.
    pub fn finish(&mut self) -> Vec<String> {
        if self.done {
            return Vec::new();
        }

        if !self.utf8_tail.is_empty() {
            let tail = std::mem::take(&mut self.utf8_tail);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }
        let rest = std::mem::take(&mut self.buffer);
        self.done = true;

        match resolve_line(&rest) {
            LineOutcome::Delta(text) => vec![text],
            LineOutcome::Skip | LineOutcome::Done => Vec::new(),
        }
    }

    /// Whether the sentinel was seen or [`finish`](Self::finish) ran.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Text waiting for its terminating newline.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Number of bytes held back as an incomplete UTF-8 sequence.
    pub fn pending_utf8_len(&self) -> usize {
        self.utf8_tail.len()
    }

    fn mark_done(&mut self) {
        self.done = true;
        self.buffer.clear();
        self.utf8_tail.clear();
    }

    fn decode_utf8(&mut self, chunk: &[u8]) {
        let joined;
        let mut bytes: &[u8] = if self.utf8_tail.is_empty() {
            chunk
        } else {
            let mut tail = std::mem::take(&mut self.utf8_tail);
            tail.extend_from_slice(chunk);
            joined = tail;
            &joined
        };

        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(err) => {
                    let (valid, rest) = bytes.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.buffer.push_str(text);
                    }

                    match err.error_len() {
                        // Incomplete sequence at the end: wait for the next chunk.
                        None => {
                            self.utf8_tail = rest.to_vec();
                            return;
                        }
                        Some(len) => {
                            log::trace!("replacing {len} invalid UTF-8 byte(s) in chat stream");
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            bytes = &rest[len..];
                        }
                    }
                }
            }
        }
    }
}

/// Resolve one complete line (without its `\n`).
///
/// A payload that is not valid JSON is returned verbatim as literal text.
/// Lines are only resolved once they are complete, so a non-empty payload
/// that fails to parse is never treated as a JSON fragment to wait on.
pub fn resolve_line(line: &str) -> LineOutcome {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() || line.starts_with(':') {
        return LineOutcome::Skip;
    }

    let payload = line.strip_prefix("data:").unwrap_or(line).trim();
    if payload.is_empty() {
        return LineOutcome::Skip;
    }
    if payload == DONE_SENTINEL {
        return LineOutcome::Done;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => match extract_delta(&value) {
            Some(text) if !text.is_empty() => LineOutcome::Delta(text.to_string()),
            _ => {
                log::trace!("no text in chat stream payload: {payload}");
                LineOutcome::Skip
            }
        },
        Err(_) => LineOutcome::Delta(payload.to_string()),
    }
}

/// Pull the text delta out of a parsed payload.
///
/// Checked in order: `choices[0].delta.content`, `delta`, `content`. The
/// first field present as a string wins, even when it is empty.
pub fn extract_delta(value: &Value) -> Option<&str> {
    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .or_else(|| value.get("delta").and_then(Value::as_str))
        .or_else(|| value.get("content").and_then(Value::as_str))
}
