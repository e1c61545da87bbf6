/// Upstream line reassembly and downstream SSE frame encoding.
///
/// The upstream body arrives in arbitrary byte chunks; [`LineReassembler`]
/// turns those into complete `\n`-terminated lines, carrying any partial
/// tail into the next call. Splitting happens on raw bytes so a multi-byte
/// UTF-8 sequence cut by a chunk boundary is reassembled before decoding.
use bytes::BytesMut;
use memchr::memchr_iter;

const DATA_MARKER: &str = "data:";
const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Incremental byte-chunk to line splitter.
#[derive(Debug, Default)]
pub struct LineReassembler {
    carry: BytesMut,
}

impl LineReassembler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            carry: BytesMut::with_capacity(4096),
        }
    }

    /// Append `chunk` and return every line it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Append `chunk` and push completed lines into a caller-provided buffer.
    ///
    /// Line terminators (`\n`, with an optional preceding `\r`) are stripped.
    /// Invalid UTF-8 is replaced rather than rejected; such lines fail later
    /// at JSON decode time.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<String>) {
        if chunk.is_empty() {
            return;
        }
        let scan_from = self.carry.len();
        self.carry.extend_from_slice(chunk);

        let mut consumed = 0;
        for rel_pos in memchr_iter(b'\n', &self.carry[scan_from..]) {
            let line_end = scan_from + rel_pos;
            out.push(decode_line(&self.carry[consumed..line_end]));
            consumed = line_end + 1;
        }
        if consumed > 0 {
            let _ = self.carry.split_to(consumed);
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.carry.len()
    }

    /// Drain the unterminated tail once the upstream body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let tail = self.carry.split();
        Some(decode_line(&tail))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Payload of a `data:` line that looks like a JSON object.
///
/// Returns `None` for blank lines, comments, other SSE fields and
/// non-object payloads such as `[DONE]`.
#[must_use]
pub fn extract_json_data_payload(line: &str) -> Option<&str> {
    let payload = line.trim().strip_prefix(DATA_MARKER)?.trim_start();
    payload.starts_with('{').then_some(payload)
}

/// The `[DONE]` sentinel frame.
#[must_use]
pub fn done_frame() -> String {
    DONE_FRAME.to_owned()
}

/// Format an unnamed SSE frame: `data: {json}\n\n`.
#[must_use]
pub fn openai_sse_frame(json: &str) -> String {
    let mut out = String::with_capacity(10 + json.len());
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
    out
}
