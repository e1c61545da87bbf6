use std::sync::Arc;

use bytes::Bytes;

use crate::config::UsageDefaults;
use crate::protocol::dify::event::{ContentDelta, EndOfStream, Outcome};
use crate::protocol::error_shapes::error_payload;
use crate::protocol::openai_chat::response_encoder::{encode_content_chunk, encode_stop_chunk};
use crate::protocol::openai_chat::{OpenAiStreamChunk, OpenAiUsage};
use crate::state::IdSource;
use crate::stream::sse::{done_frame, openai_sse_frame};
use crate::stream::StreamPhase;

/// Turns classified upstream outcomes into `chat.completion.chunk` SSE frames.
///
/// Leading whitespace is stripped from the first non-empty delta only, even
/// when nothing is left of it. The terminal sequence (stop chunk or error frame, then
/// `[DONE]`) is written at most once; after that every input is dropped.
pub struct StreamSynthesizer {
    model: String,
    ids: Arc<dyn IdSource>,
    usage_defaults: UsageDefaults,
    include_usage: bool,
    phase: StreamPhase,
    first_delta_trimmed: bool,
    frames_emitted: usize,
    failed_before_output: bool,
    final_usage: Option<OpenAiUsage>,
}

impl StreamSynthesizer {
    #[must_use]
    pub fn new(
        model: String,
        ids: Arc<dyn IdSource>,
        usage_defaults: UsageDefaults,
        include_usage: bool,
    ) -> Self {
        Self {
            model,
            ids,
            usage_defaults,
            include_usage,
            phase: StreamPhase::Open,
            first_delta_trimmed: false,
            frames_emitted: 0,
            failed_before_output: false,
            final_usage: None,
        }
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.phase.is_terminated()
    }

    /// The stream failed before any frame reached the client, so the HTTP
    /// status can still report the error.
    #[must_use]
    pub fn failed_before_output(&self) -> bool {
        self.failed_before_output
    }

    /// Usage captured from the terminal event, if the stream ended normally.
    #[must_use]
    pub fn final_usage(&self) -> Option<OpenAiUsage> {
        self.final_usage
    }

    pub fn push_outcome(&mut self, outcome: Outcome, out: &mut Vec<Bytes>) {
        if self.phase.is_terminated() {
            return;
        }
        match outcome {
            Outcome::ContentDelta(delta) => self.push_delta(delta, out),
            Outcome::EndOfStream(end) => self.push_stop(end, out),
            Outcome::Fatal(failure) => self.push_failure(&failure.message, out),
            Outcome::Ignored => {}
        }
    }

    /// The upstream body failed mid-read; handled like an upstream `error` event.
    pub fn push_transport_error(&mut self, message: &str, out: &mut Vec<Bytes>) {
        if self.phase.is_terminated() {
            return;
        }
        tracing::warn!(error = message, "upstream body failed mid-stream");
        self.push_failure(message, out);
    }

    /// The upstream body ended. Without a terminal event this only closes
    /// the stream with `[DONE]`.
    pub fn finish(&mut self, out: &mut Vec<Bytes>) {
        if !self.phase.terminate() {
            return;
        }
        tracing::warn!(model = %self.model, "upstream stream ended without a terminal event");
        self.emit(Bytes::from(done_frame()), out);
    }

    fn push_delta(&mut self, delta: ContentDelta, out: &mut Vec<Bytes>) {
        let text = if self.first_delta_trimmed || delta.text.is_empty() {
            delta.text
        } else {
            self.first_delta_trimmed = true;
            let trimmed = delta.text.trim_start();
            if trimmed.len() == delta.text.len() {
                delta.text
            } else {
                trimmed.to_string()
            }
        };
        if text.is_empty() {
            return;
        }

        let created = self.created(delta.created_at);
        let chunk = encode_content_chunk(self.ids.chunk_id(), created, &self.model, text);
        self.emit_chunk(&chunk, out);
    }

    fn push_stop(&mut self, end: EndOfStream, out: &mut Vec<Bytes>) {
        if !self.phase.terminate() {
            return;
        }
        let usage = end.usage.resolve(&self.usage_defaults);
        self.final_usage = Some(usage);

        let created = self.created(end.created_at);
        let chunk = encode_stop_chunk(
            self.ids.chunk_id(),
            created,
            &self.model,
            self.include_usage.then_some(usage),
        );
        self.emit_chunk(&chunk, out);
        self.emit(Bytes::from(done_frame()), out);
    }

    fn push_failure(&mut self, message: &str, out: &mut Vec<Bytes>) {
        if !self.phase.terminate() {
            return;
        }
        self.failed_before_output = self.frames_emitted == 0;
        let payload = error_payload(message);
        self.emit(Bytes::from(openai_sse_frame(&payload.to_string())), out);
        self.emit(Bytes::from(done_frame()), out);
    }

    fn created(&self, created_at: Option<u64>) -> u64 {
        created_at.unwrap_or_else(|| self.ids.now_unix_secs())
    }

    fn emit_chunk(&mut self, chunk: &OpenAiStreamChunk, out: &mut Vec<Bytes>) {
        match serde_json::to_string(chunk) {
            Ok(json) => self.emit(Bytes::from(openai_sse_frame(&json)), out),
            Err(err) => tracing::error!(error = %err, "failed to encode stream chunk"),
        }
    }

    fn emit(&mut self, frame: Bytes, out: &mut Vec<Bytes>) {
        self.frames_emitted += 1;
        out.push(frame);
    }
}
