use std::convert::Infallible;
use std::time::Instant;

use axum::response::Response;
use bytes::Bytes;
use futures_util::StreamExt;
use smallvec::SmallVec;

use crate::observability::log_request_complete;
use crate::protocol::dify::event::Outcome;
use crate::stream::{EventDecoder, StreamSynthesizer};

use super::io::{LeasedBody, UpstreamIoRequest};

#[inline]
fn sse_response(status: http::StatusCode, body: axum::body::Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

/// Frames produced but not yet handed to the response body.
struct PendingBytes {
    chunks: SmallVec<[Bytes; 8]>,
    head: usize,
}

impl PendingBytes {
    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        let mut chunks = SmallVec::new();
        chunks.reserve(capacity);
        Self { chunks, head: 0 }
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.head >= self.chunks.len()
    }

    #[inline]
    fn pop_front(&mut self) -> Option<Bytes> {
        if self.is_empty() {
            return None;
        }
        let chunk = std::mem::take(&mut self.chunks[self.head]);
        self.head += 1;
        if self.head == self.chunks.len() {
            self.chunks.clear();
            self.head = 0;
        }
        Some(chunk)
    }

    #[inline]
    fn extend_from_bytes(&mut self, frames: &mut Vec<Bytes>) {
        if frames.is_empty() {
            return;
        }
        self.chunks.reserve(frames.len());
        self.chunks.extend(frames.drain(..));
    }
}

/// Single owner of one streaming request: upstream body, decoder,
/// synthesizer and the frames waiting to be written.
///
/// Upstream chunks are only pulled when the pending queue is empty, so
/// nothing is buffered beyond the frames one chunk produces. Dropping the
/// driver (client disconnect) drops the upstream lease with it.
struct StreamDriver {
    body: Option<LeasedBody>,
    decoder: EventDecoder,
    synthesizer: StreamSynthesizer,
    outcomes: Vec<Outcome>,
    frames: Vec<Bytes>,
    pending: PendingBytes,
    request_id: String,
    model: String,
    start: Instant,
}

impl StreamDriver {
    /// Ensure at least one frame is pending; `false` once the stream is over.
    async fn fill(&mut self) -> bool {
        loop {
            if !self.pending.is_empty() {
                return true;
            }
            let Some(body) = self.body.as_mut() else {
                return false;
            };
            match body.next().await {
                Some(Ok(chunk)) => {
                    self.decoder.feed_into(&chunk, &mut self.outcomes);
                    for outcome in self.outcomes.drain(..) {
                        self.synthesizer.push_outcome(outcome, &mut self.frames);
                    }
                }
                Some(Err(err)) => {
                    self.synthesizer
                        .push_transport_error(&err.to_string(), &mut self.frames);
                }
                None => {
                    self.decoder.finish_into(&mut self.outcomes);
                    for outcome in self.outcomes.drain(..) {
                        self.synthesizer.push_outcome(outcome, &mut self.frames);
                    }
                    self.synthesizer.finish(&mut self.frames);
                }
            }
            self.pending.extend_from_bytes(&mut self.frames);
            if self.synthesizer.is_terminated() {
                self.release();
            }
        }
    }

    fn release(&mut self) {
        if self.body.take().is_none() {
            return;
        }
        if let Some(usage) = self.synthesizer.final_usage() {
            log_request_complete(&self.request_id, &self.model, &usage, self.start);
        }
    }
}

/// Respond with the transcoded `chat.completion.chunk` stream.
///
/// The upstream is read up to the first output frame before the response
/// head is built, so a stream that fails before producing anything is
/// reported with status 500.
pub(crate) async fn handle_streaming_request(
    ctx: UpstreamIoRequest<'_>,
    body: LeasedBody,
    decoder: EventDecoder,
    synthesizer: StreamSynthesizer,
) -> Response {
    let mut driver = StreamDriver {
        body: Some(body),
        decoder,
        synthesizer,
        outcomes: Vec::with_capacity(8),
        frames: Vec::with_capacity(8),
        pending: PendingBytes::with_capacity(8),
        request_id: ctx.request_id.to_owned(),
        model: ctx.client_model.to_owned(),
        start: ctx.start,
    };

    driver.fill().await;
    let status = if driver.synthesizer.failed_before_output() {
        http::StatusCode::INTERNAL_SERVER_ERROR
    } else {
        http::StatusCode::OK
    };

    let output = futures_util::stream::unfold(driver, |mut driver| async move {
        if driver.fill().await {
            let frame = driver.pending.pop_front()?;
            Some((Ok::<Bytes, Infallible>(frame), driver))
        } else {
            None
        }
    });

    sse_response(status, axum::body::Body::from_stream(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_bytes_preserves_order() {
        let mut pending = PendingBytes::with_capacity(2);
        assert!(pending.is_empty());
        let mut frames = vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")];
        pending.extend_from_bytes(&mut frames);
        assert!(frames.is_empty());
        assert_eq!(pending.pop_front().as_deref(), Some(&b"a"[..]));
        let mut more = vec![Bytes::from_static(b"c")];
        pending.extend_from_bytes(&mut more);
        assert_eq!(pending.pop_front().as_deref(), Some(&b"b"[..]));
        assert_eq!(pending.pop_front().as_deref(), Some(&b"c"[..]));
        assert!(pending.pop_front().is_none());
    }

    #[test]
    fn test_sse_response_headers() {
        let response = sse_response(http::StatusCode::OK, axum::body::Body::empty());
        assert_eq!(response.headers()[http::header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[http::header::CACHE_CONTROL], "no-cache");
        assert_eq!(response.headers()[http::header::CONNECTION], "keep-alive");
    }
}
