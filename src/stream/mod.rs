pub mod aggregator;
pub mod guard;
pub mod sse;
pub mod transcoder;

pub use aggregator::{AggregateResult, ResponseAggregator};
pub use guard::UpstreamLease;
pub use sse::LineReassembler;
pub use transcoder::StreamSynthesizer;

use crate::protocol::dify::event::{parse_event_line, EventClassifier, Outcome};

/// Lifecycle of a single request's upstream stream.
///
/// Every terminal emission goes through [`StreamPhase::terminate`], so a
/// second terminal trigger (a late `workflow_finished`, a transport error
/// racing an `error` event) is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    #[default]
    Open,
    Terminated,
}

impl StreamPhase {
    #[must_use]
    pub fn is_terminated(self) -> bool {
        self == Self::Terminated
    }

    /// Move to `Terminated`; returns `false` when already there.
    pub fn terminate(&mut self) -> bool {
        match self {
            Self::Open => {
                *self = Self::Terminated;
                true
            }
            Self::Terminated => false,
        }
    }
}

/// Raw upstream bytes in, classified [`Outcome`]s out.
///
/// Ignored events never reach the caller.
#[derive(Debug)]
pub struct EventDecoder {
    lines: LineReassembler,
    classifier: EventClassifier,
    scratch: Vec<String>,
}

impl EventDecoder {
    #[must_use]
    pub fn new(classifier: EventClassifier) -> Self {
        Self {
            lines: LineReassembler::new(),
            classifier,
            scratch: Vec::with_capacity(8),
        }
    }

    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<Outcome>) {
        self.lines.feed_into(chunk, &mut self.scratch);
        for line in self.scratch.drain(..) {
            push_line(&self.classifier, &line, out);
        }
    }

    /// Flush a trailing line the upstream never terminated.
    pub fn finish_into(&mut self, out: &mut Vec<Outcome>) {
        if let Some(line) = self.lines.finish() {
            push_line(&self.classifier, &line, out);
        }
    }
}

fn push_line(classifier: &EventClassifier, line: &str, out: &mut Vec<Outcome>) {
    let Some(event) = parse_event_line(line) else {
        return;
    };
    match classifier.classify(event) {
        Outcome::Ignored => {}
        outcome => out.push(outcome),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::dify::event::{ContentDelta, DeltaSource, EndSource};

    #[test]
    fn test_phase_terminates_once() {
        let mut phase = StreamPhase::default();
        assert!(!phase.is_terminated());
        assert!(phase.terminate());
        assert!(phase.is_terminated());
        assert!(!phase.terminate());
    }

    #[test]
    fn test_decoder_skips_malformed_and_ignored_lines() {
        let mut decoder = EventDecoder::new(EventClassifier::default());
        let mut out = Vec::new();
        decoder.feed_into(
            b"data: {\"event\":\"message\",\"answer\":\"a\"}\n\
              data: {not json}\n\
              data: {\"event\":\"ping\"}\n\
              data: {\"event\":\"message\",\"answer\":\"b\"}\n",
            &mut out,
        );
        let texts: Vec<&str> = out
            .iter()
            .map(|outcome| match outcome {
                Outcome::ContentDelta(ContentDelta { text, .. }) => text.as_str(),
                other => panic!("unexpected outcome: {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn test_decoder_flushes_unterminated_tail() {
        let mut decoder = EventDecoder::new(EventClassifier::default());
        let mut out = Vec::new();
        decoder.feed_into(
            concat!(
                "data: {\"event\":\"text_chunk\",\"data\":{\"text\":\"x\"}}\n",
                "data: {\"event\":\"message_",
            )
            .as_bytes(),
            &mut out,
        );
        assert_eq!(out.len(), 1);
        assert!(matches!(
            &out[0],
            Outcome::ContentDelta(ContentDelta {
                source: DeltaSource::TextChunk,
                ..
            })
        ));
        decoder.feed_into(b"end\"}", &mut out);
        assert_eq!(out.len(), 1);
        decoder.finish_into(&mut out);
        assert!(matches!(
            &out[1],
            Outcome::EndOfStream(end) if end.source == EndSource::MessageEnd
        ));
    }
}
