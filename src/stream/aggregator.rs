use crate::config::CompatConfig;
use crate::protocol::dify::event::{ContentDelta, DeltaSource, EndOfStream, EndSource, Outcome};
use crate::protocol::openai_chat::OpenAiUsage;
use crate::stream::StreamPhase;

/// Final state of a buffered request once the upstream body is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateResult {
    Completed { content: String, usage: OpenAiUsage },
    /// The upstream sent an `error` event (or the body failed mid-read).
    Failed,
    /// The upstream closed without any terminal event.
    Truncated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Completed(OpenAiUsage),
    Failed,
}

/// Folds classified outcomes into one aggregate answer.
///
/// Deltas are concatenated in arrival order. The first terminal outcome
/// wins; once it is recorded [`ResponseAggregator::is_terminated`] turns
/// true and further input is dropped.
#[derive(Debug)]
pub struct ResponseAggregator {
    compat: CompatConfig,
    phase: StreamPhase,
    content: String,
    message_supplied: bool,
    terminal: Option<Terminal>,
}

impl ResponseAggregator {
    #[must_use]
    pub fn new(compat: CompatConfig) -> Self {
        Self {
            compat,
            phase: StreamPhase::Open,
            content: String::new(),
            message_supplied: false,
            terminal: None,
        }
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.phase.is_terminated()
    }

    pub fn push_outcome(&mut self, outcome: Outcome) {
        if self.phase.is_terminated() {
            return;
        }
        match outcome {
            Outcome::ContentDelta(delta) => self.push_delta(delta),
            Outcome::EndOfStream(end) => self.push_end(end),
            Outcome::Fatal(_) => self.fail(),
            Outcome::Ignored => {}
        }
    }

    pub fn push_transport_error(&mut self, message: &str) {
        if self.phase.is_terminated() {
            return;
        }
        tracing::warn!(error = message, "upstream body failed while buffering");
        self.fail();
    }

    #[must_use]
    pub fn finish(self) -> AggregateResult {
        match self.terminal {
            Some(Terminal::Completed(usage)) => AggregateResult::Completed {
                content: self.content.trim().to_string(),
                usage,
            },
            Some(Terminal::Failed) => AggregateResult::Failed,
            None => {
                let buffered_len = self.content.len();
                tracing::warn!(buffered_len, "upstream stream ended without a terminal event");
                AggregateResult::Truncated
            }
        }
    }

    fn push_delta(&mut self, delta: ContentDelta) {
        if delta.source == DeltaSource::Answer {
            self.message_supplied = true;
        }
        self.content.push_str(&delta.text);
    }

    fn push_end(&mut self, end: EndOfStream) {
        if let EndSource::WorkflowFinished { replacement } = end.source {
            if self.message_supplied && self.compat.skip_workflow_finished_after_message {
                tracing::debug!("ignoring workflow_finished after message deltas");
                return;
            }
            self.content = replacement;
        }
        if self.phase.terminate() {
            let usage = end.usage.resolve(&self.compat.default_usage);
            self.terminal = Some(Terminal::Completed(usage));
        }
    }

    fn fail(&mut self) {
        if self.phase.terminate() {
            self.terminal = Some(Terminal::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::dify::event::UpstreamFailure;
    use crate::protocol::dify::UpstreamUsage;

    fn answer(text: &str) -> Outcome {
        Outcome::ContentDelta(ContentDelta {
            text: text.to_string(),
            source: DeltaSource::Answer,
            created_at: None,
        })
    }

    fn text_chunk(text: &str) -> Outcome {
        Outcome::ContentDelta(ContentDelta {
            text: text.to_string(),
            source: DeltaSource::TextChunk,
            created_at: None,
        })
    }

    fn message_end(usage: UpstreamUsage) -> Outcome {
        Outcome::EndOfStream(EndOfStream {
            source: EndSource::MessageEnd,
            usage,
            created_at: None,
        })
    }

    fn workflow_finished(replacement: &str, total: Option<u64>) -> Outcome {
        Outcome::EndOfStream(EndOfStream {
            source: EndSource::WorkflowFinished {
                replacement: replacement.to_string(),
            },
            usage: UpstreamUsage {
                total_tokens: total,
                ..UpstreamUsage::default()
            },
            created_at: None,
        })
    }

    fn failure() -> Outcome {
        Outcome::Fatal(UpstreamFailure {
            status: Some(500),
            code: None,
            message: "boom".to_string(),
        })
    }

    #[test]
    fn test_concatenates_and_trims_with_default_usage() {
        let mut agg = ResponseAggregator::new(CompatConfig::default());
        agg.push_outcome(answer(" Hel"));
        agg.push_outcome(answer("lo \n"));
        agg.push_outcome(message_end(UpstreamUsage {
            prompt_tokens: Some(9),
            ..UpstreamUsage::default()
        }));
        assert_eq!(
            agg.finish(),
            AggregateResult::Completed {
                content: "Hello".to_string(),
                usage: OpenAiUsage {
                    prompt_tokens: 9,
                    completion_tokens: 10,
                    total_tokens: 110,
                },
            }
        );
    }

    #[test]
    fn test_workflow_finished_replaces_text_chunks() {
        let mut agg = ResponseAggregator::new(CompatConfig::default());
        agg.push_outcome(text_chunk("draft"));
        agg.push_outcome(workflow_finished("final answer", Some(33)));
        let AggregateResult::Completed { content, usage } = agg.finish() else {
            panic!("expected completion");
        };
        assert_eq!(content, "final answer");
        assert_eq!(usage.total_tokens, 33);
        assert_eq!(usage.prompt_tokens, 100);
    }

    #[test]
    fn test_workflow_finished_skipped_after_message() {
        let mut agg = ResponseAggregator::new(CompatConfig::default());
        agg.push_outcome(answer("from messages"));
        agg.push_outcome(workflow_finished("aggregate", None));
        assert!(!agg.is_terminated());
        agg.push_outcome(message_end(UpstreamUsage::default()));
        let AggregateResult::Completed { content, .. } = agg.finish() else {
            panic!("expected completion");
        };
        assert_eq!(content, "from messages");
    }

    #[test]
    fn test_workflow_finished_replaces_when_suppression_disabled() {
        let compat = CompatConfig {
            skip_workflow_finished_after_message: false,
            ..CompatConfig::default()
        };
        let mut agg = ResponseAggregator::new(compat);
        agg.push_outcome(answer("from messages"));
        agg.push_outcome(workflow_finished("aggregate", None));
        let AggregateResult::Completed { content, .. } = agg.finish() else {
            panic!("expected completion");
        };
        assert_eq!(content, "aggregate");
    }

    #[test]
    fn test_first_terminal_wins() {
        let mut agg = ResponseAggregator::new(CompatConfig::default());
        agg.push_outcome(text_chunk("hi"));
        agg.push_outcome(message_end(UpstreamUsage::default()));
        assert!(agg.is_terminated());
        agg.push_outcome(workflow_finished("spurious", None));
        agg.push_outcome(failure());
        let AggregateResult::Completed { content, .. } = agg.finish() else {
            panic!("expected completion");
        };
        assert_eq!(content, "hi");
    }

    #[test]
    fn test_error_before_end_fails() {
        let mut agg = ResponseAggregator::new(CompatConfig::default());
        agg.push_outcome(answer("partial"));
        agg.push_outcome(failure());
        agg.push_outcome(message_end(UpstreamUsage::default()));
        assert_eq!(agg.finish(), AggregateResult::Failed);
    }

    #[test]
    fn test_transport_error_fails() {
        let mut agg = ResponseAggregator::new(CompatConfig::default());
        agg.push_outcome(answer("partial"));
        agg.push_transport_error("connection reset");
        assert_eq!(agg.finish(), AggregateResult::Failed);
    }

    #[test]
    fn test_missing_terminal_is_truncated() {
        let mut agg = ResponseAggregator::new(CompatConfig::default());
        agg.push_outcome(answer("partial"));
        assert_eq!(agg.finish(), AggregateResult::Truncated);
    }
}
