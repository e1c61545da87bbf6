use crate::config::UsageDefaults;
use crate::protocol::openai_chat::OpenAiUsage;
use crate::stream::sse::extract_json_data_payload;

use super::{UpstreamEvent, UpstreamUsage, WorkflowFinishedEvent};

/// Decode one upstream line into an event.
///
/// Lines without a `data:` marker, non-object payloads (`[DONE]`-style
/// sentinels) and undecodable JSON all yield `None`; the last case is logged.
#[must_use]
pub fn parse_event_line(line: &str) -> Option<UpstreamEvent> {
    let payload = extract_json_data_payload(line)?;
    match serde_json::from_str::<UpstreamEvent>(payload) {
        Ok(event) => Some(event),
        Err(err) => {
            let payload_len = payload.len();
            tracing::warn!(error = %err, payload_len, "skipping malformed upstream frame");
            None
        }
    }
}

/// What a single upstream event means for the downstream response.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    ContentDelta(ContentDelta),
    EndOfStream(EndOfStream),
    Fatal(UpstreamFailure),
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaSource {
    /// `message` / `agent_message`: chat answers.
    Answer,
    /// `text_chunk`: workflow text output.
    TextChunk,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentDelta {
    pub text: String,
    pub source: DeltaSource,
    pub created_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EndSource {
    MessageEnd,
    /// Carries the aggregate workflow output that replaces any accumulated text.
    WorkflowFinished { replacement: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndOfStream {
    pub source: EndSource,
    pub usage: UpstreamUsage,
    pub created_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamFailure {
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl UpstreamUsage {
    /// Fill counters the upstream left out (or reported as zero).
    #[must_use]
    pub fn resolve(&self, defaults: &UsageDefaults) -> OpenAiUsage {
        let pick = |value: Option<u64>, default: u64| value.filter(|v| *v > 0).unwrap_or(default);
        OpenAiUsage {
            prompt_tokens: pick(self.prompt_tokens, defaults.prompt_tokens),
            completion_tokens: pick(self.completion_tokens, defaults.completion_tokens),
            total_tokens: pick(self.total_tokens, defaults.total_tokens),
        }
    }
}

/// Maps decoded upstream events onto [`Outcome`]s.
#[derive(Debug, Clone, Default)]
pub struct EventClassifier {
    output_variable: Option<String>,
}

impl EventClassifier {
    #[must_use]
    pub fn new(output_variable: Option<String>) -> Self {
        Self { output_variable }
    }

    #[must_use]
    pub fn classify(&self, event: UpstreamEvent) -> Outcome {
        match event {
            UpstreamEvent::Message(msg) | UpstreamEvent::AgentMessage(msg) => {
                Outcome::ContentDelta(ContentDelta {
                    text: msg.answer,
                    source: DeltaSource::Answer,
                    created_at: msg.created_at,
                })
            }
            UpstreamEvent::TextChunk(chunk) => Outcome::ContentDelta(ContentDelta {
                text: chunk.data.text,
                source: DeltaSource::TextChunk,
                created_at: chunk.created_at,
            }),
            UpstreamEvent::WorkflowFinished(finished) => self.classify_workflow_finished(finished),
            UpstreamEvent::MessageEnd(end) => Outcome::EndOfStream(EndOfStream {
                source: EndSource::MessageEnd,
                usage: end
                    .metadata
                    .and_then(|metadata| metadata.usage)
                    .unwrap_or_default(),
                created_at: end.created_at,
            }),
            UpstreamEvent::Error(err) => {
                let code = err.code.map(|code| match code {
                    serde_json::Value::String(code) => code,
                    other => other.to_string(),
                });
                tracing::error!(
                    status = ?err.status,
                    code = code.as_deref().unwrap_or("-"),
                    message = %err.message,
                    "upstream reported an error event"
                );
                Outcome::Fatal(UpstreamFailure {
                    status: err.status,
                    code,
                    message: err.message,
                })
            }
            UpstreamEvent::Other => Outcome::Ignored,
        }
    }

    fn classify_workflow_finished(&self, finished: WorkflowFinishedEvent) -> Outcome {
        let replacement = self.extract_output(finished.data.outputs.as_ref());
        let reported = finished
            .metadata
            .and_then(|metadata| metadata.usage)
            .unwrap_or_default();
        // Workflow runs report their total on `data`, not in the usage block.
        let usage = UpstreamUsage {
            prompt_tokens: reported.prompt_tokens,
            completion_tokens: reported.completion_tokens,
            total_tokens: finished.data.total_tokens,
        };
        Outcome::EndOfStream(EndOfStream {
            source: EndSource::WorkflowFinished { replacement },
            usage,
            created_at: finished.created_at,
        })
    }

    fn extract_output(&self, outputs: Option<&serde_json::Value>) -> String {
        let selected = match (self.output_variable.as_deref(), outputs) {
            (Some(name), Some(outputs)) => {
                let value = outputs.get(name);
                if value.is_none() {
                    tracing::warn!(
                        output_variable = name,
                        "workflow outputs lack the configured variable"
                    );
                }
                value
            }
            (None, outputs) => outputs,
            (Some(_), None) => None,
        };
        match selected {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        }
    }
}
