pub mod event;
pub mod request;

use serde::{Deserialize, Serialize};

/// Upstream `response_mode`; the gateway always asks for a stream and
/// buffers locally when the caller did not.
pub const RESPONSE_MODE_STREAMING: &str = "streaming";

/// Body POSTed to `/chat-messages`, `/completion-messages` or `/workflows/run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DifyRequest {
    pub inputs: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub response_mode: String,
    pub conversation_id: String,
    pub user: String,
    pub auto_generate_name: bool,
}

/// One decoded `data:` payload of the upstream event stream.
///
/// Unknown `event` values (`ping`, `workflow_started`, `node_finished`, ...)
/// land in [`UpstreamEvent::Other`].
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UpstreamEvent {
    Message(AnswerEvent),
    AgentMessage(AnswerEvent),
    TextChunk(TextChunkEvent),
    WorkflowFinished(WorkflowFinishedEvent),
    MessageEnd(MessageEndEvent),
    Error(ErrorEvent),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerEvent {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub created_at: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextChunkEvent {
    #[serde(default)]
    pub data: TextChunkData,
    #[serde(default)]
    pub created_at: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextChunkData {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowFinishedEvent {
    #[serde(default)]
    pub data: WorkflowFinishedData,
    #[serde(default)]
    pub metadata: Option<EventMetadata>,
    #[serde(default)]
    pub created_at: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowFinishedData {
    #[serde(default)]
    pub outputs: Option<serde_json::Value>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEndEvent {
    #[serde(default)]
    pub metadata: Option<EventMetadata>,
    #[serde(default)]
    pub created_at: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventMetadata {
    #[serde(default)]
    pub usage: Option<UpstreamUsage>,
}

/// Token counters as reported by the upstream; any of them may be absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct UpstreamUsage {
    #[serde(default)]
    pub prompt_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub message: String,
}
