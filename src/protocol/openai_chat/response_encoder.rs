use super::{
    OpenAiChatResponse, OpenAiChoice, OpenAiDelta, OpenAiResponseMessage, OpenAiStreamChoice,
    OpenAiStreamChunk, OpenAiUsage,
};

const CHAT_COMPLETION_OBJECT: &str = "chat.completion";
const CHAT_COMPLETION_CHUNK_OBJECT: &str = "chat.completion.chunk";
const FINISH_REASON_STOP: &str = "stop";

/// Chunk carrying one incremental piece of assistant text.
#[must_use]
pub fn encode_content_chunk(
    id: String,
    created: u64,
    model: &str,
    text: String,
) -> OpenAiStreamChunk {
    OpenAiStreamChunk {
        id,
        object: CHAT_COMPLETION_CHUNK_OBJECT.to_string(),
        created,
        model: model.to_string(),
        choices: vec![OpenAiStreamChoice {
            index: 0,
            delta: OpenAiDelta {
                content: Some(text),
            },
            finish_reason: None,
        }],
        usage: None,
    }
}

/// Closing chunk: empty delta, `finish_reason: "stop"`.
#[must_use]
pub fn encode_stop_chunk(
    id: String,
    created: u64,
    model: &str,
    usage: Option<OpenAiUsage>,
) -> OpenAiStreamChunk {
    OpenAiStreamChunk {
        id,
        object: CHAT_COMPLETION_CHUNK_OBJECT.to_string(),
        created,
        model: model.to_string(),
        choices: vec![OpenAiStreamChoice {
            index: 0,
            delta: OpenAiDelta::default(),
            finish_reason: Some(FINISH_REASON_STOP.to_string()),
        }],
        usage,
    }
}

/// Buffered `chat.completion` document.
#[must_use]
pub fn encode_chat_completion(
    id: String,
    created: u64,
    model: &str,
    content: String,
    usage: OpenAiUsage,
    system_fingerprint: &str,
) -> OpenAiChatResponse {
    OpenAiChatResponse {
        id,
        object: CHAT_COMPLETION_OBJECT.to_string(),
        created,
        model: model.to_string(),
        choices: vec![OpenAiChoice {
            index: 0,
            message: OpenAiResponseMessage {
                role: "assistant".to_string(),
                content,
            },
            logprobs: None,
            finish_reason: FINISH_REASON_STOP.to_string(),
        }],
        usage,
        system_fingerprint: system_fingerprint.to_string(),
    }
}
