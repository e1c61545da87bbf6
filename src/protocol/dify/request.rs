use crate::config::{BotType, UpstreamConfig};
use crate::error::BridgeError;
use crate::protocol::openai_chat::OpenAiMessage;

use super::{DifyRequest, RESPONSE_MODE_STREAMING};

/// Turn the caller's message history into the single upstream query string.
///
/// `Chat` apps get the earlier turns as a quoted transcript followed by the
/// final message; `Completion` and `Workflow` apps see only the final message.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidRequest`] when `messages` is empty.
pub fn shape_query(bot_type: BotType, messages: &[OpenAiMessage]) -> Result<String, BridgeError> {
    let Some((last, history)) = messages.split_last() else {
        return Err(BridgeError::InvalidRequest(
            "messages must contain at least one message".to_string(),
        ));
    };

    match bot_type {
        BotType::Chat => {
            let mut query = String::from("here is our talk history:\n'''\n");
            for (idx, message) in history.iter().enumerate() {
                if idx > 0 {
                    query.push('\n');
                }
                query.push_str(&message.role);
                query.push_str(": ");
                query.push_str(&message.text());
            }
            query.push_str("\n'''\n\nhere is my question:\n");
            query.push_str(&last.text());
            Ok(query)
        }
        BotType::Completion | BotType::Workflow => Ok(last.text()),
    }
}

/// Build the upstream request body around an already-shaped query.
#[must_use]
pub fn build_upstream_request(upstream: &UpstreamConfig, query: String) -> DifyRequest {
    let mut inputs = serde_json::Map::new();
    let query = match upstream.input_variable.as_deref() {
        Some(name) => {
            inputs.insert(name.to_string(), serde_json::Value::String(query));
            None
        }
        None => Some(query),
    };

    DifyRequest {
        inputs,
        query,
        response_mode: RESPONSE_MODE_STREAMING.to_string(),
        conversation_id: String::new(),
        user: upstream.user.clone(),
        auto_generate_name: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(role: &str, content: &str) -> OpenAiMessage {
        OpenAiMessage {
            role: role.to_string(),
            content: Some(json!(content)),
        }
    }

    #[test]
    fn test_chat_query_embeds_history() {
        let messages = vec![
            msg("system", "be brief"),
            msg("user", "hi"),
            msg("assistant", "hello"),
            msg("user", "what is rust?"),
        ];
        let query = shape_query(BotType::Chat, &messages).unwrap();
        assert_eq!(
            query,
            "here is our talk history:\n'''\nsystem: be brief\nuser: hi\nassistant: hello\n'''\n\nhere is my question:\nwhat is rust?"
        );
    }

    #[test]
    fn test_chat_query_single_message_has_empty_history() {
        let query = shape_query(BotType::Chat, &[msg("user", "hi")]).unwrap();
        assert_eq!(
            query,
            "here is our talk history:\n'''\n\n'''\n\nhere is my question:\nhi"
        );
    }

    #[test]
    fn test_completion_and_workflow_use_last_message() {
        let messages = vec![msg("user", "first"), msg("user", "second")];
        assert_eq!(shape_query(BotType::Completion, &messages).unwrap(), "second");
        assert_eq!(shape_query(BotType::Workflow, &messages).unwrap(), "second");
    }

    #[test]
    fn test_empty_messages_rejected() {
        let err = shape_query(BotType::Chat, &[]).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRequest(_)));
    }

    #[test]
    fn test_body_with_query() {
        let body = build_upstream_request(&UpstreamConfig::default(), "hi".to_string());
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            json!({
                "inputs": {},
                "query": "hi",
                "response_mode": "streaming",
                "conversation_id": "",
                "user": "apiuser",
                "auto_generate_name": false
            })
        );
    }

    #[test]
    fn test_body_with_input_variable() {
        let upstream = UpstreamConfig {
            input_variable: Some("question".to_string()),
            ..UpstreamConfig::default()
        };
        let body = build_upstream_request(&upstream, "hi".to_string());
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["inputs"], json!({"question": "hi"}));
        assert!(value.get("query").is_none());
        assert_eq!(value["response_mode"], "streaming");
    }
}
