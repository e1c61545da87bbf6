use crate::error::BridgeError;
use crate::protocol::openai_chat::OpenAiChatRequest;

pub(crate) fn parse_openai_chat_request_wire(
    body: &bytes::Bytes,
) -> Result<OpenAiChatRequest, BridgeError> {
    let request: OpenAiChatRequest = serde_json::from_slice(body).map_err(|e| {
        BridgeError::InvalidRequest(format!("Invalid OpenAI Chat request body: {e}"))
    })?;
    if request.messages.is_empty() {
        return Err(BridgeError::InvalidRequest(
            "messages must contain at least one message".to_string(),
        ));
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_minimal_request() {
        let body = bytes::Bytes::from_static(
            br#"{"model":"dify","messages":[{"role":"user","content":"hi"}]}"#,
        );
        let request = parse_openai_chat_request_wire(&body).unwrap();
        assert_eq!(request.model, "dify");
        assert_eq!(request.messages.len(), 1);
        assert!(!request.wants_stream());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let body = bytes::Bytes::from_static(b"not json");
        let err = parse_openai_chat_request_wire(&body).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRequest(_)));
    }

    #[test]
    fn test_parse_rejects_missing_messages() {
        let body = bytes::Bytes::from_static(br#"{"model":"dify"}"#);
        assert!(parse_openai_chat_request_wire(&body).is_err());
    }

    #[test]
    fn test_parse_rejects_empty_messages() {
        let body = bytes::Bytes::from_static(br#"{"model":"dify","messages":[]}"#);
        let err = parse_openai_chat_request_wire(&body).unwrap_err();
        assert!(err.to_string().contains("at least one message"));
    }
}
