use http::header::AUTHORIZATION;

use crate::error::BridgeError;

const BEARER_SCHEME: &str = "Bearer";

/// Extract the bearer token the caller wants forwarded upstream.
///
/// The gateway does not judge the token; the upstream does. It only has to
/// be present: `Authorization: Bearer <token>` with a non-empty token.
///
/// # Errors
///
/// Returns [`BridgeError::Auth`] when the header is missing, unreadable,
/// uses another scheme, or carries no token.
pub fn extract_bearer_token(headers: &http::HeaderMap) -> Result<&str, BridgeError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| BridgeError::Auth("Missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| BridgeError::Auth("Authorization header is not valid text".to_string()))?;

    let (scheme, token) = value.trim().split_once(' ').unwrap_or((value.trim(), ""));
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(BridgeError::Auth("Authorization scheme must be Bearer".to_string()));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(BridgeError::Auth("Missing bearer token".to_string()));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(value: &str) -> http::HeaderMap {
        let mut headers = http::HeaderMap::new();
        headers.insert(AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token(&headers_with("Bearer app-123")).unwrap(), "app-123");
        assert_eq!(extract_bearer_token(&headers_with("bearer  app-123 ")).unwrap(), "app-123");
    }

    #[test]
    fn test_missing_header_rejected() {
        let err = extract_bearer_token(&http::HeaderMap::new()).unwrap_err();
        assert!(matches!(err, BridgeError::Auth(_)));
    }

    #[test]
    fn test_missing_token_rejected() {
        assert!(extract_bearer_token(&headers_with("Bearer")).is_err());
        assert!(extract_bearer_token(&headers_with("Bearer    ")).is_err());
    }

    #[test]
    fn test_other_scheme_rejected() {
        assert!(extract_bearer_token(&headers_with("Basic dXNlcjpwYXNz")).is_err());
        assert!(extract_bearer_token(&headers_with("app-123")).is_err());
    }
}
