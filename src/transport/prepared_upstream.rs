use http::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::config::{BotType, UpstreamConfig};
use crate::error::BridgeError;

/// Upstream endpoint resolved once at startup.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    bot_type: BotType,
    url: url::Url,
    static_headers: http::HeaderMap,
}

impl PreparedUpstream {
    /// Join the base URL with the bot type's API path and parse it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when the resulting URL does not parse.
    pub fn new(upstream: &UpstreamConfig) -> Result<Self, BridgeError> {
        let base = upstream.base_url.trim().trim_end_matches('/');
        let raw = format!("{base}{}", upstream.bot_type.api_path());
        let url = url::Url::parse(&raw)
            .map_err(|err| BridgeError::Config(format!("Invalid upstream URL '{raw}': {err}")))?;

        let mut static_headers = http::HeaderMap::with_capacity(2);
        static_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            bot_type: upstream.bot_type,
            url,
            static_headers,
        })
    }

    #[must_use]
    pub fn bot_type(&self) -> BotType {
        self.bot_type
    }

    #[must_use]
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Request headers with the caller's bearer token forwarded as-is.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Auth`] when the token cannot be carried in a header.
    pub fn headers_for_token(&self, token: &str) -> Result<http::HeaderMap, BridgeError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            BridgeError::Auth("Authorization token is not a valid header value".into())
        })?;
        value.set_sensitive(true);
        let mut headers = self.static_headers.clone();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }
}
