mod ids;
mod request_id;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::protocol::dify::event::EventClassifier;
use crate::transport::{HttpTransport, PreparedUpstream};

pub use ids::{IdSource, SequentialIds, SystemIds};
use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub upstream: PreparedUpstream,
    ids: Arc<dyn IdSource>,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport, upstream: PreparedUpstream) -> Self {
        Self {
            config,
            transport,
            upstream,
            ids: Arc::new(SystemIds),
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Build transport and upstream endpoint straight from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when the upstream URL cannot be parsed.
    pub fn from_config(config: AppConfig) -> Result<Self, BridgeError> {
        let upstream = PreparedUpstream::new(&config.upstream)?;
        let transport = HttpTransport::new(&config.server);
        Ok(Self::new(config, transport, upstream))
    }

    /// Replace the id/clock source (deterministic ids in tests).
    #[must_use]
    pub fn with_id_source(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    #[must_use]
    pub fn ids(&self) -> Arc<dyn IdSource> {
        Arc::clone(&self.ids)
    }

    #[must_use]
    pub fn event_classifier(&self) -> EventClassifier {
        EventClassifier::new(self.config.upstream.output_variable.clone())
    }

    pub fn next_request_seq(&self) -> u64 {
        self.request_ids.next_seq()
    }

    #[must_use]
    pub fn request_uuid(&self, request_seq: u64) -> uuid::Uuid {
        self.request_ids.request_uuid(request_seq)
    }
}
