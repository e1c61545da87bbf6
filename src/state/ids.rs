use std::sync::atomic::{AtomicU64, Ordering};

use crate::util::{random_alphanumeric, unix_now_millis, unix_now_secs};

const COMPLETION_ID_RANDOM_LEN: usize = 29;

/// Source of response identifiers and timestamps.
///
/// Handlers never read the clock directly; tests swap in
/// [`SequentialIds`] for stable output.
pub trait IdSource: Send + Sync {
    /// Identifier for one streamed chunk (`chatcmpl-<unix millis>`).
    fn chunk_id(&self) -> String;
    /// Identifier for a buffered completion (`chatcmpl-` + 29 alphanumerics).
    fn completion_id(&self) -> String;
    fn now_unix_secs(&self) -> u64;
}

/// Wall clock plus `fastrand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIds;

impl IdSource for SystemIds {
    fn chunk_id(&self) -> String {
        format!("chatcmpl-{}", unix_now_millis())
    }

    fn completion_id(&self) -> String {
        format!("chatcmpl-{}", random_alphanumeric(COMPLETION_ID_RANDOM_LEN))
    }

    fn now_unix_secs(&self) -> u64 {
        unix_now_secs()
    }
}

/// Deterministic ids: a fixed clock and a counter.
#[derive(Debug)]
pub struct SequentialIds {
    now: u64,
    counter: AtomicU64,
}

impl SequentialIds {
    #[must_use]
    pub fn new(now: u64) -> Self {
        Self {
            now,
            counter: AtomicU64::new(1),
        }
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

impl IdSource for SequentialIds {
    fn chunk_id(&self) -> String {
        format!("chatcmpl-{}", self.next())
    }

    fn completion_id(&self) -> String {
        format!("chatcmpl-{:029}", self.next())
    }

    fn now_unix_secs(&self) -> u64 {
        self.now
    }
}
