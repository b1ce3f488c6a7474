use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error};

use crate::domain::{AnswerResult, DomainError, MetricRecord};

/// Append-only sink for answering outcomes.
pub trait MetricsStore: Send + Sync {
    fn append(&self, record: &MetricRecord) -> Result<(), DomainError>;

    /// Newest records first.
    fn recent(&self, limit: usize) -> Result<Vec<MetricRecord>, DomainError>;
}

/// Wraps an answering call and persists exactly one `MetricRecord` for it.
pub struct MetricsRecorder {
    store: Arc<dyn MetricsStore>,
}

impl MetricsRecorder {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    /// Runs `call` and records its outcome. The call's result, or its error,
    /// is handed back unchanged.
    pub fn track<F>(&self, query: &str, call: F) -> Result<AnswerResult, DomainError>
    where
        F: FnOnce(&str) -> Result<AnswerResult, DomainError>,
    {
        let started = Instant::now();
        let outcome = call(query);
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let record = match &outcome {
            Ok(result) => MetricRecord::succeeded(query, latency_ms, result),
            Err(err) => MetricRecord::failed(query, latency_ms, err.to_string()),
        };
        self.persist(&record);

        outcome
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<MetricRecord>, DomainError> {
        self.store.recent(limit)
    }

    // A failing metrics store never masks the answering outcome.
    fn persist(&self, record: &MetricRecord) {
        match self.store.append(record) {
            Ok(()) => debug!(
                target: "gated_rag::metrics",
                id = %record.id,
                success = record.success,
                latency_ms = record.latency_ms,
                "metric recorded"
            ),
            Err(err) => error!(
                target: "gated_rag::metrics",
                id = %record.id,
                error = %err,
                "failed to persist metric record"
            ),
        }
    }
}
