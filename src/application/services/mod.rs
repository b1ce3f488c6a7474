//! Service layer orchestrating domain operations and infrastructure adapters.

mod answer_service;
mod context_builder;
mod ingest_service;
mod metrics_recorder;
mod policy_gate;

pub use answer_service::{
    build_messages, AnswerService, EmbeddingEngine, GenerationEngine, ServiceConfig, VectorStore,
};
pub use context_builder::build_context;
pub use ingest_service::{chunk_text, split_pages, IngestService};
pub use metrics_recorder::{MetricsRecorder, MetricsStore};
pub use policy_gate::{
    ModerationEngine, PolicyGate, POLICY_VIOLATION_MESSAGE, PROFANITY_MESSAGE,
};
