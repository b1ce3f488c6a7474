//! Domain layer: core entities and value objects for the answering pipeline.

pub mod errors;
pub mod models;

pub use errors::DomainError;
pub use models::{
    AnswerResult, ChatMessage, ChatRole, Chunk, ChunkEmbedding, Completion, Document, Metadata,
    MetricRecord, ModerationVerdict, PageText, PolicyDecision, StoredChunk, TokenUsage,
    BLOCKED_BY_POLICY, RESPONSE_SAMPLE_CHARS,
};
