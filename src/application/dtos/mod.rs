use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AnswerResult, Chunk, MetricRecord, PageText, TokenUsage};

/// Question submitted to the answering pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub query: String,
}

/// Answer envelope handed to whatever surface fronts the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    pub model: Option<String>,
    pub usage: TokenUsage,
    pub num_chunks: usize,
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub blocked_by_policy: bool,
}

impl From<AnswerResult> for AskResponse {
    fn from(value: AnswerResult) -> Self {
        let blocked_by_policy = value.is_blocked();
        Self {
            answer: value.answer,
            model: value.model,
            usage: value.usage,
            num_chunks: value.chunks.len(),
            chunks: value.chunks,
            blocked_by_policy,
        }
    }
}

/// Already-extracted document text to be chunked, embedded and stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestDocumentRequest {
    pub title: String,
    pub source_path: String,
    pub pages: Vec<PageText>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub document_id: Uuid,
    pub title: String,
    pub pages: usize,
    pub chunks: usize,
}

/// Health/readiness report for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatusResponse {
    pub ok: bool,
    pub message: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricListResponse {
    pub items: Vec<MetricRecord>,
}
