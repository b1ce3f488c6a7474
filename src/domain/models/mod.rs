use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Free-form JSON object attached to chunks and metric records.
pub type Metadata = Map<String, Value>;

/// Upper bound on the answer prefix kept alongside a metric record.
pub const RESPONSE_SAMPLE_CHARS: usize = 255;

/// Key under which a blocked answer is flagged in `AnswerResult::extra`.
pub const BLOCKED_BY_POLICY: &str = "blocked_by_policy";

/// A retrieved slice of a source document, as seen by the answering pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: Metadata,
    /// Cosine similarity in `[0, 1]`; `None` when the chunk was not ranked.
    pub similarity: Option<f32>,
}

impl Chunk {
    pub fn new(content: impl Into<String>, page: Option<u32>) -> Self {
        let mut metadata = Metadata::new();
        if let Some(page) = page {
            metadata.insert("page".into(), Value::from(page));
        }
        Self {
            content: content.into(),
            metadata,
            similarity: None,
        }
    }

    pub fn with_similarity(mut self, similarity: f32) -> Self {
        self.similarity = Some(similarity);
        self
    }

    /// Page number recorded at ingestion time, if any.
    pub fn page(&self) -> Option<i64> {
        self.metadata.get("page").and_then(Value::as_i64)
    }
}

/// Outcome of the input policy check for a single query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub block_message: String,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            block_message: String::new(),
        }
    }

    pub fn block(message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            block_message: message.into(),
        }
    }
}

/// Token accounting reported by the generation service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Structured answer returned to callers of the answering pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub model: Option<String>,
    pub usage: TokenUsage,
    pub chunks: Vec<Chunk>,
    pub answer: String,
    pub extra: Metadata,
}

impl AnswerResult {
    /// Synthetic result substituted for a generation when the policy gate refuses a query.
    pub fn blocked(message: impl Into<String>) -> Self {
        let mut extra = Metadata::new();
        extra.insert(BLOCKED_BY_POLICY.into(), Value::Bool(true));
        Self {
            model: None,
            usage: TokenUsage::default(),
            chunks: Vec::new(),
            answer: message.into(),
            extra,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.extra
            .get(BLOCKED_BY_POLICY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// One persisted outcome of an answering attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_query: String,
    pub model: Option<String>,
    pub latency_ms: u64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub num_chunks: usize,
    pub success: bool,
    pub error_message: Option<String>,
    pub response_sample: Option<String>,
    pub extra: Metadata,
}

impl MetricRecord {
    pub fn succeeded(
        user_query: impl Into<String>,
        latency_ms: u64,
        result: &AnswerResult,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            user_query: user_query.into(),
            model: result.model.clone(),
            latency_ms,
            prompt_tokens: result.usage.prompt_tokens,
            completion_tokens: result.usage.completion_tokens,
            total_tokens: result.usage.total_tokens,
            num_chunks: result.chunks.len(),
            success: true,
            error_message: None,
            response_sample: response_sample(&result.answer),
            extra: result.extra.clone(),
        }
    }

    pub fn failed(
        user_query: impl Into<String>,
        latency_ms: u64,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            user_query: user_query.into(),
            model: None,
            latency_ms,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            num_chunks: 0,
            success: false,
            error_message: Some(error_message.into()),
            response_sample: None,
            extra: Metadata::new(),
        }
    }
}

fn response_sample(answer: &str) -> Option<String> {
    if answer.is_empty() {
        return None;
    }
    Some(answer.chars().take(RESPONSE_SAMPLE_CHARS).collect())
}

/// A source document registered during ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub source_path: String,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(title: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: sanitize_single_line(title),
            source_path: source_path.into(),
            created_at: Utc::now(),
        }
    }
}

/// Vector representation of a chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEmbedding {
    pub model: String,
    pub vector: Vec<f32>,
}

impl ChunkEmbedding {
    pub fn new(model: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            model: model.into(),
            vector,
        }
    }

    pub fn dims(&self) -> usize {
        self.vector.len()
    }
}

/// A chunk as written by ingestion: content plus its embedding and position.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: usize,
    pub content: String,
    pub metadata: Metadata,
    pub embedding: ChunkEmbedding,
}

impl StoredChunk {
    pub fn new(
        document_id: Uuid,
        chunk_index: usize,
        content: impl Into<String>,
        page: u32,
        embedding: ChunkEmbedding,
    ) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("page".into(), Value::from(page));
        Self {
            id: Uuid::new_v4(),
            document_id,
            chunk_index,
            content: content.into(),
            metadata,
            embedding,
        }
    }

    pub fn as_chunk(&self, similarity: f32) -> Chunk {
        Chunk {
            content: self.content.clone(),
            metadata: self.metadata.clone(),
            similarity: Some(similarity),
        }
    }
}

/// Text of one page, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    pub page: u32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

/// A single prompt message sent to the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// What the generation service hands back for one prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub model: String,
    pub usage: TokenUsage,
    pub text: String,
}

/// Verdict from the remote moderation service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModerationVerdict {
    pub flagged: bool,
    pub category_scores: Metadata,
}

fn sanitize_single_line(input: impl Into<String>) -> String {
    input
        .into()
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
