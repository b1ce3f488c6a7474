use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use super::context_builder::build_context;
use super::metrics_recorder::MetricsRecorder;
use super::policy_gate::PolicyGate;
use crate::{
    application::dtos::{AskRequest, AskResponse, HealthStatusResponse, MetricListResponse},
    domain::{AnswerResult, ChatMessage, Chunk, Completion, Document, DomainError, StoredChunk},
};

const SYSTEM_PROMPT: &str = "You are a helpful assistant answering questions using ONLY the provided context. \
If the answer is not in the context, say you do not know.";

/// Model identifiers and retrieval limits shared by the services.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub embedding_model: String,
    pub generation_model: String,
    pub moderation_model: String,
    pub top_k: usize,
    pub max_context_chars: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            embedding_model: "text-embedding-3-large".into(),
            generation_model: "gpt-4.1".into(),
            moderation_model: "omni-moderation-latest".into(),
            top_k: 5,
            max_context_chars: 8000,
        }
    }
}

impl ServiceConfig {
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}

/// Abstraction over any embedding engine (remote API or the offline hasher).
pub trait EmbeddingEngine: Send + Sync {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError>;

    fn dims(&self, _model: &str) -> Option<usize> {
        None
    }
}

/// Contract for the chunk store: ingestion writes, similarity search reads.
pub trait VectorStore: Send + Sync {
    fn persist_document(&self, document: &Document) -> Result<(), DomainError>;

    fn persist_chunk(&self, chunk: &StoredChunk) -> Result<(), DomainError>;

    /// Top `top_k` chunks ordered by decreasing similarity to `vector`.
    fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<Chunk>, DomainError>;

    fn ping(&self) -> Result<(), DomainError>;
}

/// Abstraction over a chat-completion style generation service.
pub trait GenerationEngine: Send + Sync {
    fn generate(&self, model: &str, messages: &[ChatMessage]) -> Result<Completion, DomainError>;
}

/// The orchestrator: policy gate, retrieval, context packing and generation,
/// with every attempt recorded by the metrics recorder.
pub struct AnswerService {
    gate: PolicyGate,
    embedder: Arc<dyn EmbeddingEngine>,
    store: Arc<dyn VectorStore>,
    generator: Arc<dyn GenerationEngine>,
    recorder: MetricsRecorder,
    config: ServiceConfig,
}

impl AnswerService {
    pub fn new(
        gate: PolicyGate,
        embedder: Arc<dyn EmbeddingEngine>,
        store: Arc<dyn VectorStore>,
        generator: Arc<dyn GenerationEngine>,
        recorder: MetricsRecorder,
        config: ServiceConfig,
    ) -> Self {
        Self {
            gate,
            embedder,
            store,
            generator,
            recorder,
            config,
        }
    }

    /// Answers `query`, persisting exactly one metric record whatever the outcome.
    pub fn answer(&self, query: &str) -> Result<AnswerResult, DomainError> {
        self.recorder.track(query, |q| self.answer_untracked(q))
    }

    pub fn ask(&self, request: AskRequest) -> Result<AskResponse, DomainError> {
        if request.query.trim().is_empty() {
            return Err(DomainError::validation("query cannot be empty"));
        }
        self.answer(&request.query).map(AskResponse::from)
    }

    pub fn recent_metrics(&self, limit: usize) -> Result<MetricListResponse, DomainError> {
        let items = self.recorder.recent(limit.clamp(1, 500))?;
        Ok(MetricListResponse { items })
    }

    pub fn health(&self) -> Result<HealthStatusResponse, DomainError> {
        self.store.ping()?;

        Ok(HealthStatusResponse {
            ok: true,
            message: "ready".into(),
            details: Some(format!(
                "embedding: {}, generation: {}, moderation: {}, checked_at: {}",
                self.config.embedding_model,
                self.config.generation_model,
                self.config.moderation_model,
                Utc::now()
            )),
        })
    }

    fn answer_untracked(&self, query: &str) -> Result<AnswerResult, DomainError> {
        let decision = self.gate.enforce(query)?;
        if !decision.allowed {
            return Ok(AnswerResult::blocked(decision.block_message));
        }

        let vector = self.embedder.embed(&self.config.embedding_model, query)?;
        let chunks = self.store.search(&vector, self.config.top_k)?;
        let context = build_context(&chunks, self.config.max_context_chars);
        debug!(
            target: "gated_rag::answer",
            retrieved = chunks.len(),
            context_chars = context.chars().count(),
            "context assembled"
        );

        let messages = build_messages(&context, query);
        let completion = self
            .generator
            .generate(&self.config.generation_model, &messages)?;
        info!(
            target: "gated_rag::answer",
            model = %completion.model,
            total_tokens = completion.usage.total_tokens,
            "answer generated"
        );

        Ok(AnswerResult {
            model: Some(completion.model),
            usage: completion.usage,
            chunks,
            answer: completion.text,
            extra: Default::default(),
        })
    }
}

/// Two-message prompt confining the model to the retrieved context.
pub fn build_messages(context: &str, query: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Context:\n{context}\n\nUser question: {query}\n\nAnswer concisely and cite page numbers where relevant."
        )),
    ]
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::application::services::metrics_recorder::MetricsStore;
    use crate::application::services::policy_gate::{
        ModerationEngine, POLICY_VIOLATION_MESSAGE, PROFANITY_MESSAGE,
    };
    use crate::domain::{ChatRole, MetricRecord, ModerationVerdict, TokenUsage};

    #[derive(Default)]
    struct Calls {
        moderate: usize,
        embed: usize,
        search: Vec<usize>,
        generate: Vec<Vec<ChatMessage>>,
    }

    #[derive(Default)]
    struct FakeBackend {
        calls: Mutex<Calls>,
        flag: bool,
        fail_embedding: bool,
        fail_search: bool,
        fail_generation: bool,
        chunks: Vec<Chunk>,
    }

    impl ModerationEngine for FakeBackend {
        fn moderate(&self, _model: &str, _text: &str) -> Result<ModerationVerdict, DomainError> {
            self.calls.lock().moderate += 1;
            Ok(ModerationVerdict {
                flagged: self.flag,
                ..Default::default()
            })
        }
    }

    impl EmbeddingEngine for FakeBackend {
        fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>, DomainError> {
            self.calls.lock().embed += 1;
            if self.fail_embedding {
                return Err(DomainError::embedding("401 invalid api key"));
            }
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    impl VectorStore for FakeBackend {
        fn persist_document(&self, _document: &Document) -> Result<(), DomainError> {
            Ok(())
        }

        fn persist_chunk(&self, _chunk: &StoredChunk) -> Result<(), DomainError> {
            Ok(())
        }

        fn search(&self, _vector: &[f32], top_k: usize) -> Result<Vec<Chunk>, DomainError> {
            self.calls.lock().search.push(top_k);
            if self.fail_search {
                return Err(DomainError::retrieval("chunk store unreachable"));
            }
            Ok(self.chunks.iter().take(top_k).cloned().collect())
        }

        fn ping(&self) -> Result<(), DomainError> {
            Ok(())
        }
    }

    impl GenerationEngine for FakeBackend {
        fn generate(
            &self,
            model: &str,
            messages: &[ChatMessage],
        ) -> Result<Completion, DomainError> {
            self.calls.lock().generate.push(messages.to_vec());
            if self.fail_generation {
                return Err(DomainError::generation("request timed out"));
            }
            Ok(Completion {
                model: format!("{model}-2025-04-14"),
                usage: TokenUsage {
                    prompt_tokens: 200,
                    completion_tokens: 20,
                    total_tokens: 220,
                },
                text: "The warranty lasts two years [Page 3].".into(),
            })
        }
    }

    #[derive(Default)]
    struct MemoryMetrics {
        records: Mutex<Vec<MetricRecord>>,
    }

    impl MetricsStore for MemoryMetrics {
        fn append(&self, record: &MetricRecord) -> Result<(), DomainError> {
            self.records.lock().push(record.clone());
            Ok(())
        }

        fn recent(&self, limit: usize) -> Result<Vec<MetricRecord>, DomainError> {
            Ok(self.records.lock().iter().rev().take(limit).cloned().collect())
        }
    }

    fn service(backend: Arc<FakeBackend>, metrics: Arc<MemoryMetrics>) -> AnswerService {
        let config = ServiceConfig {
            top_k: 3,
            ..Default::default()
        };
        let gate = PolicyGate::new(backend.clone(), config.moderation_model.clone())
            .expect("valid gate");
        AnswerService::new(
            gate,
            backend.clone(),
            backend.clone(),
            backend,
            MetricsRecorder::new(metrics),
            config,
        )
    }

    fn stored_chunks() -> Vec<Chunk> {
        vec![
            Chunk::new("Warranty: two years.", Some(3)).with_similarity(0.91),
            Chunk::new("Returns within 30 days.", Some(4)).with_similarity(0.74),
            Chunk::new("Shipping is free.", Some(1)).with_similarity(0.42),
            Chunk::new("Unrelated appendix.", Some(9)).with_similarity(0.10),
        ]
    }

    #[test]
    fn profane_query_is_blocked_without_remote_calls() {
        let backend = Arc::new(FakeBackend::default());
        let metrics = Arc::new(MemoryMetrics::default());
        let service = service(backend.clone(), metrics.clone());

        let result = service.answer("you are an idiot").expect("result");
        assert!(result.is_blocked());
        assert_eq!(result.answer, PROFANITY_MESSAGE);
        assert_eq!(result.usage, TokenUsage::default());
        assert!(result.chunks.is_empty());

        let calls = backend.calls.lock();
        assert_eq!(calls.moderate, 0);
        assert_eq!(calls.embed, 0);
        assert!(calls.search.is_empty());
        assert!(calls.generate.is_empty());

        let records = metrics.records.lock();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert!(records[0].model.is_none());
        assert_eq!(
            records[0].extra.get("blocked_by_policy"),
            Some(&serde_json::Value::Bool(true))
        );
    }

    #[test]
    fn moderated_query_is_blocked_after_one_moderation_call() {
        let backend = Arc::new(FakeBackend {
            flag: true,
            ..Default::default()
        });
        let metrics = Arc::new(MemoryMetrics::default());
        let service = service(backend.clone(), metrics.clone());

        let result = service.answer("something harmful").expect("result");
        assert!(result.is_blocked());
        assert_eq!(result.answer, POLICY_VIOLATION_MESSAGE);

        let calls = backend.calls.lock();
        assert_eq!(calls.moderate, 1);
        assert_eq!(calls.embed, 0);
        assert!(calls.generate.is_empty());

        let records = metrics.records.lock();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert!(records[0].model.is_none());
        assert_eq!(records[0].total_tokens, 0);
        assert_eq!(
            records[0].extra.get("blocked_by_policy"),
            Some(&serde_json::Value::Bool(true))
        );
    }

    #[test]
    fn allowed_query_runs_each_stage_once() {
        let backend = Arc::new(FakeBackend {
            chunks: stored_chunks(),
            ..Default::default()
        });
        let metrics = Arc::new(MemoryMetrics::default());
        let service = service(backend.clone(), metrics.clone());

        let result = service.answer("How long is the warranty?").expect("result");
        assert!(!result.is_blocked());
        assert!(result.extra.is_empty());
        assert_eq!(result.model.as_deref(), Some("gpt-4.1-2025-04-14"));
        assert_eq!(result.usage.total_tokens, 220);
        assert_eq!(result.chunks.len(), 3);
        assert_eq!(result.chunks[0].similarity, Some(0.91));

        let calls = backend.calls.lock();
        assert_eq!(calls.moderate, 1);
        assert_eq!(calls.embed, 1);
        assert_eq!(calls.search, vec![3]);
        assert_eq!(calls.generate.len(), 1);

        let prompt = &calls.generate[0];
        assert_eq!(prompt.len(), 2);
        assert_eq!(prompt[0].role, ChatRole::System);
        assert_eq!(prompt[0].content, SYSTEM_PROMPT);
        assert!(prompt[1].content.contains("[Page 3]\nWarranty: two years.\n\n"));
        assert!(prompt[1]
            .content
            .contains("User question: How long is the warranty?"));

        let records = metrics.records.lock();
        assert_eq!(records.len(), 1);
        assert!(records[0].success);
        assert_eq!(records[0].num_chunks, 3);
        assert_eq!(records[0].prompt_tokens, 200);
    }

    #[test]
    fn generation_failure_is_recorded_then_returned() {
        let backend = Arc::new(FakeBackend {
            fail_generation: true,
            chunks: stored_chunks(),
            ..Default::default()
        });
        let metrics = Arc::new(MemoryMetrics::default());
        let service = service(backend, metrics.clone());

        let err = service.answer("How long is the warranty?").unwrap_err();
        assert!(err.is_upstream());
        assert!(matches!(err, DomainError::Generation(_)));

        let records = metrics.records.lock();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert!(records[0]
            .error_message
            .as_deref()
            .is_some_and(|msg| !msg.is_empty()));
    }

    #[test]
    fn embedding_failure_is_recorded_and_skips_later_stages() {
        let backend = Arc::new(FakeBackend {
            fail_embedding: true,
            chunks: stored_chunks(),
            ..Default::default()
        });
        let metrics = Arc::new(MemoryMetrics::default());
        let service = service(backend.clone(), metrics.clone());

        let err = service.answer("How long is the warranty?").unwrap_err();
        assert!(matches!(err, DomainError::Embedding(_)));

        let calls = backend.calls.lock();
        assert_eq!(calls.embed, 1);
        assert!(calls.search.is_empty());
        assert!(calls.generate.is_empty());

        let records = metrics.records.lock();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert_eq!(records[0].error_message.as_deref(), Some(err.to_string().as_str()));
        assert!(records[0].response_sample.is_none());
    }

    #[test]
    fn retrieval_failure_is_recorded_and_skips_generation() {
        let backend = Arc::new(FakeBackend {
            fail_search: true,
            ..Default::default()
        });
        let metrics = Arc::new(MemoryMetrics::default());
        let service = service(backend.clone(), metrics.clone());

        let err = service.answer("How long is the warranty?").unwrap_err();
        assert!(matches!(err, DomainError::Retrieval(_)));
        assert!(err.is_upstream());

        let calls = backend.calls.lock();
        assert_eq!(calls.search, vec![3]);
        assert!(calls.generate.is_empty());

        let records = metrics.records.lock();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert_eq!(records[0].num_chunks, 0);
        assert_eq!(records[0].error_message.as_deref(), Some(err.to_string().as_str()));
    }

    #[test]
    fn every_call_produces_exactly_one_record() {
        let backend = Arc::new(FakeBackend {
            chunks: stored_chunks(),
            ..Default::default()
        });
        let metrics = Arc::new(MemoryMetrics::default());
        let service = service(backend, metrics.clone());

        let _ = service.answer("what ships free?");
        let _ = service.answer("fuck this");
        let _ = service.answer("returns?");

        assert_eq!(metrics.records.lock().len(), 3);
        assert_eq!(service.recent_metrics(10).expect("metrics").items.len(), 3);
    }

    #[test]
    fn ask_rejects_blank_query_before_answering() {
        let backend = Arc::new(FakeBackend::default());
        let metrics = Arc::new(MemoryMetrics::default());
        let service = service(backend, metrics.clone());

        let err = service
            .ask(AskRequest {
                query: "   ".into(),
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(metrics.records.lock().is_empty());
    }

    #[test]
    fn ask_maps_result_into_response() {
        let backend = Arc::new(FakeBackend {
            chunks: stored_chunks(),
            ..Default::default()
        });
        let service = service(backend, Arc::new(MemoryMetrics::default()));

        let response = service
            .ask(AskRequest {
                query: "warranty?".into(),
            })
            .expect("response");
        assert_eq!(response.num_chunks, 3);
        assert!(!response.blocked_by_policy);
    }

    #[test]
    fn prompt_is_deterministic() {
        assert_eq!(build_messages("ctx", "q"), build_messages("ctx", "q"));
        let user = &build_messages("ctx", "q")[1].content;
        assert_eq!(
            user,
            "Context:\nctx\n\nUser question: q\n\nAnswer concisely and cite page numbers where relevant."
        );
    }
}
