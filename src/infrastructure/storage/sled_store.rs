use std::path::{Path, PathBuf};

use bincode::Options;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::{Config, Db, IVec, Tree};
use uuid::Uuid;

use crate::{
    application::services::{MetricsStore, VectorStore},
    domain::{Chunk, ChunkEmbedding, Document, DomainError, Metadata, MetricRecord, StoredChunk},
};

const DOCUMENTS_TREE: &str = "documents";
const CHUNKS_TREE: &str = "chunks";
const METRICS_TREE: &str = "metrics";

/// Embedded chunk and metrics store backed by `sled`.
///
/// Chunks are kept whole in one tree and ranked in memory by cosine
/// similarity. Metric records live in their own tree keyed by creation time,
/// so iteration is chronological.
pub struct SledStore {
    db: Db,
    documents: Tree,
    chunks: Tree,
    metrics: Tree,
    _data_dir: PathBuf,
    write_lock: Mutex<()>,
}

// JSON-valued fields are stored as text; bincode cannot decode self-describing values.
#[derive(Serialize, Deserialize)]
struct ChunkRow {
    id: Uuid,
    document_id: Uuid,
    chunk_index: usize,
    content: String,
    metadata_json: String,
    embedding: ChunkEmbedding,
}

#[derive(Serialize, Deserialize)]
struct MetricRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    user_query: String,
    model: Option<String>,
    latency_ms: u64,
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
    num_chunks: usize,
    success: bool,
    error_message: Option<String>,
    response_sample: Option<String>,
    extra_json: String,
}

impl SledStore {
    /// Opens (or creates) a sled database rooted at `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|err| {
            DomainError::storage(format!("failed to create data directory {:?}: {err}", dir))
        })?;

        let db = Config::default()
            .path(&dir)
            .cache_capacity(64 * 1024 * 1024)
            .mode(sled::Mode::HighThroughput)
            .open()
            .map_err(|err| DomainError::storage(format!("failed to open sled db: {err}")))?;

        let open_tree = |name: &str| {
            db.open_tree(name).map_err(|err| {
                DomainError::storage(format!("failed to open {name} tree: {err}"))
            })
        };
        let documents = open_tree(DOCUMENTS_TREE)?;
        let chunks = open_tree(CHUNKS_TREE)?;
        let metrics = open_tree(METRICS_TREE)?;

        Ok(Self {
            db,
            documents,
            chunks,
            metrics,
            _data_dir: dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Number of stored chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn document(&self, id: &Uuid) -> Result<Option<Document>, DomainError> {
        self.documents
            .get(id.as_bytes())
            .map_err(|err| DomainError::storage(format!("failed to read document: {err}")))?
            .map(|bytes| Self::deserialize(bytes.as_ref()))
            .transpose()
    }

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, DomainError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .serialize(value)
            .map_err(|err| DomainError::storage(format!("serialization error: {err}")))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DomainError> {
        bincode::options()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .deserialize(bytes)
            .map_err(|err| DomainError::storage(format!("deserialization error: {err}")))
    }

    fn encode_json(value: &Metadata) -> Result<String, DomainError> {
        serde_json::to_string(value)
            .map_err(|err| DomainError::storage(format!("metadata encoding error: {err}")))
    }

    fn decode_json(raw: &str) -> Result<Metadata, DomainError> {
        serde_json::from_str(raw)
            .map_err(|err| DomainError::storage(format!("metadata decoding error: {err}")))
    }

    fn chunk_key(chunk: &StoredChunk) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(chunk.document_id.as_bytes());
        key.extend_from_slice(&(chunk.chunk_index as u64).to_be_bytes());
        key
    }

    fn metric_key(record: &MetricRecord) -> Vec<u8> {
        let nanos = record
            .created_at
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .max(0) as u64;
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(&nanos.to_be_bytes());
        key.extend_from_slice(record.id.as_bytes());
        key
    }

    fn decode_chunk(bytes: &IVec) -> Result<StoredChunk, DomainError> {
        let row: ChunkRow = Self::deserialize(bytes.as_ref())?;
        Ok(StoredChunk {
            id: row.id,
            document_id: row.document_id,
            chunk_index: row.chunk_index,
            content: row.content,
            metadata: Self::decode_json(&row.metadata_json)?,
            embedding: row.embedding,
        })
    }

    fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32, DomainError> {
        if query.len() != candidate.len() {
            return Err(DomainError::retrieval(format!(
                "embedding dimension mismatch: query {} vs candidate {}",
                query.len(),
                candidate.len()
            )));
        }

        let mut dot = 0.0f32;
        let mut q_norm = 0.0f32;
        let mut c_norm = 0.0f32;

        for (q, c) in query.iter().zip(candidate.iter()) {
            dot += q * c;
            q_norm += q * q;
            c_norm += c * c;
        }

        let denom = q_norm.sqrt() * c_norm.sqrt();
        if denom == 0.0 {
            return Ok(0.0);
        }

        Ok((dot / denom).clamp(-1.0, 1.0))
    }

    fn flush(tree: &Tree, what: &str) -> Result<(), DomainError> {
        tree.flush()
            .map_err(|err| DomainError::storage(format!("failed to flush {what}: {err}")))?;
        Ok(())
    }
}

impl VectorStore for SledStore {
    fn persist_document(&self, document: &Document) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock();

        let bytes = Self::serialize(document)?;
        self.documents
            .insert(document.id.as_bytes(), bytes)
            .map_err(|err| DomainError::storage(format!("failed to persist document: {err}")))?;

        Self::flush(&self.documents, "documents")
    }

    fn persist_chunk(&self, chunk: &StoredChunk) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock();

        let row = ChunkRow {
            id: chunk.id,
            document_id: chunk.document_id,
            chunk_index: chunk.chunk_index,
            content: chunk.content.clone(),
            metadata_json: Self::encode_json(&chunk.metadata)?,
            embedding: chunk.embedding.clone(),
        };
        let bytes = Self::serialize(&row)?;
        self.chunks
            .insert(Self::chunk_key(chunk), bytes)
            .map_err(|err| DomainError::storage(format!("failed to persist chunk: {err}")))?;

        Self::flush(&self.chunks, "chunks")
    }

    fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<Chunk>, DomainError> {
        let mut scored: Vec<(StoredChunk, f32)> = Vec::new();

        for entry in self.chunks.iter() {
            let (_, value) = entry.map_err(|err| {
                DomainError::retrieval(format!("failed to read chunk record: {err}"))
            })?;
            let chunk = Self::decode_chunk(&value)?;
            if chunk.embedding.dims() != vector.len() {
                return Err(DomainError::retrieval(format!(
                    "chunk {} was embedded with {} ({} dims), query has {} dims",
                    chunk.id,
                    chunk.embedding.model,
                    chunk.embedding.dims(),
                    vector.len()
                )));
            }
            let score = Self::cosine_similarity(vector, &chunk.embedding.vector)?;
            scored.push((chunk, score));
        }

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(chunk, score)| chunk.as_chunk(score.max(0.0)))
            .collect())
    }

    fn ping(&self) -> Result<(), DomainError> {
        self.db
            .flush()
            .map_err(|err| DomainError::storage(format!("failed to flush db: {err}")))?;

        Ok(())
    }
}

impl MetricsStore for SledStore {
    fn append(&self, record: &MetricRecord) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock();

        let row = MetricRow {
            id: record.id,
            created_at: record.created_at,
            user_query: record.user_query.clone(),
            model: record.model.clone(),
            latency_ms: record.latency_ms,
            prompt_tokens: record.prompt_tokens,
            completion_tokens: record.completion_tokens,
            total_tokens: record.total_tokens,
            num_chunks: record.num_chunks,
            success: record.success,
            error_message: record.error_message.clone(),
            response_sample: record.response_sample.clone(),
            extra_json: Self::encode_json(&record.extra)?,
        };
        let bytes = Self::serialize(&row)?;
        self.metrics
            .insert(Self::metric_key(record), bytes)
            .map_err(|err| DomainError::storage(format!("failed to append metric: {err}")))?;

        Self::flush(&self.metrics, "metrics")
    }

    fn recent(&self, limit: usize) -> Result<Vec<MetricRecord>, DomainError> {
        let mut items = Vec::new();

        for entry in self.metrics.iter().rev().take(limit) {
            let (_, value) = entry.map_err(|err| {
                DomainError::storage(format!("failed to read metric record: {err}"))
            })?;
            let row: MetricRow = Self::deserialize(value.as_ref())?;
            items.push(MetricRecord {
                id: row.id,
                created_at: row.created_at,
                user_query: row.user_query,
                model: row.model,
                latency_ms: row.latency_ms,
                prompt_tokens: row.prompt_tokens,
                completion_tokens: row.completion_tokens,
                total_tokens: row.total_tokens,
                num_chunks: row.num_chunks,
                success: row.success,
                error_message: row.error_message,
                response_sample: row.response_sample,
                extra: Self::decode_json(&row.extra_json)?,
            });
        }

        Ok(items)
    }
}
