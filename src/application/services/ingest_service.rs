use std::sync::Arc;

use tracing::{debug, info};

use super::answer_service::{EmbeddingEngine, ServiceConfig, VectorStore};
use crate::{
    application::dtos::{IngestDocumentRequest, IngestResponse},
    domain::{ChunkEmbedding, Document, DomainError, PageText, StoredChunk},
};

pub const DEFAULT_CHUNK_CHARS: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Page separator emitted by `pdftotext` and similar extractors.
const PAGE_BREAK: char = '\x0c';

/// Splits `text` into windows of `max_chars` characters that overlap by
/// `overlap` characters. Windows are trimmed and empty ones dropped.
pub fn chunk_text(
    text: &str,
    max_chars: usize,
    overlap: usize,
) -> Result<Vec<String>, DomainError> {
    if max_chars == 0 {
        return Err(DomainError::validation("chunk size must be greater than zero"));
    }
    if overlap >= max_chars {
        return Err(DomainError::validation(format!(
            "chunk overlap ({overlap}) must be smaller than chunk size ({max_chars})"
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    let step = max_chars - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        start += step;
    }

    Ok(chunks)
}

/// Splits extracted document text on form feeds into pages numbered from 1.
pub fn split_pages(raw: &str) -> Vec<PageText> {
    raw.split(PAGE_BREAK)
        .enumerate()
        .map(|(idx, text)| PageText {
            page: idx as u32 + 1,
            text: text.to_string(),
        })
        .collect()
}

/// Producer of stored chunks: registers a document, then chunks, embeds and
/// persists each non-blank page.
pub struct IngestService {
    embedder: Arc<dyn EmbeddingEngine>,
    store: Arc<dyn VectorStore>,
    config: ServiceConfig,
    chunk_chars: usize,
    chunk_overlap: usize,
}

impl IngestService {
    pub fn new(
        embedder: Arc<dyn EmbeddingEngine>,
        store: Arc<dyn VectorStore>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
            chunk_chars: DEFAULT_CHUNK_CHARS,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }

    pub fn with_chunking(mut self, chunk_chars: usize, chunk_overlap: usize) -> Self {
        self.chunk_chars = chunk_chars;
        self.chunk_overlap = chunk_overlap;
        self
    }

    pub fn ingest(&self, request: IngestDocumentRequest) -> Result<IngestResponse, DomainError> {
        if request.title.trim().is_empty() {
            return Err(DomainError::validation("title is required"));
        }
        if request.pages.is_empty() {
            return Err(DomainError::validation("document has no pages"));
        }

        let document = Document::new(request.title, request.source_path);
        self.store.persist_document(&document)?;

        let model = self.config.embedding_model();
        let expected_dims = self.embedder.dims(model);
        let mut chunk_index = 0usize;
        for page in &request.pages {
            if page.text.trim().is_empty() {
                debug!(target: "gated_rag::ingest", page = page.page, "skipping blank page");
                continue;
            }

            for content in chunk_text(&page.text, self.chunk_chars, self.chunk_overlap)? {
                let vector = self.embedder.embed(model, &content)?;
                if let Some(dims) = expected_dims.filter(|dims| *dims != vector.len()) {
                    return Err(DomainError::embedding(format!(
                        "{model} returned {} dims, expected {dims}",
                        vector.len()
                    )));
                }
                let chunk = StoredChunk::new(
                    document.id,
                    chunk_index,
                    content,
                    page.page,
                    ChunkEmbedding::new(model, vector),
                );
                self.store.persist_chunk(&chunk)?;
                chunk_index += 1;
            }
        }

        info!(
            target: "gated_rag::ingest",
            document = %document.id,
            title = %document.title,
            chunks = chunk_index,
            "document ingested"
        );

        Ok(IngestResponse {
            document_id: document.id,
            title: document.title,
            pages: request.pages.len(),
            chunks: chunk_index,
        })
    }
}
