//! Wire types and service-trait implementations for the OpenAI-style endpoints.

use serde::{Deserialize, Serialize};

use super::OpenAiClient;
use crate::{
    application::services::{EmbeddingEngine, GenerationEngine, ModerationEngine},
    domain::{ChatMessage, Completion, DomainError, Metadata, ModerationVerdict, TokenUsage},
};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ModerationRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    category_scores: Metadata,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl EmbeddingEngine for OpenAiClient {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError> {
        let response: EmbedResponse = self
            .post_json("embeddings", &EmbedRequest { model, input: text })
            .map_err(DomainError::embedding)?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| DomainError::embedding("embeddings response carried no data"))
    }
}

impl ModerationEngine for OpenAiClient {
    fn moderate(&self, model: &str, text: &str) -> Result<ModerationVerdict, DomainError> {
        let response: ModerationResponse = self
            .post_json("moderations", &ModerationRequest { model, input: text })
            .map_err(DomainError::moderation)?;

        let result = response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::moderation("moderation response carried no results"))?;

        Ok(ModerationVerdict {
            flagged: result.flagged,
            category_scores: result.category_scores,
        })
    }
}

impl GenerationEngine for OpenAiClient {
    fn generate(&self, model: &str, messages: &[ChatMessage]) -> Result<Completion, DomainError> {
        let response: ChatResponse = self
            .post_json("chat/completions", &ChatRequest { model, messages })
            .map_err(DomainError::generation)?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::generation("completion carried no choices"))?;

        Ok(Completion {
            model: response.model,
            usage: response.usage,
            text: choice.message.content.unwrap_or_default(),
        })
    }
}
