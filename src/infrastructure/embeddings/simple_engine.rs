use std::hash::{Hash, Hasher};

use ahash::AHasher;

use crate::{
    application::services::EmbeddingEngine,
    domain::{ChunkEmbedding, DomainError},
};

pub const DEFAULT_SIMPLE_MODEL: &str = "gated-rag/simple-hash";
pub const DEFAULT_SIMPLE_DIMENSIONS: usize = 256;

const MIN_DIMENSIONS: usize = 8;
const MAX_DIMENSIONS: usize = 4096;

/// Weight of an adjacent word pair relative to a single word.
const PAIR_WEIGHT: f32 = 0.5;

/// Offline embedder: signed feature hashing over lowercased words and
/// adjacent word pairs, L2-normalised.
///
/// Similarity is purely lexical. Vectors depend only on the text and the
/// dimension count, so chunks embedded at ingestion line up with later queries.
pub struct SimpleEmbedEngine {
    model_name: String,
    dimensions: usize,
}

impl SimpleEmbedEngine {
    /// `dimensions` is clamped to `8..=4096`; zero is rejected.
    pub fn try_new(model_name: impl Into<String>, dimensions: usize) -> Result<Self, DomainError> {
        if dimensions == 0 {
            return Err(DomainError::validation(
                "embedding dimensions must be greater than zero",
            ));
        }

        Ok(Self {
            model_name: model_name.into(),
            dimensions: dimensions.clamp(MIN_DIMENSIONS, MAX_DIMENSIONS),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Embeds `text` and tags the vector with this engine's model name.
    pub fn embed_payload(&self, text: &str) -> Result<ChunkEmbedding, DomainError> {
        let vector = self.vectorize(text)?;
        Ok(ChunkEmbedding::new(&self.model_name, vector))
    }

    fn vectorize(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        let words: Vec<String> = words(text).collect();
        if words.is_empty() {
            return Err(DomainError::validation("text has no words to embed"));
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for word in &words {
            self.add_feature(&mut vector, word.as_str(), 1.0);
        }
        for pair in words.windows(2) {
            self.add_feature(&mut vector, (&pair[0], &pair[1]), PAIR_WEIGHT);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }

    // top hash bit picks the sign so colliding features tend to cancel
    fn add_feature<T: Hash>(&self, vector: &mut [f32], feature: T, weight: f32) {
        let mut hasher = AHasher::default();
        feature.hash(&mut hasher);
        let hash = hasher.finish();

        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

impl Default for SimpleEmbedEngine {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_SIMPLE_MODEL.to_string(),
            dimensions: DEFAULT_SIMPLE_DIMENSIONS,
        }
    }
}

impl EmbeddingEngine for SimpleEmbedEngine {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, DomainError> {
        if !model.eq_ignore_ascii_case(&self.model_name) {
            return Err(DomainError::embedding(format!(
                "offline embedder serves `{}`, not `{model}`",
                self.model_name
            )));
        }
        self.vectorize(text)
    }

    fn dims(&self, _model: &str) -> Option<usize> {
        Some(self.dimensions)
    }
}
