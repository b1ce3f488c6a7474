use thiserror::Error;

/// Domain-level errors shared across application components.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The incoming payload missed a required field or violated invariants.
    #[error("validation error: {0}")]
    Validation(String),

    /// The moderation service could not be reached or answered garbage.
    #[error("moderation service failure: {0}")]
    Moderation(String),

    /// Embedding computation failed, locally or remotely.
    #[error("embedding failure: {0}")]
    Embedding(String),

    /// Similarity search against the chunk store failed.
    #[error("retrieval failure: {0}")]
    Retrieval(String),

    /// The generation service failed or returned an unusable completion.
    #[error("generation failure: {0}")]
    Generation(String),

    /// Catch-all for storage-related failures we don't want to leak directly.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Settings were missing or could not be parsed.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn moderation(msg: impl Into<String>) -> Self {
        Self::Moderation(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// True for failures raised by one of the remote model or search services.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Moderation(_) | Self::Embedding(_) | Self::Retrieval(_) | Self::Generation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_kinds_are_classified() {
        assert!(DomainError::moderation("down").is_upstream());
        assert!(DomainError::embedding("down").is_upstream());
        assert!(DomainError::retrieval("down").is_upstream());
        assert!(DomainError::generation("timed out").is_upstream());
        assert!(!DomainError::storage("disk full").is_upstream());
        assert!(!DomainError::validation("empty").is_upstream());
    }

    #[test]
    fn display_carries_detail() {
        let err = DomainError::generation("timed out after 60s");
        assert_eq!(err.to_string(), "generation failure: timed out after 60s");
    }
}
