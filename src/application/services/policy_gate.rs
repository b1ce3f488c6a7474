use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};

use crate::domain::{DomainError, ModerationVerdict, PolicyDecision};

pub const PROFANITY_MESSAGE: &str = "Your request contains profanity and cannot be processed.";
pub const POLICY_VIOLATION_MESSAGE: &str =
    "Your request violates safety or content policy and cannot be processed.";

const BLOCKED_TERMS: &[&str] = &[
    "fuck",
    "shit",
    "bitch",
    "bastard",
    "asshole",
    "motherfucker",
    "cunt",
    "idiot",
];

/// Abstraction over a remote content moderation service.
pub trait ModerationEngine: Send + Sync {
    fn moderate(&self, model: &str, text: &str) -> Result<ModerationVerdict, DomainError>;
}

/// Decides whether a query may reach the generation service.
///
/// The lexical check always runs first; the moderation service is only
/// consulted for queries that pass it.
pub struct PolicyGate {
    moderator: Arc<dyn ModerationEngine>,
    moderation_model: String,
    profanity: Regex,
}

impl PolicyGate {
    pub fn new(
        moderator: Arc<dyn ModerationEngine>,
        moderation_model: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let pattern = format!(r"(?i)\b(?:{})\b", BLOCKED_TERMS.join("|"));
        let profanity = Regex::new(&pattern).map_err(|err| {
            DomainError::configuration(format!("invalid profanity pattern: {err}"))
        })?;

        Ok(Self {
            moderator,
            moderation_model: moderation_model.into(),
            profanity,
        })
    }

    pub fn contains_profanity(&self, text: &str) -> bool {
        self.profanity.is_match(text)
    }

    pub fn enforce(&self, query: &str) -> Result<PolicyDecision, DomainError> {
        if self.contains_profanity(query) {
            info!(target: "gated_rag::policy", stage = "lexical", "query blocked");
            return Ok(PolicyDecision::block(PROFANITY_MESSAGE));
        }

        let verdict = self.moderator.moderate(&self.moderation_model, query)?;
        if verdict.flagged {
            info!(target: "gated_rag::policy", stage = "moderation", "query blocked");
            return Ok(PolicyDecision::block(POLICY_VIOLATION_MESSAGE));
        }

        debug!(target: "gated_rag::policy", "query allowed");
        Ok(PolicyDecision::allow())
    }
}
