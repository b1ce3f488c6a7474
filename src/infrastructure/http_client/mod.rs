//! HTTP client for OpenAI-compatible model APIs.
//!
//! One blocking `ureq` agent serves the embeddings, moderations and chat
//! completions endpoints. Calls are made once; there is no retry layer.

mod openai;

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Client for the embeddings, moderation and generation endpoints.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    agent: ureq::Agent,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            agent,
        }
    }

    /// Get the API endpoint URL
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// POST a JSON body and decode the JSON reply. Errors come back as text so
    /// each caller can wrap them in its own error kind.
    fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, String>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(path);
        debug!(target: "gated_rag::http", %url, "POST");

        let response = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(body)
            .map_err(handle_http_error)?;

        response
            .into_json::<Resp>()
            .map_err(|err| format!("malformed response from {path}: {err}"))
    }
}

/// Error envelope returned by OpenAI-compatible APIs.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Convert HTTP errors to readable messages
pub fn handle_http_error(error: ureq::Error) -> String {
    match error {
        ureq::Error::Status(code, response) => {
            if let Ok(err_response) = response.into_json::<ErrorResponse>() {
                match err_response.error.kind {
                    Some(kind) => format!("HTTP {code} - {kind}: {}", err_response.error.message),
                    None => format!("HTTP {code}: {}", err_response.error.message),
                }
            } else {
                format!("HTTP error: {code}")
            }
        }
        ureq::Error::Transport(transport) => format!("transport error: {transport}"),
    }
}
