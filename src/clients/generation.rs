//! Remote generation collaborator.
//!
//! The model endpoint is treated as untrusted and external: a text-in /
//! text-out contract behind a bounded timeout. Everything that can go wrong
//! here is a recoverable task-level failure, never process-fatal.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::MessageRole;

/// One turn of conversation handed to the generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Request(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Generation returned an unusable response: {0}")]
    BadResponse(String),
}

/// Abstraction over the remote generation call so the pipeline can be
/// exercised with a scripted client in tests.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Produces the assistant reply for the given conversation history.
    /// The final turn is always the triggering user message.
    async fn generate(&self, history: &[ChatTurn]) -> Result<String, GenerationError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    text: String,
}

/// HTTP implementation speaking to the configured model endpoint.
pub struct HttpGenerationClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl HttpGenerationClient {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("parlor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build generation HTTP client: {e}"))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout,
        })
    }

    /// Flattens the history into a single prompt, newest turn last.
    fn build_prompt(history: &[ChatTurn]) -> String {
        let mut prompt = String::from("Conversation history:\n");
        for turn in history {
            prompt.push_str(turn.role.as_str());
            prompt.push_str(": ");
            prompt.push_str(&turn.content);
            prompt.push('\n');
        }
        prompt.push_str("assistant:");
        prompt
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(&self, history: &[ChatTurn]) -> Result<String, GenerationError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt: Self::build_prompt(history),
        };

        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        // The reqwest client already carries a timeout; the outer bound
        // protects against a connector that ignores it.
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))?
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GenerationError::Request(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::BadResponse(e.to_string()))?;

        if parsed.text.trim().is_empty() {
            return Err(GenerationError::BadResponse("empty completion".to_string()));
        }

        Ok(parsed.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_places_newest_turn_last() {
        let history = vec![
            ChatTurn {
                role: MessageRole::User,
                content: "Hi".to_string(),
            },
            ChatTurn {
                role: MessageRole::Assistant,
                content: "Hello!".to_string(),
            },
            ChatTurn {
                role: MessageRole::User,
                content: "How are you?".to_string(),
            },
        ];

        let prompt = HttpGenerationClient::build_prompt(&history);

        assert!(prompt.starts_with("Conversation history:\n"));
        assert!(prompt.ends_with("assistant:"));
        let hi = prompt.find("user: Hi").unwrap();
        let how = prompt.find("user: How are you?").unwrap();
        assert!(hi < how);
    }
}
