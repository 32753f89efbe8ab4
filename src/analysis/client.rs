//! Analysis oracle client
//!
//! One POST per prompt. Failures are classified but never retried here; the
//! workflows surface them and the user decides whether to run again.

use crate::util::sanitize_response;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Server error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Could not reach the analysis service: {0}")]
    Network(String),
    #[error("The analysis service did not answer in time")]
    Timeout,
    #[error("Unexpected response from the analysis service: {0}")]
    MalformedEnvelope(String),
}

/// Anything that turns a prompt into raw response text
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn send(&self, prompt: &str) -> Result<String, TransportError>;
}

#[derive(Serialize)]
struct PromptEnvelope<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct AnswerEnvelope {
    respuesta: String,
}

/// Oracle reached over HTTP: body `{"prompt": ...}`, answer `{"respuesta": ...}`
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpOracle {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn send(&self, prompt: &str) -> Result<String, TransportError> {
        tracing::debug!(endpoint = %self.endpoint, prompt_len = prompt.len(), "sending analysis request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&PromptEnvelope { prompt })
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let text = response.text().await.map_err(classify)?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "analysis service returned an error status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: sanitize_response(&text),
            });
        }

        let envelope: AnswerEnvelope = serde_json::from_str(&text).map_err(|e| {
            TransportError::MalformedEnvelope(format!("{} ({})", e, sanitize_response(&text)))
        })?;
        Ok(envelope.respuesta)
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}
