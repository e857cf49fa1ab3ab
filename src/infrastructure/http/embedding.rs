//! HTTP adapter for the embedding backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::domain::errors::{KernelError, KernelResult};
use crate::domain::ports::embedding::EmbeddingBackend;

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    vector: Vec<f32>,
}

/// Production embedding client with a fixed configured dimension.
pub struct HttpEmbedding {
    client: reqwest::Client,
    base_url: String,
    dimension: usize,
}

impl HttpEmbedding {
    pub fn new(base_url: impl Into<String>, dimension: usize) -> anyhow::Result<Self> {
        Ok(Self {
            client: super::build_client(Duration::from_secs(30))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dimension,
        })
    }

    /// Startup probe; failure maps to exit code 66 at the binary boundary.
    pub async fn ping(&self) -> KernelResult<()> {
        self.embed_text("ping").await.map(|_| ())
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbedding {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(&self, text: &str) -> KernelResult<Vec<f32>> {
        let url = format!("{}/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({"text": text}))
            .send()
            .await
            .map_err(|e| KernelError::TransientExternal {
                endpoint: "embed".into(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(if status.is_server_error() {
                KernelError::TransientExternal {
                    endpoint: "embed".into(),
                    message: format!("status {status}"),
                }
            } else {
                KernelError::PermanentExternal {
                    endpoint: "embed".into(),
                    status: status.as_u16(),
                    message: "embed rejected request".into(),
                }
            });
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| KernelError::Serialization(e.to_string()))?;

        if parsed.vector.len() != self.dimension {
            return Err(KernelError::PermanentExternal {
                endpoint: "embed".into(),
                status: 500,
                message: format!(
                    "dimension mismatch: expected {}, got {}",
                    self.dimension,
                    parsed.vector.len()
                ),
            });
        }
        Ok(parsed.vector)
    }
}
