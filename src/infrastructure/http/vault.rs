//! HTTP adapter for the Vault store.

use std::time::Duration;

use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::debug;

use crate::domain::errors::{KernelError, KernelResult};
use crate::domain::models::ids::AgentId;
use crate::domain::ports::vault::VaultStore;

/// Production Vault client. Writes serialize per-agent at the service
/// side; this adapter only adds transport retry.
pub struct HttpVault {
    client: Client,
    base_url: String,
}

impl HttpVault {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: super::build_client(Duration::from_secs(30))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Startup probe; failure maps to exit code 65 at the binary boundary.
    pub async fn ping(&self) -> KernelResult<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            KernelError::TransientExternal { endpoint: "vault".into(), message: e.to_string() }
        })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(KernelError::TransientExternal {
                endpoint: "vault".into(),
                message: format!("health returned {}", response.status()),
            })
        }
    }

    fn backoff() -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..ExponentialBackoff::default()
        }
    }

    fn classify(status: StatusCode) -> Option<backoff::Error<KernelError>> {
        if status.is_server_error() || status.as_u16() == 429 {
            Some(backoff::Error::transient(KernelError::TransientExternal {
                endpoint: "vault".into(),
                message: format!("status {status}"),
            }))
        } else if status.is_client_error() && status != StatusCode::NOT_FOUND {
            Some(backoff::Error::permanent(KernelError::PermanentExternal {
                endpoint: "vault".into(),
                status: status.as_u16(),
                message: "vault rejected request".into(),
            }))
        } else {
            None
        }
    }
}

#[async_trait]
impl VaultStore for HttpVault {
    async fn get(&self, namespace: &str, id: &str) -> KernelResult<Option<Vec<u8>>> {
        let url = format!("{}/kv/{namespace}/{id}", self.base_url);
        retry(Self::backoff(), || async {
            let response = self.client.get(&url).send().await.map_err(|e| {
                backoff::Error::transient(KernelError::TransientExternal {
                    endpoint: "vault".into(),
                    message: e.to_string(),
                })
            })?;

            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if let Some(err) = Self::classify(response.status()) {
                return Err(err);
            }
            let bytes = response.bytes().await.map_err(|e| {
                backoff::Error::transient(KernelError::TransientExternal {
                    endpoint: "vault".into(),
                    message: e.to_string(),
                })
            })?;
            Ok(Some(bytes.to_vec()))
        })
        .await
    }

    async fn put(&self, namespace: &str, id: &str, bytes: Vec<u8>) -> KernelResult<()> {
        let url = format!("{}/kv/{namespace}/{id}", self.base_url);
        debug!(namespace, id, len = bytes.len(), "vault put");
        retry(Self::backoff(), || {
            let body = bytes.clone();
            let url = url.clone();
            async move {
                let response =
                    self.client.put(&url).body(body).send().await.map_err(|e| {
                        backoff::Error::transient(KernelError::TransientExternal {
                            endpoint: "vault".into(),
                            message: e.to_string(),
                        })
                    })?;
                if let Some(err) = Self::classify(response.status()) {
                    return Err(err);
                }
                Ok(())
            }
        })
        .await
    }

    async fn register_agent(&self, agent_id: AgentId, profile_id: &str) -> KernelResult<()> {
        let url = format!("{}/agents", self.base_url);
        let body = json!({"agent_id": agent_id, "profile_id": profile_id});
        retry(Self::backoff(), || async {
            let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
                backoff::Error::transient(KernelError::TransientExternal {
                    endpoint: "vault".into(),
                    message: e.to_string(),
                })
            })?;
            if let Some(err) = Self::classify(response.status()) {
                return Err(err);
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_missing_key_is_none() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/kv/profiles/absent").with_status(404).create_async().await;

        let vault = HttpVault::new(server.url()).unwrap();
        assert!(vault.get("profiles", "absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_then_visible_to_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/kv/epochs/e1")
            .match_body("summary-bytes")
            .with_status(200)
            .create_async()
            .await;

        let vault = HttpVault::new(server.url()).unwrap();
        vault.put("epochs", "e1", b"summary-bytes".to_vec()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn register_posts_agent_identity() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/agents").with_status(200).create_async().await;

        let vault = HttpVault::new(server.url()).unwrap();
        vault.register_agent(AgentId::new(), "researcher-v2").await.unwrap();
        mock.assert_async().await;
    }
}
