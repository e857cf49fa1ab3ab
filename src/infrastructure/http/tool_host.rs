//! HTTP adapter for the tool host port.
//!
//! Outbound invocations flow through a token-bucket rate limiter, then a
//! retry loop with exponential backoff and jitter. Host-side timeouts
//! arrive as `status = timeout` in the body and are not retried here;
//! transport failures and 5xx are.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use tracing::{debug, warn};

use crate::domain::errors::{KernelError, KernelResult};
use crate::domain::models::config::RateLimitConfig;
use crate::domain::ports::tool_host::{ToolCall, ToolHost, ToolResponse};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Production tool-host client.
pub struct HttpToolHost {
    client: Client,
    base_url: String,
    limiter: DirectLimiter,
    max_elapsed: Duration,
}

impl HttpToolHost {
    pub fn new(base_url: impl Into<String>, rate: &RateLimitConfig) -> anyhow::Result<Self> {
        let rps = NonZeroU32::new(rate.requests_per_second.max(1)).expect("non-zero rps");
        let burst = NonZeroU32::new(rate.burst_size.max(1)).expect("non-zero burst");
        let quota = Quota::per_second(rps).allow_burst(burst);

        Ok(Self {
            client: super::build_client(Duration::from_secs(300))?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter: RateLimiter::direct(quota),
            max_elapsed: Duration::from_secs(60),
        })
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(10),
            max_elapsed_time: Some(self.max_elapsed),
            ..ExponentialBackoff::default()
        }
    }

    async fn post_invoke(&self, call: &ToolCall) -> Result<ToolResponse, backoff::Error<KernelError>> {
        let url = format!("{}/invoke", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(call)
            .send()
            .await
            .map_err(|e| {
                backoff::Error::transient(KernelError::TransientExternal {
                    endpoint: "tool-host".into(),
                    message: e.to_string(),
                })
            })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            warn!(%status, tool_id = %call.tool_id, "tool host transient error, will retry");
            return Err(backoff::Error::transient(KernelError::TransientExternal {
                endpoint: "tool-host".into(),
                message: format!("status {status}"),
            }));
        }
        if status.is_client_error() {
            return Err(backoff::Error::permanent(KernelError::PermanentExternal {
                endpoint: "tool-host".into(),
                status: status.as_u16(),
                message: format!("tool {} rejected", call.tool_id),
            }));
        }

        response.json::<ToolResponse>().await.map_err(|e| {
            backoff::Error::permanent(KernelError::Serialization(e.to_string()))
        })
    }
}

#[async_trait]
impl ToolHost for HttpToolHost {
    async fn invoke(&self, call: ToolCall) -> KernelResult<ToolResponse> {
        self.limiter.until_ready().await;
        debug!(tool_id = %call.tool_id, trace_id = %call.trace_id, "invoking tool");

        // Retries re-send the identical call, trace id included.
        retry(self.backoff(), || self.post_invoke(&call)).await
    }

    async fn health(&self) -> KernelResult<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            KernelError::TransientExternal { endpoint: "tool-host".into(), message: e.to_string() }
        })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(KernelError::TransientExternal {
                endpoint: "tool-host".into(),
                message: format!("health returned {}", response.status()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ids::TraceId;
    use serde_json::json;

    fn make_host(url: &str) -> HttpToolHost {
        HttpToolHost::new(url, &RateLimitConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn ok_response_round_trips() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/invoke")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "status": "ok",
                    "payload": {"answer": 42},
                    "cost": {"tokens": 5, "wall_ms": 12, "bytes": 128}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let host = make_host(&server.url());
        let call = ToolCall::new("numpy.eval", json!({"expr": "6*7"}), TraceId::new());
        let response = host.invoke(call).await.unwrap();

        assert_eq!(response.payload["answer"], 42);
        assert_eq!(response.cost.tokens, 5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn host_timeout_is_a_status_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/invoke")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"status": "timeout", "payload": null, "cost": {"tokens":0,"wall_ms":0,"bytes":0}}).to_string())
            .create_async()
            .await;

        let host = make_host(&server.url());
        let call = ToolCall::new("slow.tool", json!({}), TraceId::new());
        let response = host.invoke(call).await.unwrap();
        assert_eq!(response.status, crate::domain::ports::tool_host::ToolStatus::Timeout);
    }

    #[tokio::test]
    async fn client_errors_are_permanent() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/invoke").with_status(404).create_async().await;

        let host = make_host(&server.url());
        let call = ToolCall::new("missing.tool", json!({}), TraceId::new());
        let err = host.invoke(call).await.unwrap_err();
        assert!(matches!(err, KernelError::PermanentExternal { status: 404, .. }));
    }

    #[tokio::test]
    async fn health_reflects_endpoint() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/health").with_status(200).create_async().await;
        let host = make_host(&server.url());
        assert!(host.health().await.is_ok());
    }
}
