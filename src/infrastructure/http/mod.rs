//! HTTP adapters for the external ports.

pub mod embedding;
pub mod tool_host;
pub mod vault;

pub use embedding::HttpEmbedding;
pub use tool_host::HttpToolHost;
pub use vault::HttpVault;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

/// Shared client builder: pooling, sane timeouts.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .tcp_nodelay(true)
        .build()
        .context("Failed to build HTTP client")
}
