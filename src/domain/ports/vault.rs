//! Vault port: the kernel's only durable store.

use async_trait::async_trait;

use crate::domain::errors::KernelResult;
use crate::domain::models::ids::AgentId;

/// Key/value + document store reached over HTTP in production.
///
/// Bytes are the canonical serialization of the domain schemas; the
/// kernel never inspects persona payloads it fetches by id.
#[async_trait]
pub trait VaultStore: Send + Sync {
    async fn get(&self, namespace: &str, id: &str) -> KernelResult<Option<Vec<u8>>>;

    async fn put(&self, namespace: &str, id: &str, bytes: Vec<u8>) -> KernelResult<()>;

    async fn register_agent(&self, agent_id: AgentId, profile_id: &str) -> KernelResult<()>;
}
