//! Scripted in-process fakes for the kernel's three external ports.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use noesis::domain::errors::{KernelError, KernelResult};
use noesis::domain::models::budget::BudgetAmounts;
use noesis::domain::models::config::KernelConfig;
use noesis::domain::models::ids::AgentId;
use noesis::domain::models::outcome::CostTelemetry;
use noesis::domain::ports::embedding::{EmbeddingBackend, NullEmbedding};
use noesis::domain::ports::tool_host::{ToolCall, ToolHost, ToolResponse, ToolStatus};
use noesis::domain::ports::vault::VaultStore;

/// One scripted reply for a tool id.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Ok(Value, CostTelemetry),
    Pending { continuation: String, poll_after_ms: u64 },
    Timeout,
    Error { code: u16, message: String },
    /// Simulates a stuck tool: sleeps far longer than any test runs.
    Hang,
}

/// Tool host that replays per-tool scripts and counts invocations.
pub struct ScriptedToolHost {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    invocations: AtomicU32,
    health_failures_remaining: AtomicU32,
}

impl ScriptedToolHost {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            invocations: AtomicU32::new(0),
            health_failures_remaining: AtomicU32::new(0),
        }
    }

    pub async fn script(&self, tool_id: &str, replies: Vec<ScriptedReply>) {
        self.scripts
            .lock()
            .await
            .entry(tool_id.to_string())
            .or_default()
            .extend(replies);
    }

    pub fn fail_health_probes(&self, count: u32) {
        self.health_failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn invocation_count(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolHost for ScriptedToolHost {
    async fn invoke(&self, call: ToolCall) -> KernelResult<ToolResponse> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .scripts
            .lock()
            .await
            .get_mut(&call.tool_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(ScriptedReply::Ok(
                json!({"result": "ok"}),
                CostTelemetry { tokens: 5, wall_ms: 1, bytes: 64 },
            ));

        match reply {
            ScriptedReply::Ok(payload, cost) => Ok(ToolResponse { status: ToolStatus::Ok, payload, cost }),
            ScriptedReply::Pending { continuation, poll_after_ms } => Ok(ToolResponse {
                status: ToolStatus::Pending { continuation, poll_after_ms },
                payload: Value::Null,
                cost: CostTelemetry { tokens: 1, wall_ms: 1, bytes: 16 },
            }),
            ScriptedReply::Timeout => Ok(ToolResponse::timeout()),
            ScriptedReply::Error { code, message } => Ok(ToolResponse {
                status: ToolStatus::Error { code, message },
                payload: Value::Null,
                cost: CostTelemetry::zero(),
            }),
            ScriptedReply::Hang => {
                tokio::time::sleep(std::time::Duration::from_secs(300)).await;
                Ok(ToolResponse::timeout())
            }
        }
    }

    async fn health(&self) -> KernelResult<()> {
        let remaining = self.health_failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.health_failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(KernelError::TransientExternal {
                endpoint: "tool-host".into(),
                message: "health probe failed".into(),
            });
        }
        Ok(())
    }
}

/// In-memory Vault.
pub struct MemoryVault {
    store: Mutex<HashMap<(String, String), Vec<u8>>>,
    registered: Mutex<Vec<(AgentId, String)>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self { store: Mutex::new(HashMap::new()), registered: Mutex::new(Vec::new()) }
    }

    pub async fn entries_in(&self, namespace: &str) -> Vec<(String, Vec<u8>)> {
        self.store
            .lock()
            .await
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, id), bytes)| (id.clone(), bytes.clone()))
            .collect()
    }

    pub async fn registered_agents(&self) -> usize {
        self.registered.lock().await.len()
    }
}

#[async_trait]
impl VaultStore for MemoryVault {
    async fn get(&self, namespace: &str, id: &str) -> KernelResult<Option<Vec<u8>>> {
        Ok(self.store.lock().await.get(&(namespace.to_string(), id.to_string())).cloned())
    }

    async fn put(&self, namespace: &str, id: &str, bytes: Vec<u8>) -> KernelResult<()> {
        self.store.lock().await.insert((namespace.to_string(), id.to_string()), bytes);
        Ok(())
    }

    async fn register_agent(&self, agent_id: AgentId, profile_id: &str) -> KernelResult<()> {
        self.registered.lock().await.push((agent_id, profile_id.to_string()));
        Ok(())
    }
}

/// Embedding backend that counts how often the "RPC" is actually hit.
pub struct CountingEmbedding {
    inner: NullEmbedding,
    calls: AtomicU32,
}

impl CountingEmbedding {
    pub fn new() -> Self {
        Self { inner: NullEmbedding::default(), calls: AtomicU32::new(0) }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingBackend for CountingEmbedding {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed_text(&self, text: &str) -> KernelResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_text(text).await
    }
}

/// A config tuned for fast tests.
pub fn test_config() -> KernelConfig {
    let mut config = KernelConfig::default();
    config.endpoints.vault_url = "memory://vault".into();
    config.endpoints.embed_url = "memory://embed".into();
    config.endpoints.tool_host_url = "memory://tools".into();
    config.execution.health_interval_s = 1;
    config
}

/// A default token grant roomy enough for the happy paths.
pub fn roomy_budget() -> BudgetAmounts {
    BudgetAmounts::tokens(1_000_000)
}

/// Bundle of fakes wired into a lifecycle controller.
pub struct TestHarness {
    pub tool_host: Arc<ScriptedToolHost>,
    pub vault: Arc<MemoryVault>,
    pub embedding: Arc<CountingEmbedding>,
    pub controller: noesis::application::lifecycle::LifecycleController,
}

impl TestHarness {
    pub fn new(config: KernelConfig) -> Self {
        let tool_host = Arc::new(ScriptedToolHost::new());
        let vault = Arc::new(MemoryVault::new());
        let embedding = Arc::new(CountingEmbedding::new());
        let controller = noesis::application::lifecycle::LifecycleController::new(
            config,
            Arc::clone(&vault) as Arc<dyn VaultStore>,
            Arc::clone(&tool_host) as Arc<dyn ToolHost>,
            Arc::clone(&embedding) as Arc<dyn EmbeddingBackend>,
        );
        Self { tool_host, vault, embedding, controller }
    }
}
