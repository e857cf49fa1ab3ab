//! Node assembler (T3): the JIT factory behind the plan synthesizer.
//!
//! Wraps each resolved skill with input-schema validation, telemetry
//! injection, output-schema validation, and the uniform error envelope.
//! Assembled nodes never raise: every failure path returns a structured
//! envelope inside the result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, info_span, Instrument};

use crate::domain::errors::{ErrorEnvelope, ErrorKind, KernelError, KernelResult};
use crate::domain::models::dag::PlanNode;
use crate::domain::models::ids::TraceId;
use crate::domain::models::outcome::{CostTelemetry, ExecutionResult};
use crate::domain::models::task::SkillTag;
use crate::domain::ports::tool_host::{ToolCall, ToolHost, ToolStatus};
use crate::infrastructure::hashing::generate_cache_key;

use super::cache::{CacheDataKind, CacheHierarchy};
use super::classify::{Classifier, ClassifierOutcome};
use super::extract::ScoringPrimitives;
use super::validate::Validator;

/// What a skill tag resolves to.
#[derive(Debug, Clone)]
pub enum SkillBinding {
    /// An external tool reached through the host; deterministic tools
    /// cache their outputs at L3, others at L2.
    Tool { tool_id: String, deterministic: bool },
    /// The in-process T1 classifier.
    Classify,
}

/// Registry mapping skill tags to bindings.
pub struct SkillRegistry {
    bindings: HashMap<SkillTag, SkillBinding>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self { bindings: HashMap::new() }
    }

    /// The built-in skill set. Tool ids mirror the skill tags; the tool
    /// host treats them as opaque strings.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.bind("text.classify", SkillBinding::Classify);
        for (skill, deterministic) in [
            ("web.search", false),
            ("web.scrape", false),
            ("text.summarize", false),
            ("rag.query", false),
            ("fs.scan", false),
            ("fs.delete", false),
            ("fs.backup", false),
            ("job.poll", false),
            ("numeric.eval", true),
        ] {
            registry.bind(
                skill,
                SkillBinding::Tool { tool_id: skill.to_string(), deterministic },
            );
        }
        registry
    }

    pub fn bind(&mut self, skill: impl Into<SkillTag>, binding: SkillBinding) {
        self.bindings.insert(skill.into(), binding);
    }

    pub fn resolve(&self, skill: &SkillTag) -> Option<&SkillBinding> {
        self.bindings.get(skill)
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Shared handles an assembled node needs at run time.
pub struct NodeRuntime {
    pub tool_host: Arc<dyn ToolHost>,
    pub classifier: Arc<Classifier>,
    pub cache: Arc<CacheHierarchy>,
    pub trace_id: TraceId,
}

/// Outcome of running one assembled node.
#[derive(Debug, Clone)]
pub enum NodeRunOutcome {
    Completed(ExecutionResult),
    /// The tool accepted the work for later completion; the engine must
    /// park the owning DAG.
    Parked { continuation: String, poll_after_ms: u64, cost: CostTelemetry },
}

/// One compiled callable: `(state_in) -> state_out_or_error`.
#[derive(Debug)]
pub struct AssembledNode {
    node: PlanNode,
    binding: SkillBinding,
}

impl AssembledNode {
    pub fn descriptor(&self) -> &PlanNode {
        &self.node
    }

    /// Run the node against `input`. Never panics and never returns a
    /// bare error: failures come back as envelopes in the result.
    pub async fn run(&self, input: Value, runtime: &NodeRuntime) -> NodeRunOutcome {
        let span = info_span!(
            "node",
            node_id = %self.node.id,
            skill = %self.node.skill,
            trace_id = %runtime.trace_id,
        );
        self.run_inner(input, runtime).instrument(span).await
    }

    async fn run_inner(&self, input: Value, runtime: &NodeRuntime) -> NodeRunOutcome {
        let started = Instant::now();

        // Gate the input before any external effect.
        let input = match Validator::validate(input, &self.node.input_schema) {
            Ok(value) => value,
            Err(envelope) => {
                return self.fail(envelope, started);
            }
        };

        let bound_args = merge_args(&self.node.args, &input);

        let outcome = match &self.binding {
            SkillBinding::Classify => self.run_classify(&bound_args, runtime).await,
            SkillBinding::Tool { tool_id, deterministic } => {
                self.run_tool(tool_id, *deterministic, bound_args, runtime, started).await
            }
        };

        match outcome {
            NodeRunOutcome::Completed(result) if result.is_success() => {
                // Gate the output as well.
                match Validator::validate(result.payload.clone(), &self.node.output_schema) {
                    Ok(payload) => NodeRunOutcome::Completed(ExecutionResult {
                        payload,
                        ..result
                    }),
                    Err(envelope) => self.fail(envelope, started),
                }
            }
            other => other,
        }
    }

    async fn run_classify(&self, args: &Value, runtime: &NodeRuntime) -> NodeRunOutcome {
        let started = Instant::now();
        let text = args
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if text.is_empty() {
            return self.fail(
                ErrorEnvelope::new(ErrorKind::Input, "classify node requires a `text` argument")
                    .for_node(self.node.id.0),
                started,
            );
        }

        let outcome = runtime.classifier.classify(&text).await;
        let urgency = ScoringPrimitives::score_urgency(&text);
        let payload = match outcome {
            ClassifierOutcome::Classified(result) => serde_json::json!({
                "label": result.label,
                "confidence": result.confidence,
                "urgency": urgency,
            }),
            ClassifierOutcome::Fallback { best_label, best_confidence } => serde_json::json!({
                "label": "fallback",
                "nearest": best_label,
                "confidence": best_confidence,
                "urgency": urgency,
            }),
        };

        let cost = CostTelemetry {
            tokens: text.split_whitespace().count() as u64,
            wall_ms: started.elapsed().as_millis() as u64,
            bytes: text.len() as u64,
        };
        NodeRunOutcome::Completed(ExecutionResult::succeeded(self.node.id, payload, cost))
    }

    async fn run_tool(
        &self,
        tool_id: &str,
        deterministic: bool,
        args: Value,
        runtime: &NodeRuntime,
        started: Instant,
    ) -> NodeRunOutcome {
        let cache_key = generate_cache_key(
            "tool_output",
            &serde_json::json!({ "tool_id": tool_id, "args": args }),
        );
        if deterministic {
            if let Some(cached) = runtime.cache.read_cache(&cache_key, None).await {
                debug!(tool_id, "deterministic tool output served from cache");
                return NodeRunOutcome::Completed(ExecutionResult::succeeded(
                    self.node.id,
                    cached,
                    CostTelemetry::zero(),
                ));
            }
        }

        let call = ToolCall {
            tool_id: tool_id.to_string(),
            args,
            trace_id: runtime.trace_id,
            timeout_ms: self.node.timeout_ms,
        };

        match runtime.tool_host.invoke(call).await {
            Ok(response) => {
                let mut cost = response.cost;
                cost.wall_ms = cost.wall_ms.max(started.elapsed().as_millis() as u64);
                match response.status {
                    ToolStatus::Ok => {
                        runtime
                            .cache
                            .write_cache(
                                cache_key,
                                response.payload.clone(),
                                CacheDataKind::ToolOutput { deterministic },
                            )
                            .await;
                        NodeRunOutcome::Completed(ExecutionResult::succeeded(
                            self.node.id,
                            response.payload,
                            cost,
                        ))
                    }
                    ToolStatus::Pending { continuation, poll_after_ms } => {
                        NodeRunOutcome::Parked { continuation, poll_after_ms, cost }
                    }
                    ToolStatus::Timeout => self.fail_with_cost(
                        ErrorEnvelope::new(
                            ErrorKind::TransientExternal,
                            format!("tool `{tool_id}` timed out after {}ms", self.node.timeout_ms),
                        )
                        .for_node(self.node.id.0),
                        cost,
                    ),
                    ToolStatus::Error { code, message } => {
                        let kind = if code == 429 || code >= 500 {
                            ErrorKind::TransientExternal
                        } else {
                            ErrorKind::PermanentExternal
                        };
                        self.fail_with_cost(
                            ErrorEnvelope::new(kind, format!("tool `{tool_id}` failed ({code}): {message}"))
                                .for_node(self.node.id.0),
                            cost,
                        )
                    }
                }
            }
            Err(err) => self.fail_with_cost(
                ErrorEnvelope::from_kernel_error(&err).for_node(self.node.id.0),
                CostTelemetry { wall_ms: started.elapsed().as_millis() as u64, ..CostTelemetry::zero() },
            ),
        }
    }

    fn fail(&self, envelope: ErrorEnvelope, started: Instant) -> NodeRunOutcome {
        self.fail_with_cost(
            envelope,
            CostTelemetry { wall_ms: started.elapsed().as_millis() as u64, ..CostTelemetry::zero() },
        )
    }

    fn fail_with_cost(&self, envelope: ErrorEnvelope, cost: CostTelemetry) -> NodeRunOutcome {
        NodeRunOutcome::Completed(ExecutionResult::failed(self.node.id, envelope, cost))
    }
}

/// Merge synthesis-time args with the incoming state; the state wins on
/// key collisions.
fn merge_args(bound: &Value, input: &Value) -> Value {
    match (bound, input) {
        (Value::Object(bound_map), Value::Object(input_map)) => {
            let mut merged: Map<String, Value> = bound_map.clone();
            for (k, v) in input_map {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        (Value::Null, other) => other.clone(),
        (bound, Value::Null) => bound.clone(),
        (_, other) => other.clone(),
    }
}

/// The factory itself.
pub struct NodeAssembler {
    registry: SkillRegistry,
}

impl NodeAssembler {
    pub fn new(registry: SkillRegistry) -> Self {
        Self { registry }
    }

    /// Resolve and wrap a node descriptor. Unknown skills are a
    /// synthesis-time error.
    pub fn assemble(&self, node: &PlanNode) -> KernelResult<AssembledNode> {
        let binding = self
            .registry
            .resolve(&node.skill)
            .cloned()
            .ok_or_else(|| KernelError::UnknownSkill(node.skill.to_string()))?;
        Ok(AssembledNode { node: node.clone(), binding })
    }
}

impl Default for NodeAssembler {
    fn default() -> Self {
        Self::new(SkillRegistry::with_defaults())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::{CacheConfig, PlanningConfig};
    use crate::domain::models::schema::ValueSchema;
    use crate::domain::models::task::SubTask;
    use crate::domain::ports::embedding::NullEmbedding;
    use crate::domain::ports::tool_host::ToolResponse;
    use crate::services::classify::ClassProfile;
    use crate::services::embedder::CachedEmbedder;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedHost {
        calls: AtomicU32,
        response: ToolResponse,
    }

    #[async_trait]
    impl ToolHost for ScriptedHost {
        async fn invoke(&self, _call: ToolCall) -> KernelResult<ToolResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }

        async fn health(&self) -> KernelResult<()> {
            Ok(())
        }
    }

    fn runtime(host: Arc<ScriptedHost>) -> NodeRuntime {
        let cache = Arc::new(CacheHierarchy::new(&CacheConfig::default()));
        let embedder = Arc::new(CachedEmbedder::new(
            Arc::new(NullEmbedding::default()),
            Arc::clone(&cache),
        ));
        NodeRuntime {
            tool_host: host,
            classifier: Arc::new(Classifier::new(
                ClassProfile::default_set(),
                PlanningConfig::default(),
                embedder,
                Arc::clone(&cache),
            )),
            cache,
            trace_id: TraceId::new(),
        }
    }

    fn assemble(skill: &str) -> AssembledNode {
        let task = SubTask::new("test node", skill);
        NodeAssembler::default().assemble(&PlanNode::from_subtask(&task)).unwrap()
    }

    #[tokio::test]
    async fn unknown_skill_is_a_synthesis_error() {
        let task = SubTask::new("mystery", "no.such.skill");
        let err = NodeAssembler::default()
            .assemble(&PlanNode::from_subtask(&task))
            .unwrap_err();
        assert!(matches!(err, KernelError::UnknownSkill(_)));
    }

    #[tokio::test]
    async fn classify_node_produces_label_payload() {
        let host = Arc::new(ScriptedHost {
            calls: AtomicU32::new(0),
            response: ToolResponse::ok(json!({}), CostTelemetry::zero()),
        });
        let runtime = runtime(host);
        let node = assemble("text.classify");

        let outcome = node.run(json!({"text": "urgent reboot required"}), &runtime).await;
        match outcome {
            NodeRunOutcome::Completed(result) => {
                assert!(result.is_success());
                assert_eq!(result.payload["label"], "imperative/urgent");
                assert!(result.payload["urgency"].as_f64().unwrap() >= 0.8);
            }
            NodeRunOutcome::Parked { .. } => panic!("classify cannot park"),
        }
    }

    #[tokio::test]
    async fn input_validation_failure_is_an_envelope_not_a_panic() {
        let host = Arc::new(ScriptedHost {
            calls: AtomicU32::new(0),
            response: ToolResponse::ok(json!({}), CostTelemetry::zero()),
        });
        let runtime = runtime(host.clone());

        let mut task = SubTask::new("strict node", "web.search");
        task.input_schema = ValueSchema::record(
            [("query".to_string(), ValueSchema::text())],
            vec!["query".to_string()],
        );
        let node = NodeAssembler::default().assemble(&PlanNode::from_subtask(&task)).unwrap();

        let outcome = node.run(json!({"wrong": 1}), &runtime).await;
        match outcome {
            NodeRunOutcome::Completed(result) => {
                assert!(!result.is_success());
                let envelope = result.error.unwrap();
                assert_eq!(envelope.kind, ErrorKind::Input);
                // The tool must never have been reached.
                assert_eq!(host.calls.load(Ordering::SeqCst), 0);
            }
            NodeRunOutcome::Parked { .. } => panic!("unexpected park"),
        }
    }

    #[tokio::test]
    async fn pending_tool_response_parks() {
        let host = Arc::new(ScriptedHost {
            calls: AtomicU32::new(0),
            response: ToolResponse {
                status: ToolStatus::Pending { continuation: "J123".into(), poll_after_ms: 5_000 },
                payload: Value::Null,
                cost: CostTelemetry::zero(),
            },
        });
        let runtime = runtime(host);
        let node = assemble("job.poll");

        let outcome = node.run(json!({"job_id": "J123"}), &runtime).await;
        match outcome {
            NodeRunOutcome::Parked { continuation, poll_after_ms, .. } => {
                assert_eq!(continuation, "J123");
                assert_eq!(poll_after_ms, 5_000);
            }
            NodeRunOutcome::Completed(_) => panic!("expected park"),
        }
    }

    #[tokio::test]
    async fn deterministic_tool_output_is_cached() {
        let host = Arc::new(ScriptedHost {
            calls: AtomicU32::new(0),
            response: ToolResponse::ok(json!({"value": 42}), CostTelemetry::tokens(10)),
        });
        let runtime = runtime(host.clone());
        let node = assemble("numeric.eval");

        let first = node.run(json!({"expr": "6*7"}), &runtime).await;
        let second = node.run(json!({"expr": "6*7"}), &runtime).await;
        assert!(matches!(first, NodeRunOutcome::Completed(ref r) if r.is_success()));
        match second {
            NodeRunOutcome::Completed(result) => {
                assert_eq!(result.payload["value"], 42);
                // Served from cache: the host saw exactly one invocation.
                assert_eq!(host.calls.load(Ordering::SeqCst), 1);
                assert_eq!(result.cost.tokens, 0);
            }
            NodeRunOutcome::Parked { .. } => panic!("unexpected park"),
        }
    }

    #[tokio::test]
    async fn host_timeout_becomes_transient_envelope() {
        let host = Arc::new(ScriptedHost {
            calls: AtomicU32::new(0),
            response: ToolResponse::timeout(),
        });
        let runtime = runtime(host);
        let node = assemble("web.search");

        let outcome = node.run(json!({"query": "anything"}), &runtime).await;
        match outcome {
            NodeRunOutcome::Completed(result) => {
                let envelope = result.error.unwrap();
                assert_eq!(envelope.kind, ErrorKind::TransientExternal);
                assert!(envelope.retryable);
            }
            NodeRunOutcome::Parked { .. } => panic!("unexpected park"),
        }
    }
}
