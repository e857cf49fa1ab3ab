//! The OODA execution engine (T4).
//!
//! One cooperative task per agent runs Observe → Orient → Decide → Act
//! in a continuous cycle. Observe drains event channels without ever
//! blocking on tools; Orient interprets new events through the T1
//! primitives; Decide consults T3 for plans and runnable nodes; Act
//! dispatches nodes asynchronously and registers completion handles.
//! Each phase yields when its wall-clock budget elapses; pending work
//! re-enters the next cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant as StdInstant;

use rand::Rng;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::domain::errors::ErrorKind;
use crate::domain::models::config::KernelConfig;
use crate::domain::models::dag::NodeStatus;
use crate::domain::models::epoch::{DagOutcome, EpochSummary};
use crate::domain::models::event::{Observation, ObservationPayload};
use crate::domain::models::focus::{FocusItem, FocusKind};
use crate::domain::models::identity::IdentityContext;
use crate::domain::models::ids::{AgentId, DagId, NodeId, TraceId};
use crate::domain::models::outcome::{ExecutionResult, SimulationReport};
use crate::domain::models::world::{MacroObjective, WorldState};
use crate::domain::ports::tool_host::ToolHost;
use crate::services::assembler::{NodeRunOutcome, NodeRuntime};
use crate::services::cache::CacheHierarchy;
use crate::services::classify::Classifier;
use crate::services::curiosity::CuriosityEngine;
use crate::services::decompose::DecompositionEngine;
use crate::services::event_bus::{
    KernelEventBus, KernelEventCategory, KernelEventPayload, KernelEventSeverity,
};
use crate::services::extract::EntityExtractor;
use crate::services::filters::{CognitiveFilters, FilterOutcome};
use crate::services::guardrails::{GuardrailGate, GuardrailVerdict, ReflectionEngine};
use crate::services::planner::{CompiledPlan, PlanSynthesizer};

use super::budget::BudgetAuthority;
use super::parking::ParkingLot;
use super::working_memory::WorkingMemory;

/// What the lifecycle controller should do after one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Keep cycling.
    Continue,
    /// The macro-objective reported complete; close the epoch.
    ObjectiveComplete,
    /// Nothing runnable and the waiting queue holds everything; sleep
    /// until the given duration elapses or an external event arrives.
    DeepSleep { wake_after_ms: Option<u64> },
    /// Sustained tool-host failure; transition to panic.
    Panic,
}

struct Inflight {
    dag_id: DagId,
    handle: JoinHandle<()>,
}

/// Shared service handles the engine is built over.
pub struct EngineServices {
    pub tool_host: Arc<dyn ToolHost>,
    pub classifier: Arc<Classifier>,
    pub cache: Arc<CacheHierarchy>,
    pub bus: Arc<KernelEventBus>,
    pub budget: Arc<BudgetAuthority>,
}

/// The T4 engine. Exclusively owns its [`WorldState`] and
/// [`WorkingMemory`]; lower tiers only ever see snapshots.
pub struct OodaEngine {
    config: KernelConfig,
    identity: IdentityContext,
    world: WorldState,
    memory: WorkingMemory,
    services: EngineServices,

    decomposer: DecompositionEngine,
    curiosity: CuriosityEngine,
    synthesizer: PlanSynthesizer,
    gate: GuardrailGate,
    reflection: ReflectionEngine,
    extractor: EntityExtractor,
    filters: CognitiveFilters,

    events_tx: mpsc::Sender<Observation>,
    events_rx: mpsc::Receiver<Observation>,
    parking: ParkingLot,

    plans: HashMap<DagId, CompiledPlan>,
    traces: HashMap<DagId, TraceId>,
    predictions: HashMap<DagId, SimulationReport>,
    results: HashMap<DagId, Vec<ExecutionResult>>,
    inflight: HashMap<NodeId, Inflight>,
    attempts: HashMap<NodeId, u32>,
    retry_after: HashMap<NodeId, Instant>,
    continuations: HashMap<NodeId, String>,

    failure_streak: u32,
    dispatch_paused: bool,
    planning_refused: bool,
}

impl OodaEngine {
    pub fn new(config: KernelConfig, identity: IdentityContext, objective: String, services: EngineServices) -> Self {
        let agent_id = identity.agent_id;
        let (events_tx, events_rx) = mpsc::channel(1024);
        let memory = WorkingMemory::new(agent_id, objective.clone(), config.memory.clone());
        let world = WorldState::new(agent_id, MacroObjective::new(objective), config.memory.max_events);
        let planning = config.planning.clone();
        let parking = ParkingLot::new(config.execution.waiting_queue_cap);

        Self {
            identity,
            world,
            memory,
            services,
            decomposer: DecompositionEngine::new(),
            curiosity: CuriosityEngine::new(),
            synthesizer: PlanSynthesizer::default(),
            gate: GuardrailGate::new(planning.clone()),
            reflection: ReflectionEngine::new(),
            extractor: EntityExtractor::with_default_schema(),
            filters: CognitiveFilters::new(planning),
            events_tx,
            events_rx,
            parking,
            plans: HashMap::new(),
            traces: HashMap::new(),
            predictions: HashMap::new(),
            results: HashMap::new(),
            inflight: HashMap::new(),
            attempts: HashMap::new(),
            retry_after: HashMap::new(),
            continuations: HashMap::new(),
            failure_streak: 0,
            dispatch_paused: false,
            planning_refused: false,
            config,
        }
    }

    /// Sender for external event sources: user messages, webhooks,
    /// health probes.
    pub fn observation_sender(&self) -> mpsc::Sender<Observation> {
        self.events_tx.clone()
    }

    pub fn agent_id(&self) -> AgentId {
        self.world.agent_id
    }

    /// Pause or resume dispatching of new nodes (budget soft threshold).
    pub fn set_dispatch_paused(&mut self, paused: bool) {
        self.dispatch_paused = paused;
    }

    /// True once the macro-objective reports complete.
    pub fn objective_complete(&self) -> bool {
        self.world.objective.complete
    }

    // -------------------------------------------------------------------------
    // The cycle
    // -------------------------------------------------------------------------

    /// Run one full Observe → Orient → Decide → Act cycle.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        // The L1 flush must complete before Observe begins.
        self.services.cache.begin_cycle().await;
        let tick = self.world.advance_tick();

        let new_events = self.observe().await;
        self.orient(&new_events).await;
        let dispatches = self.decide().await;
        self.act(dispatches).await;

        self.memory
            .evict_stale_entries(Duration::from_secs(self.config.memory.entity_ttl_s))
            .await;

        self.services.bus.publish(
            KernelEventSeverity::Debug,
            KernelEventCategory::Execution,
            KernelEventPayload::PhaseCompleted { phase: "act".into(), tick },
        );

        self.cycle_outcome()
    }

    /// Observe: drain event sources and due wakeups. Never blocks on
    /// tools or models.
    async fn observe(&mut self) -> Vec<Observation> {
        let phase_deadline = StdInstant::now()
            + std::time::Duration::from_millis(self.config.execution.phase_budget_ms);
        let mut drained = Vec::new();

        // Due poll continuations become timer wakeups.
        for parked in self.parking.take_due(Instant::now()) {
            drained.push(Observation::new(ObservationPayload::TimerWake {
                continuation: parked.continuation.clone(),
            }));
            self.resume_parked(parked.dag_id, parked.node_id, parked.continuation).await;
        }

        while StdInstant::now() < phase_deadline {
            match self.events_rx.try_recv() {
                Ok(event) => {
                    self.handle_observation(&event).await;
                    drained.push(event);
                }
                Err(_) => break,
            }
        }

        for event in &drained {
            self.world.record_observation(event.clone());
            self.memory.push_event(event.clone()).await;
        }
        drained
    }

    async fn handle_observation(&mut self, event: &Observation) {
        match &event.payload {
            ObservationPayload::ToolCompleted { dag_id, node_id, result } => {
                self.on_node_result(*dag_id, *node_id, result.clone()).await;
            }
            ObservationPayload::ToolParked { dag_id, node_id, continuation, poll_after_ms } => {
                self.on_node_parked(*dag_id, *node_id, continuation.clone(), *poll_after_ms).await;
            }
            ObservationPayload::WebhookArrived { continuation, .. } => {
                if let Some(parked) = self.parking.resolve(continuation) {
                    self.resume_parked(parked.dag_id, parked.node_id, parked.continuation).await;
                }
            }
            ObservationPayload::HealthProbe { healthy } => {
                if *healthy {
                    self.failure_streak = 0;
                }
            }
            ObservationPayload::UserMessage { .. } | ObservationPayload::TimerWake { .. } => {}
        }
    }

    async fn on_node_result(&mut self, dag_id: DagId, node_id: NodeId, result: ExecutionResult) {
        self.inflight.remove(&node_id);

        let transient_failure = result
            .error
            .as_ref()
            .is_some_and(|e| e.kind == ErrorKind::TransientExternal);
        if result.is_success() {
            self.failure_streak = 0;
        } else if transient_failure {
            self.failure_streak += 1;
        }

        self.services.budget.track_budget(result.cost).await;
        self.services.bus.publish(
            KernelEventSeverity::Info,
            KernelEventCategory::Execution,
            KernelEventPayload::NodeFinished {
                dag_id,
                node_id,
                status: result.status.as_str().into(),
            },
        );

        let Some(plan) = self.plans.get_mut(&dag_id) else {
            return;
        };

        if result.is_success() {
            let _ = plan.dag.set_status(node_id, NodeStatus::Succeeded);
            self.memory.update_dag_state(dag_id, node_id, NodeStatus::Succeeded).await;
            self.continuations.remove(&node_id);
            self.results.entry(dag_id).or_default().push(result);
            self.check_dag_terminal(dag_id).await;
            return;
        }

        // A sustained tool-host outage is not the node's fault: preserve
        // its state for resumption after panic recovery instead of
        // burning its retry budget.
        if transient_failure && self.failure_streak >= self.config.execution.panic_failure_streak {
            let _ = plan.dag.set_status(node_id, NodeStatus::Pending);
            self.memory.update_dag_state(dag_id, node_id, NodeStatus::Pending).await;
            self.attempts.insert(node_id, 0);
            self.retry_after.remove(&node_id);
            return;
        }

        // Failure path: retry per policy, then final.
        let retryable = result.error.as_ref().is_some_and(|e| e.retryable);
        let policy = plan.dag.nodes.get(&node_id).map(|n| n.retry).unwrap_or_default();
        let attempt = *self.attempts.get(&node_id).unwrap_or(&1);

        if retryable && attempt < policy.max_attempts {
            let backoff = policy.backoff_ms(attempt - 1);
            let jitter = 1.0 + rand::thread_rng().gen_range(-policy.jitter..=policy.jitter);
            let delay = Duration::from_millis((backoff as f64 * jitter.max(0.0)) as u64);
            debug!(%node_id, attempt, ?delay, "scheduling node retry");

            let _ = plan.dag.set_status(node_id, NodeStatus::Pending);
            self.memory.update_dag_state(dag_id, node_id, NodeStatus::Pending).await;
            self.retry_after.insert(node_id, Instant::now() + delay);
            return;
        }

        let _ = plan.dag.set_status(node_id, NodeStatus::Failed);
        self.memory.update_dag_state(dag_id, node_id, NodeStatus::Failed).await;
        if let Some(envelope) = &result.error {
            self.memory
                .journal_append("node_failed", envelope.message.clone(), vec![])
                .await;
        }
        self.results.entry(dag_id).or_default().push(result);

        // Nodes stranded behind the failure are skipped, then reflection
        // decides whether the DAG-level failure stands.
        let stranded = self.plans.get(&dag_id).map(|p| p.dag.stranded_nodes()).unwrap_or_default();
        if let Some(plan) = self.plans.get_mut(&dag_id) {
            for stranded_node in stranded {
                let _ = plan.dag.set_status(stranded_node, NodeStatus::Skipped);
                self.memory.update_dag_state(dag_id, stranded_node, NodeStatus::Skipped).await;
            }
        }
        self.check_dag_terminal(dag_id).await;
    }

    async fn on_node_parked(
        &mut self,
        dag_id: DagId,
        node_id: NodeId,
        continuation: String,
        poll_after_ms: u64,
    ) {
        self.inflight.remove(&node_id);
        let parked = self.parking.park_poll(
            dag_id,
            node_id,
            continuation.clone(),
            Duration::from_millis(poll_after_ms),
        );
        if !parked {
            // Full waiting queue: leave the node pending so Decide can
            // re-dispatch once room frees up; the engine will report
            // deep-sleep pressure meanwhile.
            warn!(%dag_id, %node_id, "waiting queue full, continuation not parked");
            if let Some(plan) = self.plans.get_mut(&dag_id) {
                let _ = plan.dag.set_status(node_id, NodeStatus::Pending);
            }
            return;
        }

        self.continuations.insert(node_id, continuation.clone());
        if let Some(plan) = self.plans.get_mut(&dag_id) {
            let _ = plan.dag.set_status(node_id, NodeStatus::Parked);
        }
        self.memory.update_dag_state(dag_id, node_id, NodeStatus::Parked).await;
        self.services.bus.publish(
            KernelEventSeverity::Info,
            KernelEventCategory::Execution,
            KernelEventPayload::DagParked { dag_id, continuation },
        );
    }

    async fn resume_parked(&mut self, dag_id: DagId, node_id: NodeId, continuation: String) {
        self.continuations.insert(node_id, continuation);
        if let Some(plan) = self.plans.get_mut(&dag_id) {
            let _ = plan.dag.set_status(node_id, NodeStatus::Pending);
        }
        self.memory.update_dag_state(dag_id, node_id, NodeStatus::Pending).await;
        self.services.bus.publish(
            KernelEventSeverity::Info,
            KernelEventCategory::Execution,
            KernelEventPayload::DagResumed { dag_id },
        );
    }

    /// Orient: interpret new events through the T1 primitives and
    /// refresh working memory.
    async fn orient(&mut self, new_events: &[Observation]) {
        let phase_deadline = StdInstant::now()
            + std::time::Duration::from_millis(self.config.execution.phase_budget_ms);

        for event in new_events {
            if StdInstant::now() >= phase_deadline {
                break;
            }
            if let ObservationPayload::UserMessage { text } = &event.payload {
                let outcome = self.services.classifier.classify(text).await;
                if let Some(label) = outcome.label() {
                    self.memory
                        .add_focus(FocusItem::new(FocusKind::Fact, format!("message labeled {label}"), 4))
                        .await;
                }
                for entity in self.extractor.extract_entities(text) {
                    self.memory
                        .cache_entity(
                            entity.name.to_lowercase(),
                            entity.clone(),
                            Duration::from_secs(self.config.memory.entity_ttl_s),
                        )
                        .await;
                    self.world.upsert_entity(entity);
                }
            }
        }
    }

    /// Decide: ask T3 for a plan when none is active, otherwise select
    /// runnable nodes for dispatch.
    async fn decide(&mut self) -> Vec<(DagId, NodeId)> {
        if self.world.objective.complete {
            return Vec::new();
        }

        if self.world.open_dags.is_empty() && !self.planning_refused {
            self.plan_objective().await;
        }

        if self.dispatch_paused {
            return Vec::new();
        }
        // A panicking agent dispatches nothing but health checks.
        if self.failure_streak >= self.config.execution.panic_failure_streak {
            return Vec::new();
        }
        // The hard threshold stops new dispatches within the same cycle
        // that crossed it.
        if self.services.budget.check_budget_exhaustion().await
            == crate::domain::models::budget::BudgetStatus::HardExhausted
        {
            return Vec::new();
        }

        let now = Instant::now();
        let mut dispatches = Vec::new();
        for (&dag_id, plan) in &self.plans {
            if !self.world.open_dags.contains(&dag_id) {
                continue;
            }
            for node_id in plan.dag.runnable_nodes() {
                if self.inflight.contains_key(&node_id) {
                    continue;
                }
                if self.retry_after.get(&node_id).is_some_and(|at| *at > now) {
                    continue;
                }
                dispatches.push((dag_id, node_id));
            }
        }
        dispatches
    }

    async fn plan_objective(&mut self) {
        let snapshot = self.world.snapshot();

        // Plausibility gate before any planning effort.
        match self.filters.run_cognitive_filters(&snapshot, &[]) {
            FilterOutcome::Alert(alert) => {
                warn!(findings = ?alert.findings, "objective failed the sanity check");
                let detail = alert.findings.join("; ");
                self.memory
                    .record_decision(self.world.objective.text.clone(), format!("refused: {detail}"))
                    .await;
                self.memory.journal_append("sanity_alert", detail, vec![]).await;
                self.planning_refused = true;
                self.world.objective.complete = true;
                return;
            }
            FilterOutcome::Refined(_) => {}
        }

        let subtasks = match self.decomposer.decompose_goal(&snapshot) {
            Ok(tasks) => tasks,
            Err(err) => {
                self.memory
                    .record_decision(self.world.objective.text.clone(), format!("undecomposable: {err}"))
                    .await;
                self.planning_refused = true;
                self.world.objective.complete = true;
                return;
            }
        };
        self.world.task_tree = subtasks.clone();
        let explorations = self.curiosity.explore_gaps(&snapshot, &subtasks);

        let mut plan = match self.synthesizer.compile_plan(&subtasks, explorations.clone()) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(error = %err, "plan synthesis failed");
                self.memory
                    .record_decision(self.world.objective.text.clone(), format!("unplannable: {err}"))
                    .await;
                self.planning_refused = true;
                self.world.objective.complete = true;
                return;
            }
        };

        // Optional consensus: vote between the base plan and the
        // conservative serialized variant, weights from plausibility.
        if self.config.planning.consensus_variants > 1 {
            if let Ok(serialized) = self.synthesizer.compile_serialized(&subtasks, explorations) {
                let variants = vec![plan, serialized];
                let winner = self.gate.consensus_pick(&variants, &snapshot).unwrap_or(0);
                let mut variants = variants;
                plan = variants.swap_remove(winner);
            }
        }

        let (verdict, report) = self.gate.check(&plan, &snapshot, &self.identity);
        match verdict {
            GuardrailVerdict::Rejected { rationale } => {
                self.services.bus.publish(
                    KernelEventSeverity::Warning,
                    KernelEventCategory::Plan,
                    KernelEventPayload::PlanRejected { dag_id: plan.dag.id, rationale: rationale.clone() },
                );
                self.memory
                    .record_decision(self.world.objective.text.clone(), format!("plan rejected: {rationale}"))
                    .await;
                self.memory
                    .record_insight(self.reflection.reflect(&plan, &report, &[]))
                    .await;
                self.memory.journal_append("plan_rejected", rationale, vec![]).await;
                // Decomposition is deterministic; a replan of the same
                // objective reproduces the same rejection.
                self.planning_refused = true;
                self.world.objective.complete = true;
                return;
            }
            GuardrailVerdict::ApprovedWithPatch(patch) => {
                if let Err(err) = self.synthesizer.apply_patch(&mut plan, &patch) {
                    warn!(error = %err, "failed to apply safeguard patch");
                }
            }
            GuardrailVerdict::Approved => {}
        }

        let dag_id = plan.dag.id;
        info!(%dag_id, nodes = plan.dag.nodes.len(), "plan accepted");
        self.services.bus.publish(
            KernelEventSeverity::Info,
            KernelEventCategory::Plan,
            KernelEventPayload::PlanCompiled { dag_id, node_count: plan.dag.nodes.len() },
        );
        for node_id in plan.dag.nodes.keys() {
            self.attempts.insert(*node_id, 0);
        }
        self.traces.insert(dag_id, TraceId::new());
        self.predictions.insert(dag_id, report);
        self.world.open_dags.insert(dag_id);
        self.plans.insert(dag_id, plan);
    }

    /// Act: dispatch the selected nodes. Execution is asynchronous; the
    /// engine registers completion handles and moves on.
    async fn act(&mut self, dispatches: Vec<(DagId, NodeId)>) {
        for (dag_id, node_id) in dispatches {
            self.dispatch_node(dag_id, node_id).await;
        }
    }

    async fn dispatch_node(&mut self, dag_id: DagId, node_id: NodeId) {
        let Some(plan) = self.plans.get_mut(&dag_id) else {
            return;
        };
        let Some(callable) = plan.callables.get(&node_id).cloned() else {
            return;
        };
        let timeout_ms = plan
            .dag
            .nodes
            .get(&node_id)
            .map_or(30_000, |n| n.timeout_ms);

        let _ = plan.dag.set_status(node_id, NodeStatus::Running);
        self.memory.update_dag_state(dag_id, node_id, NodeStatus::Running).await;
        *self.attempts.entry(node_id).or_insert(0) += 1;
        self.retry_after.remove(&node_id);

        let input = self.node_input(dag_id, node_id);
        let runtime = NodeRuntime {
            tool_host: Arc::clone(&self.services.tool_host),
            classifier: Arc::clone(&self.services.classifier),
            cache: Arc::clone(&self.services.cache),
            trace_id: *self.traces.get(&dag_id).unwrap_or(&TraceId::new()),
        };
        let tx = self.events_tx.clone();

        self.services.bus.publish(
            KernelEventSeverity::Info,
            KernelEventCategory::Execution,
            KernelEventPayload::NodeDispatched { dag_id, node_id },
        );

        let handle = tokio::spawn(async move {
            let run = callable.run(input, &runtime);
            let payload = match tokio::time::timeout(Duration::from_millis(timeout_ms), run).await {
                Ok(NodeRunOutcome::Completed(result)) => {
                    ObservationPayload::ToolCompleted { dag_id, node_id, result }
                }
                Ok(NodeRunOutcome::Parked { continuation, poll_after_ms, .. }) => {
                    ObservationPayload::ToolParked { dag_id, node_id, continuation, poll_after_ms }
                }
                Err(_) => ObservationPayload::ToolCompleted {
                    dag_id,
                    node_id,
                    result: ExecutionResult::failed(
                        node_id,
                        crate::domain::errors::ErrorEnvelope::new(
                            ErrorKind::TransientExternal,
                            format!("dispatch timed out after {timeout_ms}ms"),
                        )
                        .for_node(node_id.0),
                        crate::domain::models::outcome::CostTelemetry {
                            wall_ms: timeout_ms,
                            ..Default::default()
                        },
                    ),
                },
            };
            let _ = tx.send(Observation::new(payload)).await;
        });
        self.inflight.insert(node_id, Inflight { dag_id, handle });
    }

    /// Assemble a node's input from its dependencies' outputs plus any
    /// pending continuation token.
    fn node_input(&self, dag_id: DagId, node_id: NodeId) -> Value {
        let mut merged = Map::new();
        if let (Some(plan), Some(results)) = (self.plans.get(&dag_id), self.results.get(&dag_id)) {
            for dep in plan.dag.dependencies(node_id) {
                if let Some(result) = results.iter().rev().find(|r| r.node_id == dep) {
                    match &result.payload {
                        Value::Object(map) => {
                            for (k, v) in map {
                                merged.insert(k.clone(), v.clone());
                            }
                        }
                        Value::Null => {}
                        other => {
                            merged.insert("input".to_string(), other.clone());
                        }
                    }
                }
            }
        }
        if let Some(continuation) = self.continuations.get(&node_id) {
            merged.insert("continuation".to_string(), Value::String(continuation.clone()));
        }
        if merged.is_empty() {
            Value::Null
        } else {
            Value::Object(merged)
        }
    }

    async fn check_dag_terminal(&mut self, dag_id: DagId) {
        let Some(plan) = self.plans.get(&dag_id) else {
            return;
        };
        if !plan.dag.is_terminal() {
            return;
        }

        let succeeded = plan.dag.succeeded();
        let statuses = &plan.dag.status;
        let count = |status: NodeStatus| statuses.values().filter(|&&s| s == status).count();

        let final_payload = self.results.get(&dag_id).and_then(|results| {
            let sorted = plan.dag.topological_sort().ok()?;
            sorted
                .iter()
                .rev()
                .find_map(|id| results.iter().rev().find(|r| r.node_id == *id && r.is_success()))
                .map(|r| r.payload.clone())
        });

        let outcome = DagOutcome {
            dag_id,
            succeeded,
            nodes_total: plan.dag.nodes.len(),
            nodes_succeeded: count(NodeStatus::Succeeded),
            nodes_failed: count(NodeStatus::Failed),
            nodes_skipped: count(NodeStatus::Skipped),
            final_payload: final_payload.clone(),
        };
        self.memory.record_dag_outcome(outcome).await;

        // Reflection compares prediction against reality.
        let predicted = self.predictions.remove(&dag_id).unwrap_or_else(|| {
            SimulationReport::approve("no prediction recorded", Vec::new())
        });
        let results = self.results.get(&dag_id).cloned().unwrap_or_default();
        let insight = self.reflection.reflect(plan, &predicted, &results);
        self.memory.record_insight(insight).await;

        // Commit-worthy decision for the epoch record.
        let decision = match (&final_payload, succeeded) {
            (Some(payload), true) => match payload.get("label").and_then(Value::as_str) {
                Some(label) => format!("chose label `{label}`"),
                None => format!("completed with payload digest {}", payload_digest(payload)),
            },
            _ => "dag failed".to_string(),
        };
        self.memory.record_decision(self.world.objective.text.clone(), decision).await;

        self.services.bus.publish(
            if succeeded { KernelEventSeverity::Info } else { KernelEventSeverity::Warning },
            KernelEventCategory::Execution,
            KernelEventPayload::DagCompleted { dag_id, succeeded },
        );

        self.world.open_dags.remove(&dag_id);
        self.parking.forget_dag(dag_id);
        if self.world.open_dags.is_empty() {
            self.world.objective.complete = true;
        }
    }

    fn cycle_outcome(&self) -> CycleOutcome {
        if self.failure_streak >= self.config.execution.panic_failure_streak {
            return CycleOutcome::Panic;
        }
        if self.world.objective.complete && self.inflight.is_empty() {
            return CycleOutcome::ObjectiveComplete;
        }

        let now = Instant::now();
        let has_runnable = self
            .plans
            .iter()
            .filter(|(id, _)| self.world.open_dags.contains(id))
            .any(|(_, plan)| {
                plan.dag.runnable_nodes().iter().any(|n| {
                    !self.inflight.contains_key(n)
                        && self.retry_after.get(n).is_none_or(|at| *at <= now)
                })
            });
        if !has_runnable && self.inflight.is_empty() && !self.parking.is_empty() {
            let wake_after_ms = self.parking.next_deadline().map(|at| {
                at.saturating_duration_since(Instant::now()).as_millis() as u64
            });
            return CycleOutcome::DeepSleep { wake_after_ms };
        }
        // Nothing to do until a scheduled retry comes due: sleep, don't spin.
        if self.inflight.is_empty() && !self.retry_after.is_empty() && !has_runnable {
            let wake_after_ms = self
                .retry_after
                .values()
                .min()
                .map(|at| at.saturating_duration_since(Instant::now()).as_millis() as u64);
            return CycleOutcome::DeepSleep { wake_after_ms };
        }
        CycleOutcome::Continue
    }

    // -------------------------------------------------------------------------
    // Lifecycle hooks
    // -------------------------------------------------------------------------

    /// Cancel every outstanding dispatch: abort handles, wait up to the
    /// grace window, and mark unresolved nodes skipped.
    pub async fn cancel_all(&mut self) {
        let grace = Duration::from_millis(self.config.execution.cancel_grace_ms);
        let deadline = Instant::now() + grace;

        for inflight in self.inflight.values() {
            inflight.handle.abort();
        }
        while !self.inflight.is_empty() && Instant::now() < deadline {
            // Give dispatches a chance to acknowledge: either a completion
            // event arrives, or the aborted task winds down silently.
            match tokio::time::timeout(Duration::from_millis(10), self.events_rx.recv()).await {
                Ok(Some(event)) => {
                    self.handle_observation(&event).await;
                    self.memory.push_event(event).await;
                }
                _ => {
                    let aborted: Vec<(NodeId, DagId)> = self
                        .inflight
                        .iter()
                        .filter(|(_, i)| i.handle.is_finished())
                        .map(|(n, i)| (*n, i.dag_id))
                        .collect();
                    for (node_id, dag_id) in aborted {
                        self.inflight.remove(&node_id);
                        self.mark_skipped(dag_id, node_id).await;
                    }
                }
            }
        }

        // Grace expired: whatever did not acknowledge is skipped.
        let leftovers: Vec<(NodeId, DagId)> =
            self.inflight.iter().map(|(n, i)| (*n, i.dag_id)).collect();
        self.inflight.clear();
        for (node_id, dag_id) in leftovers {
            self.mark_skipped(dag_id, node_id).await;
        }
    }

    async fn mark_skipped(&mut self, dag_id: DagId, node_id: NodeId) {
        if let Some(plan) = self.plans.get_mut(&dag_id) {
            let _ = plan.dag.set_status(node_id, NodeStatus::Skipped);
        }
        self.memory.update_dag_state(dag_id, node_id, NodeStatus::Skipped).await;
    }

    /// Flush working memory into the epoch summary.
    pub async fn flush_summary(&mut self, budget_exhausted: bool) -> EpochSummary {
        let spent = self.services.budget.spent().await;
        self.memory.flush_to_summarizer(spent, budget_exhausted).await
    }

    /// Close every open DAG without finishing it: remaining nodes are
    /// skipped, and (unless fast-abandon is configured) each DAG flushes
    /// through reflection so the epoch records what was in flight.
    pub async fn abandon_open_dags(&mut self, reflect: bool) {
        let open: Vec<DagId> = self.world.open_dags.iter().copied().collect();
        for dag_id in open {
            let pending: Vec<NodeId> = self
                .plans
                .get(&dag_id)
                .map(|plan| {
                    plan.dag
                        .status
                        .iter()
                        .filter(|(_, s)| !s.is_terminal())
                        .map(|(id, _)| *id)
                        .collect()
                })
                .unwrap_or_default();
            if let Some(plan) = self.plans.get_mut(&dag_id) {
                for node_id in &pending {
                    let _ = plan.dag.set_status(*node_id, NodeStatus::Skipped);
                }
            }
            for node_id in pending {
                self.memory.update_dag_state(dag_id, node_id, NodeStatus::Skipped).await;
            }

            if reflect {
                if let Some(plan) = self.plans.get(&dag_id) {
                    let predicted = self.predictions.remove(&dag_id).unwrap_or_else(|| {
                        SimulationReport::approve("no prediction recorded", Vec::new())
                    });
                    let results = self.results.get(&dag_id).cloned().unwrap_or_default();
                    let insight = self.reflection.reflect(plan, &predicted, &results);
                    self.memory.record_insight(insight).await;
                }
            }
            self.world.open_dags.remove(&dag_id);
            self.parking.forget_dag(dag_id);
        }
    }

    /// Swap the macro-objective (priority override).
    pub fn swap_objective(&mut self, objective: String) {
        self.world.objective = MacroObjective::new(objective);
        self.planning_refused = false;
        self.world.open_dags.clear();
        self.plans.clear();
        self.predictions.clear();
        self.results.clear();
    }

    /// True while any node is dispatched and unresolved.
    pub fn has_inflight(&self) -> bool {
        !self.inflight.is_empty()
    }
}

fn payload_digest(payload: &Value) -> String {
    crate::infrastructure::hashing::generate_cache_key("payload_digest", payload).0[..12].to_string()
}
