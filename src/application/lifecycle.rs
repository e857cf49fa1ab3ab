//! Lifecycle and ego controller (T5).
//!
//! Owns the agent state machine:
//!
//! ```text
//!   [genesis] → [active] ⇄ [parked] ⇄ [panic] → [terminating] → [final]
//!                    │                               ↑
//!                    └────── terminate signal ───────┘
//! ```
//!
//! Genesis registers the agent in the Vault, loads its cognitive
//! profile, and constructs the immutable identity. Epoch close flushes
//! working memory into the epoch summary and commits it — the only
//! point at which working memory becomes durable.

use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{info, info_span, warn, Instrument};

use crate::domain::errors::KernelResult;
use crate::domain::models::budget::{BudgetLimits, BudgetStatus};
use crate::domain::models::config::KernelConfig;
use crate::domain::models::epoch::EpochSummary;
use crate::domain::models::event::{
    InterruptKind, InterruptSignal, Observation, ObservationPayload, SpawnRequest,
};
use crate::domain::models::identity::IdentityContext;
use crate::domain::ports::embedding::EmbeddingBackend;
use crate::domain::ports::tool_host::ToolHost;
use crate::domain::ports::vault::VaultStore;
use crate::infrastructure::hashing::canonical_json_bytes;
use crate::services::cache::CacheHierarchy;
use crate::services::classify::{ClassProfile, Classifier};
use crate::services::embedder::CachedEmbedder;
use crate::services::event_bus::{
    KernelEventBus, KernelEventCategory, KernelEventPayload, KernelEventSeverity,
};

use super::budget::BudgetAuthority;
use super::interrupts::InterruptChannel;
use super::ooda::{CycleOutcome, EngineServices, OodaEngine};

/// Agent lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Genesis,
    Active,
    Parked,
    Panic,
    Terminating,
    Final,
}

impl AgentState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Genesis => "genesis",
            Self::Active => "active",
            Self::Parked => "parked",
            Self::Panic => "panic",
            Self::Terminating => "terminating",
            Self::Final => "final",
        }
    }
}

/// The durable outcome of one epoch.
pub struct EpochOutcome {
    pub final_state: AgentState,
    pub summary: EpochSummary,
    /// Vault id the summary was committed under.
    pub vault_id: String,
    pub interrupted: bool,
}

/// The T5 controller.
pub struct LifecycleController {
    config: KernelConfig,
    vault: Arc<dyn VaultStore>,
    tool_host: Arc<dyn ToolHost>,
    embedding: Arc<dyn EmbeddingBackend>,
    cache: Arc<CacheHierarchy>,
    state: AgentState,
    /// Set by an explicit pause signal; distinguishes operator pause
    /// from deep-sleep parking, which auto-wakes.
    paused_by_signal: bool,
}

impl LifecycleController {
    pub fn new(
        config: KernelConfig,
        vault: Arc<dyn VaultStore>,
        tool_host: Arc<dyn ToolHost>,
        embedding: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        let cache = Arc::new(CacheHierarchy::new(&config.cache));
        Self {
            config,
            vault,
            tool_host,
            embedding,
            cache,
            state: AgentState::Genesis,
            paused_by_signal: false,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// The process-shared cache hierarchy, exposed so the hardware
    /// monitor's eviction hook can be wired to it.
    pub fn cache(&self) -> Arc<CacheHierarchy> {
        Arc::clone(&self.cache)
    }

    /// Run one full agent lifecycle: genesis through final.
    pub async fn run_lifecycle(
        &mut self,
        spawn: SpawnRequest,
        mut interrupts: InterruptChannel,
    ) -> KernelResult<EpochOutcome> {
        let span = info_span!("agent", agent_id = %spawn.agent_id, profile = %spawn.profile_id);
        self.run_inner(spawn, &mut interrupts).instrument(span).await
    }

    async fn run_inner(
        &mut self,
        spawn: SpawnRequest,
        interrupts: &mut InterruptChannel,
    ) -> KernelResult<EpochOutcome> {
        // ---- Genesis -------------------------------------------------------
        // A controller can host successive epochs; each spawn restarts the
        // state machine while the shared cache hierarchy persists.
        self.state = AgentState::Genesis;
        self.paused_by_signal = false;
        let bus = Arc::new(KernelEventBus::new(spawn.agent_id, 256));
        self.vault.register_agent(spawn.agent_id, &spawn.profile_id).await?;
        let persona = self
            .vault
            .get("profiles", &spawn.profile_id)
            .await?
            .unwrap_or_default();
        let identity = IdentityContext::new(spawn.agent_id, spawn.profile_id.clone())
            .with_persona(persona);

        let limits = BudgetLimits {
            grant: spawn.budget,
            soft_threshold_pct: self.config.budget.soft_threshold_pct,
            weights: self.config.budget.weights,
        };
        let budget = Arc::new(BudgetAuthority::new(limits, Arc::clone(&bus)));

        let embedder = Arc::new(CachedEmbedder::new(
            Arc::clone(&self.embedding),
            Arc::clone(&self.cache),
        ));
        let classifier = Arc::new(Classifier::new(
            ClassProfile::default_set(),
            self.config.planning.clone(),
            embedder,
            Arc::clone(&self.cache),
        ));

        let mut engine = OodaEngine::new(
            self.config.clone(),
            identity,
            spawn.macro_objective.clone(),
            EngineServices {
                tool_host: Arc::clone(&self.tool_host),
                classifier,
                cache: Arc::clone(&self.cache),
                bus: Arc::clone(&bus),
                budget: Arc::clone(&budget),
            },
        );

        self.transition(&bus, AgentState::Active);
        info!(objective = %spawn.macro_objective, "agent activated");

        let mut exhausted = false;
        let mut interrupted = false;
        let mut wake_after: Option<u64> = None;

        // ---- Run -----------------------------------------------------------
        while self.state != AgentState::Terminating {
            for signal in interrupts.drain() {
                self.handle_interrupt(&signal, &mut engine, &bus, &mut interrupted).await;
            }

            match self.state {
                AgentState::Active => {
                    let outcome = engine.run_cycle().await;

                    match budget.check_budget_exhaustion().await {
                        BudgetStatus::HardExhausted => {
                            exhausted = true;
                            self.transition(&bus, AgentState::Terminating);
                            continue;
                        }
                        BudgetStatus::SoftExceeded => {
                            // Park non-critical work; the grant request
                            // travels on the bus for the boundary tier.
                            engine.set_dispatch_paused(true);
                        }
                        BudgetStatus::Ok => {
                            engine.set_dispatch_paused(false);
                        }
                    }

                    match outcome {
                        CycleOutcome::ObjectiveComplete => {
                            self.transition(&bus, AgentState::Terminating);
                        }
                        CycleOutcome::DeepSleep { wake_after_ms } => {
                            wake_after = wake_after_ms;
                            self.transition(&bus, AgentState::Parked);
                        }
                        CycleOutcome::Panic => {
                            self.transition(&bus, AgentState::Panic);
                        }
                        CycleOutcome::Continue => {
                            // Yield briefly so dispatched tasks make progress
                            // instead of the loop spinning between cycles.
                            sleep(Duration::from_millis(1)).await;
                        }
                    }
                }
                AgentState::Parked if self.paused_by_signal => {
                    // An operator pause holds until resume or terminate.
                    if let Some(signal) = interrupts.recv().await {
                        self.handle_interrupt(&signal, &mut engine, &bus, &mut interrupted).await;
                    } else {
                        break;
                    }
                }
                AgentState::Parked => {
                    let nap = Duration::from_millis(wake_after.take().unwrap_or(250).clamp(10, 60_000));
                    tokio::select! {
                        signal = interrupts.recv() => {
                            if let Some(signal) = signal {
                                self.handle_interrupt(&signal, &mut engine, &bus, &mut interrupted).await;
                            }
                        }
                        () = sleep(nap) => {
                            self.transition(&bus, AgentState::Active);
                        }
                    }
                }
                AgentState::Panic => {
                    // A panicked agent keeps its heartbeat and its ears.
                    bus.publish(
                        KernelEventSeverity::Warning,
                        KernelEventCategory::Lifecycle,
                        KernelEventPayload::Heartbeat { state: "panic".into(), tick: 0 },
                    );
                    let interval = Duration::from_secs(self.config.execution.health_interval_s.max(1));
                    tokio::select! {
                        signal = interrupts.recv() => {
                            if let Some(signal) = signal {
                                self.handle_interrupt(&signal, &mut engine, &bus, &mut interrupted).await;
                            }
                        }
                        () = sleep(interval) => {
                            if self.tool_host.health().await.is_ok() {
                                let _ = engine
                                    .observation_sender()
                                    .send(Observation::new(ObservationPayload::HealthProbe { healthy: true }))
                                    .await;
                                bus.publish(
                                    KernelEventSeverity::Info,
                                    KernelEventCategory::Lifecycle,
                                    KernelEventPayload::PanicRecovered,
                                );
                                self.transition(&bus, AgentState::Active);
                            }
                        }
                    }
                }
                AgentState::Genesis | AgentState::Terminating | AgentState::Final => break,
            }
        }

        // ---- Epoch close ---------------------------------------------------
        engine.cancel_all().await;
        let summary = engine.flush_summary(exhausted).await;
        let vault_id = summary.epoch_id.to_string();
        let bytes = canonical_json_bytes(&serde_json::to_value(&summary)?);
        self.vault.put("epochs", &vault_id, bytes).await?;

        bus.publish(
            KernelEventSeverity::Info,
            KernelEventCategory::Lifecycle,
            KernelEventPayload::EpochCommitted {
                vault_id: vault_id.clone(),
                budget_exhausted: exhausted,
            },
        );
        self.transition(&bus, AgentState::Final);
        info!(%vault_id, exhausted, "epoch committed");

        Ok(EpochOutcome { final_state: self.state, summary, vault_id, interrupted })
    }

    /// Process one interrupt signal. Kill is non-negotiable.
    async fn handle_interrupt(
        &mut self,
        signal: &InterruptSignal,
        engine: &mut OodaEngine,
        bus: &Arc<KernelEventBus>,
        interrupted: &mut bool,
    ) {
        let kind_label = match &signal.kind {
            InterruptKind::Pause => "pause",
            InterruptKind::Resume => "resume",
            InterruptKind::PriorityOverride { .. } => "priority_override",
            InterruptKind::Terminate => "terminate",
        };
        bus.publish(
            KernelEventSeverity::Info,
            KernelEventCategory::Interrupt,
            KernelEventPayload::InterruptReceived { kind: kind_label.into() },
        );

        match &signal.kind {
            InterruptKind::Pause => {
                self.paused_by_signal = true;
                if self.state == AgentState::Active {
                    self.transition(bus, AgentState::Parked);
                }
            }
            InterruptKind::Resume => {
                self.paused_by_signal = false;
                if self.state == AgentState::Parked {
                    self.transition(bus, AgentState::Active);
                }
            }
            InterruptKind::PriorityOverride { objective } => {
                warn!(new_objective = %objective, "priority override received");
                self.paused_by_signal = false;
                engine.cancel_all().await;
                engine
                    .abandon_open_dags(!self.config.interrupts.fast_abandon)
                    .await;
                engine.swap_objective(objective.clone());
                if self.state == AgentState::Parked {
                    self.transition(bus, AgentState::Active);
                }
            }
            InterruptKind::Terminate => {
                *interrupted = true;
                self.transition(bus, AgentState::Terminating);
            }
        }
    }

    fn transition(&mut self, bus: &Arc<KernelEventBus>, to: AgentState) {
        if self.state == to {
            return;
        }
        bus.publish(
            KernelEventSeverity::Info,
            KernelEventCategory::Lifecycle,
            KernelEventPayload::AgentStateChanged {
                from: self.state.as_str().into(),
                to: to.as_str().into(),
            },
        );
        self.state = to;
    }
}
