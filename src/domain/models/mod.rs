//! Domain models for the cognitive kernel.

pub mod budget;
pub mod config;
pub mod context;
pub mod dag;
pub mod epoch;
pub mod event;
pub mod focus;
pub mod identity;
pub mod ids;
pub mod outcome;
pub mod schema;
pub mod task;
pub mod world;

pub use budget::{BudgetAmounts, BudgetLimits, BudgetStatus, BudgetWeights};
pub use config::KernelConfig;
pub use context::{
    CognitiveContext, ContextLabels, EntityRecord, EntityType, FileHandle, GeoAnchor, MediaKind,
    RawInput, TimeRange,
};
pub use dag::{DagError, NodeStatus, PlanDag, PlanNode, RiskClass};
pub use epoch::{DagOutcome, DecisionRecord, EpochSummary, JournalEntry, SummarizedEvent};
pub use event::{
    InterruptKind, InterruptSignal, Observation, ObservationPayload, SpawnRequest,
};
pub use focus::{FocusItem, FocusKind};
pub use identity::{IdentityContext, PolicyRule};
pub use ids::{AgentId, CacheKey, DagId, EpochId, EventId, NodeId, TraceId};
pub use outcome::{
    CostTelemetry, ExecutionResult, OutcomeBranch, ReflectionInsight, Reversibility,
    SafeguardNode, SimulationReport, SimulationVerdict,
};
pub use schema::ValueSchema;
pub use task::{ExplorationTask, RetryPolicy, SkillTag, StrategyChannel, SubTask};
pub use world::{MacroObjective, WorldSnapshot, WorldState};
