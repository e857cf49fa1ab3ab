//! Service layer: the cache hierarchy, cognitive primitives (T1),
//! cognitive engines (T2), and orchestration (T3).

pub mod assembler;
pub mod cache;
pub mod classify;
pub mod curiosity;
pub mod decompose;
pub mod embedder;
pub mod event_bus;
pub mod extract;
pub mod filters;
pub mod guardrails;
pub mod ingest;
pub mod planner;
pub mod score;
pub mod validate;
pub mod whatif;

pub use assembler::{
    AssembledNode, NodeAssembler, NodeRunOutcome, NodeRuntime, SkillBinding, SkillRegistry,
};
pub use cache::{CacheDataKind, CacheHierarchy, CacheLevel, CacheStats};
pub use classify::{ClassProfile, ClassificationResult, Classifier, ClassifierOutcome};
pub use curiosity::CuriosityEngine;
pub use decompose::DecompositionEngine;
pub use embedder::CachedEmbedder;
pub use event_bus::{
    KernelEvent, KernelEventBus, KernelEventCategory, KernelEventPayload, KernelEventSeverity,
};
pub use extract::{EntityExtractor, ScoringPrimitives, SpatioTemporalAnchor};
pub use filters::{CognitiveFilters, FilterOutcome, SanityAlert};
pub use guardrails::{GuardrailGate, GuardrailVerdict, ReflectionEngine};
pub use ingest::IngestionGateway;
pub use planner::{CompiledPlan, PlanSynthesizer, SynthesisError};
pub use score::{aggregate_scores, HybridScorer, ScoreBreakdown};
pub use validate::{package_validation_error, ValidationGate, Validator};
pub use whatif::WhatIfEngine;
