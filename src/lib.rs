//! Noesis - tiered cognitive kernel for autonomous research agents
//!
//! A Rust implementation of the Tier 0-5 agent kernel:
//! - T0 base: schemas, content hashing, cache hierarchy, hardware probe
//! - T1 primitives: ingestion, classification, extraction, validation, scoring
//! - T2 engines: decomposition, curiosity, what-if simulation, filters
//! - T3 orchestration: plan synthesis, node assembly, guardrails, reflection
//! - T4 execution: the OODA loop, working memory, asynchronous parking
//! - T5 ego: lifecycle state machine, budget authority, interrupts

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use application::{LifecycleController, OodaEngine};
pub use domain::errors::{KernelError, KernelResult};
pub use domain::models::KernelConfig;
