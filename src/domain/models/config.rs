//! Kernel configuration tree.
//!
//! Loaded by the figment-based loader in the infrastructure layer:
//! programmatic defaults, then `noesis.yaml`, then environment variables.

use serde::{Deserialize, Serialize};

use super::budget::BudgetWeights;

/// Main configuration structure for the kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KernelConfig {
    /// External dependency endpoints. No defaults; required at startup.
    #[serde(default)]
    pub endpoints: EndpointsConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub pressure: PressureConfig,

    #[serde(default)]
    pub planning: PlanningConfig,

    #[serde(default)]
    pub interrupts: InterruptConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            endpoints: EndpointsConfig::default(),
            memory: MemoryConfig::default(),
            cache: CacheConfig::default(),
            execution: ExecutionConfig::default(),
            budget: BudgetConfig::default(),
            pressure: PressureConfig::default(),
            planning: PlanningConfig::default(),
            interrupts: InterruptConfig::default(),
            logging: LoggingConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Dependency endpoints. Empty strings mean "not configured".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EndpointsConfig {
    #[serde(default)]
    pub vault_url: String,
    #[serde(default)]
    pub embed_url: String,
    #[serde(default)]
    pub tool_host_url: String,
}

/// Working-memory bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MemoryConfig {
    /// History queue size.
    #[serde(default = "default_max_events")]
    pub max_events: usize,

    /// Working-memory focus cap.
    #[serde(default = "default_focus_cap")]
    pub focus_cap: usize,

    /// TTL for cached entities, seconds.
    #[serde(default = "default_entity_ttl_s")]
    pub entity_ttl_s: u64,
}

const fn default_max_events() -> usize {
    128
}

const fn default_focus_cap() -> usize {
    7
}

const fn default_entity_ttl_s() -> u64 {
    300
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
            focus_cap: default_focus_cap(),
            entity_ttl_s: default_entity_ttl_s(),
        }
    }
}

/// Cache hierarchy TTLs and capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// L2 default TTL, seconds.
    #[serde(default = "default_l2_ttl_s")]
    pub l2_ttl_s: u64,

    /// L3 default TTL, seconds.
    #[serde(default = "default_l3_ttl_s")]
    pub l3_ttl_s: u64,

    /// L4 default TTL, seconds.
    #[serde(default = "default_l4_ttl_s")]
    pub l4_ttl_s: u64,

    #[serde(default = "default_l1_capacity")]
    pub l1_capacity: usize,

    #[serde(default = "default_l2_capacity")]
    pub l2_capacity: usize,

    #[serde(default = "default_l3_capacity")]
    pub l3_capacity: usize,

    #[serde(default = "default_l4_capacity")]
    pub l4_capacity: usize,
}

const fn default_l2_ttl_s() -> u64 {
    300
}

const fn default_l3_ttl_s() -> u64 {
    3600
}

const fn default_l4_ttl_s() -> u64 {
    30
}

const fn default_l1_capacity() -> usize {
    256
}

const fn default_l2_capacity() -> usize {
    2048
}

const fn default_l3_capacity() -> usize {
    8192
}

const fn default_l4_capacity() -> usize {
    64
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l2_ttl_s: default_l2_ttl_s(),
            l3_ttl_s: default_l3_ttl_s(),
            l4_ttl_s: default_l4_ttl_s(),
            l1_capacity: default_l1_capacity(),
            l2_capacity: default_l2_capacity(),
            l3_capacity: default_l3_capacity(),
            l4_capacity: default_l4_capacity(),
        }
    }
}

/// OODA execution bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutionConfig {
    /// Per-phase wall-time cap, milliseconds.
    #[serde(default = "default_phase_budget_ms")]
    pub phase_budget_ms: u64,

    /// Cancel wait window, milliseconds.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,

    /// Maximum parked continuations before the engine requests deep sleep.
    #[serde(default = "default_waiting_queue_cap")]
    pub waiting_queue_cap: usize,

    /// Consecutive tool-host failures that trigger a panic signal.
    #[serde(default = "default_panic_failure_streak")]
    pub panic_failure_streak: u32,

    /// Interval between health probes while panicked, seconds.
    #[serde(default = "default_health_interval_s")]
    pub health_interval_s: u64,
}

const fn default_phase_budget_ms() -> u64 {
    50
}

const fn default_cancel_grace_ms() -> u64 {
    2000
}

const fn default_waiting_queue_cap() -> usize {
    32
}

const fn default_panic_failure_streak() -> u32 {
    5
}

const fn default_health_interval_s() -> u64 {
    15
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            phase_budget_ms: default_phase_budget_ms(),
            cancel_grace_ms: default_cancel_grace_ms(),
            waiting_queue_cap: default_waiting_queue_cap(),
            panic_failure_streak: default_panic_failure_streak(),
            health_interval_s: default_health_interval_s(),
        }
    }
}

/// Budget thresholds and conversion weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetConfig {
    /// Fraction of the grant at which non-critical DAGs are parked.
    #[serde(default = "default_soft_threshold_pct")]
    pub soft_threshold_pct: f64,

    #[serde(default)]
    pub weights: BudgetWeights,
}

fn default_soft_threshold_pct() -> f64 {
    0.8
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            soft_threshold_pct: default_soft_threshold_pct(),
            weights: BudgetWeights::default(),
        }
    }
}

/// Memory-pressure probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PressureConfig {
    /// RSS percent of system memory that triggers cache eviction.
    #[serde(default = "default_pressure_high_pct")]
    pub high_pct: f64,

    /// Poll interval, seconds.
    #[serde(default = "default_pressure_poll_s")]
    pub poll_interval_s: u64,

    /// Bytes the eviction pass tries to free per trigger.
    #[serde(default = "default_evict_target_bytes")]
    pub evict_target_bytes: u64,
}

fn default_pressure_high_pct() -> f64 {
    85.0
}

const fn default_pressure_poll_s() -> u64 {
    10
}

const fn default_evict_target_bytes() -> u64 {
    8 * 1024 * 1024
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            high_pct: default_pressure_high_pct(),
            poll_interval_s: default_pressure_poll_s(),
            evict_target_bytes: default_evict_target_bytes(),
        }
    }
}

/// Planner, classifier, and simulation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PlanningConfig {
    /// Classification confidence below which a fallback is triggered.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Tie-break epsilon between class probabilities.
    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f64,

    /// Semantic-relevance threshold for the attention mask.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,

    /// Minimum success probability for an irreversible destructive branch.
    #[serde(default = "default_min_destructive_success")]
    pub min_destructive_success: f64,

    /// Aggregate simulation score below which a plan is modified.
    #[serde(default = "default_modify_threshold")]
    pub modify_threshold: f64,

    /// Plan variants compiled for consensus; 1 disables consensus.
    #[serde(default = "default_consensus_variants")]
    pub consensus_variants: usize,
}

fn default_confidence_threshold() -> f64 {
    0.45
}

fn default_tie_epsilon() -> f64 {
    0.01
}

fn default_relevance_threshold() -> f64 {
    0.2
}

fn default_min_destructive_success() -> f64 {
    0.9
}

fn default_modify_threshold() -> f64 {
    0.5
}

const fn default_consensus_variants() -> usize {
    1
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            tie_epsilon: default_tie_epsilon(),
            relevance_threshold: default_relevance_threshold(),
            min_destructive_success: default_min_destructive_success(),
            modify_threshold: default_modify_threshold(),
            consensus_variants: default_consensus_variants(),
        }
    }
}

/// Interrupt handling options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InterruptConfig {
    /// Skip reflection when a priority override lands; default is
    /// flush-through-reflection.
    #[serde(default)]
    pub fast_abandon: bool,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self { fast_abandon: false }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

/// Tool-host rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

const fn default_requests_per_second() -> u32 {
    10
}

const fn default_burst_size() -> u32 {
    20
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
        }
    }
}
