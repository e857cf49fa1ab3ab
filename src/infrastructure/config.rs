//! Configuration loader with hierarchical merging.
//!
//! Precedence (lowest to highest): programmatic defaults, `noesis.yaml`,
//! then environment variables. The `KERNEL_*` and endpoint variables use
//! the flat names documented in the deployment runbook and are mapped
//! onto the nested config tree here.

use anyhow::{Context, Result};
use figment::providers::{Data, Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::KernelConfig;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required endpoint: {0}")]
    MissingEndpoint(&'static str),

    #[error("Invalid focus cap: {0}. Must be between 1 and 64")]
    InvalidFocusCap(usize),

    #[error("Invalid max_events: {0}. Must be at least 1")]
    InvalidMaxEvents(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid pressure threshold: {0}. Must be in (0, 100]")]
    InvalidPressurePct(f64),

    #[error("Invalid soft threshold: {0}. Must be in (0, 1)")]
    InvalidSoftThreshold(f64),

    #[error("Invalid rate limit: requests_per_second must be at least 1")]
    InvalidRateLimit,

    #[error("Invalid consensus_variants: {0}. Must be at least 1")]
    InvalidConsensusVariants(usize),
}

/// Loads and validates the kernel configuration.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    pub fn load() -> Result<KernelConfig> {
        Self::load_from(Yaml::file("noesis.yaml"))
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<KernelConfig> {
        Self::load_from(Yaml::file(path.as_ref()))
    }

    fn load_from(file: Data<Yaml>) -> Result<KernelConfig> {
        let config: KernelConfig = Figment::new()
            .merge(Serialized::defaults(KernelConfig::default()))
            .merge(file)
            // Flat KERNEL_* names from the runbook, mapped onto the tree.
            .merge(
                Env::prefixed("KERNEL_")
                    .map(|key| match key.as_str().to_ascii_uppercase().as_str() {
                        "MAX_EVENTS" => "memory__max_events".into(),
                        "FOCUS_CAP" => "memory__focus_cap".into(),
                        "CACHE_L2_TTL_S" => "cache__l2_ttl_s".into(),
                        "CACHE_L3_TTL_S" => "cache__l3_ttl_s".into(),
                        "CACHE_L4_TTL_S" => "cache__l4_ttl_s".into(),
                        "CANCEL_GRACE_MS" => "execution__cancel_grace_ms".into(),
                        "PHASE_BUDGET_MS" => "execution__phase_budget_ms".into(),
                        "PRESSURE_HIGH_PCT" => "pressure__high_pct".into(),
                        other => other.to_ascii_lowercase().into(),
                    })
                    .split("__"),
            )
            .merge(
                Env::raw()
                    .only(&["VAULT_URL", "EMBED_URL", "TOOL_HOST_URL"])
                    .map(|key| match key.as_str().to_ascii_uppercase().as_str() {
                        "VAULT_URL" => "endpoints__vault_url".into(),
                        "EMBED_URL" => "endpoints__embed_url".into(),
                        _ => "endpoints__tool_host_url".into(),
                    })
                    .split("__"),
            )
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &KernelConfig) -> Result<(), ConfigError> {
        if config.endpoints.vault_url.is_empty() {
            return Err(ConfigError::MissingEndpoint("VAULT_URL"));
        }
        if config.endpoints.embed_url.is_empty() {
            return Err(ConfigError::MissingEndpoint("EMBED_URL"));
        }
        if config.endpoints.tool_host_url.is_empty() {
            return Err(ConfigError::MissingEndpoint("TOOL_HOST_URL"));
        }

        if config.memory.focus_cap == 0 || config.memory.focus_cap > 64 {
            return Err(ConfigError::InvalidFocusCap(config.memory.focus_cap));
        }
        if config.memory.max_events == 0 {
            return Err(ConfigError::InvalidMaxEvents(config.memory.max_events));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.pressure.high_pct <= 0.0 || config.pressure.high_pct > 100.0 {
            return Err(ConfigError::InvalidPressurePct(config.pressure.high_pct));
        }
        if config.budget.soft_threshold_pct <= 0.0 || config.budget.soft_threshold_pct >= 1.0 {
            return Err(ConfigError::InvalidSoftThreshold(config.budget.soft_threshold_pct));
        }
        if config.rate_limit.requests_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit);
        }
        if config.planning.consensus_variants == 0 {
            return Err(ConfigError::InvalidConsensusVariants(config.planning.consensus_variants));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> KernelConfig {
        let mut config = KernelConfig::default();
        config.endpoints.vault_url = "http://127.0.0.1:8201".into();
        config.endpoints.embed_url = "http://127.0.0.1:8202".into();
        config.endpoints.tool_host_url = "http://127.0.0.1:8203".into();
        config
    }

    #[test]
    fn defaults_match_runbook_values() {
        let config = KernelConfig::default();
        assert_eq!(config.memory.max_events, 128);
        assert_eq!(config.memory.focus_cap, 7);
        assert_eq!(config.cache.l2_ttl_s, 300);
        assert_eq!(config.cache.l3_ttl_s, 3600);
        assert_eq!(config.cache.l4_ttl_s, 30);
        assert_eq!(config.execution.cancel_grace_ms, 2000);
        assert_eq!(config.execution.phase_budget_ms, 50);
        assert!((config.pressure.high_pct - 85.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_endpoints_fail_validation() {
        let config = KernelConfig::default();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::MissingEndpoint("VAULT_URL"))
        ));
    }

    #[test]
    fn valid_config_passes() {
        assert!(ConfigLoader::validate(&valid_config()).is_ok());
    }

    #[test]
    fn zero_focus_cap_rejected() {
        let mut config = valid_config();
        config.memory.focus_cap = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidFocusCap(0))
        ));
    }

    #[test]
    fn env_overrides_flat_kernel_names() {
        temp_env::with_vars(
            [
                ("KERNEL_MAX_EVENTS", Some("42")),
                ("KERNEL_FOCUS_CAP", Some("5")),
                ("KERNEL_CACHE_L2_TTL_S", Some("60")),
                ("VAULT_URL", Some("http://vault.test")),
                ("EMBED_URL", Some("http://embed.test")),
                ("TOOL_HOST_URL", Some("http://tools.test")),
            ],
            || {
                let config = ConfigLoader::load().unwrap();
                assert_eq!(config.memory.max_events, 42);
                assert_eq!(config.memory.focus_cap, 5);
                assert_eq!(config.cache.l2_ttl_s, 60);
                assert_eq!(config.endpoints.vault_url, "http://vault.test");
            },
        );
    }
}
