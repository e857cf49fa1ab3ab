//! Immutable agent identity.
//!
//! Constructed once at genesis and never modified by lower tiers. The
//! persona payload is opaque bytes fetched from the Vault; the kernel
//! passes it through without parsing.

use serde::{Deserialize, Serialize};

use super::ids::AgentId;

/// A non-negotiable rule rooted in the agent's identity.
///
/// A plan is vetoed when any node's surface matches one of the
/// forbidden terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub description: String,
    pub forbidden_terms: Vec<String>,
}

impl PolicyRule {
    pub fn new(description: impl Into<String>, forbidden_terms: &[&str]) -> Self {
        Self {
            description: description.into(),
            forbidden_terms: forbidden_terms.iter().map(|t| (*t).to_lowercase()).collect(),
        }
    }
}

/// The immutable identity context created at genesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityContext {
    pub agent_id: AgentId,
    pub profile_id: String,
    /// Opaque persona payload passed through to the tool-host boundary.
    #[serde(default)]
    pub persona: Vec<u8>,
    /// Non-negotiable rules consulted by the guardrail gate.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl IdentityContext {
    pub fn new(agent_id: AgentId, profile_id: impl Into<String>) -> Self {
        Self {
            agent_id,
            profile_id: profile_id.into(),
            persona: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_persona(mut self, persona: Vec<u8>) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_rules(mut self, rules: Vec<PolicyRule>) -> Self {
        self.rules = rules;
        self
    }
}
