//! Budget amounts, weights, and threshold evaluation.
//!
//! The kernel accounts cost in a single `{tokens, wall_ms, bytes}` triple.
//! Exhaustion checks compare a weighted scalar against the grant; tokens
//! dominate under the default weights.

use serde::{Deserialize, Serialize};

use super::outcome::CostTelemetry;

/// A budget quantity in the kernel's canonical triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetAmounts {
    pub tokens: u64,
    pub wall_ms: u64,
    pub bytes: u64,
}

impl BudgetAmounts {
    pub fn tokens(tokens: u64) -> Self {
        Self { tokens, ..Self::default() }
    }

    pub fn is_zero(&self) -> bool {
        self.tokens == 0 && self.wall_ms == 0 && self.bytes == 0
    }
}

impl From<CostTelemetry> for BudgetAmounts {
    fn from(cost: CostTelemetry) -> Self {
        Self { tokens: cost.tokens, wall_ms: cost.wall_ms, bytes: cost.bytes }
    }
}

impl std::ops::Add for BudgetAmounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            tokens: self.tokens + rhs.tokens,
            wall_ms: self.wall_ms + rhs.wall_ms,
            bytes: self.bytes + rhs.bytes,
        }
    }
}

impl std::ops::AddAssign for BudgetAmounts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Conversion weights collapsing the triple into one scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetWeights {
    pub tokens: f64,
    pub wall_ms: f64,
    pub bytes: f64,
}

impl Default for BudgetWeights {
    fn default() -> Self {
        // Tokens are the primary currency; wall time and bytes are minor terms.
        Self { tokens: 1.0, wall_ms: 0.001, bytes: 0.000_001 }
    }
}

impl BudgetWeights {
    pub fn scalar(&self, amounts: BudgetAmounts) -> f64 {
        amounts.tokens as f64 * self.tokens
            + amounts.wall_ms as f64 * self.wall_ms
            + amounts.bytes as f64 * self.bytes
    }
}

/// The grant plus soft-threshold configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetLimits {
    pub grant: BudgetAmounts,
    /// Fraction of the grant at which the soft threshold trips.
    pub soft_threshold_pct: f64,
    pub weights: BudgetWeights,
}

impl BudgetLimits {
    pub fn new(grant: BudgetAmounts) -> Self {
        Self { grant, soft_threshold_pct: 0.8, weights: BudgetWeights::default() }
    }

    /// Evaluate spend against the grant.
    pub fn status(&self, spent: BudgetAmounts) -> BudgetStatus {
        let grant = self.weights.scalar(self.grant);
        if grant <= 0.0 {
            return BudgetStatus::Ok;
        }
        let used = self.weights.scalar(spent);
        if used >= grant {
            BudgetStatus::HardExhausted
        } else if used >= grant * self.soft_threshold_pct {
            BudgetStatus::SoftExceeded
        } else {
            BudgetStatus::Ok
        }
    }
}

/// Result of a budget threshold check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Ok,
    /// Park non-critical work and request a new grant.
    SoftExceeded,
    /// Forced terminate with epoch commit.
    HardExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_tracks_thresholds() {
        let limits = BudgetLimits::new(BudgetAmounts::tokens(1_000));
        assert_eq!(limits.status(BudgetAmounts::tokens(100)), BudgetStatus::Ok);
        assert_eq!(limits.status(BudgetAmounts::tokens(800)), BudgetStatus::SoftExceeded);
        assert_eq!(limits.status(BudgetAmounts::tokens(1_000)), BudgetStatus::HardExhausted);
    }

    #[test]
    fn exactly_at_hard_threshold_is_exhausted() {
        // Budget exactly at the hard threshold must stop new dispatches.
        let limits = BudgetLimits::new(BudgetAmounts::tokens(500));
        assert_eq!(limits.status(BudgetAmounts::tokens(500)), BudgetStatus::HardExhausted);
    }

    #[test]
    fn zero_grant_never_trips() {
        let limits = BudgetLimits::new(BudgetAmounts::default());
        assert_eq!(limits.status(BudgetAmounts::tokens(10)), BudgetStatus::Ok);
    }

    #[test]
    fn weights_fold_triple_to_scalar() {
        let w = BudgetWeights::default();
        let amounts = BudgetAmounts { tokens: 100, wall_ms: 1_000, bytes: 1_000_000 };
        let scalar = w.scalar(amounts);
        assert!((scalar - 102.0).abs() < 1e-9);
    }
}
