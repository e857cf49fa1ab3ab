//! Budget authority (T5).
//!
//! Accumulates cost telemetry from the execution engine into the
//! running budget state and evaluates it against the soft and hard
//! thresholds. Threshold transitions are published on the event bus;
//! the lifecycle controller reacts to them.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::domain::models::budget::{BudgetAmounts, BudgetLimits, BudgetStatus};
use crate::domain::models::outcome::CostTelemetry;
use crate::services::event_bus::{
    KernelEventBus, KernelEventCategory, KernelEventPayload, KernelEventSeverity,
};

struct Inner {
    spent: BudgetAmounts,
    last_status: BudgetStatus,
}

/// The T5 budget authority.
pub struct BudgetAuthority {
    limits: BudgetLimits,
    bus: Arc<KernelEventBus>,
    inner: RwLock<Inner>,
}

impl BudgetAuthority {
    pub fn new(limits: BudgetLimits, bus: Arc<KernelEventBus>) -> Self {
        Self {
            limits,
            bus,
            inner: RwLock::new(Inner {
                spent: BudgetAmounts::default(),
                last_status: BudgetStatus::Ok,
            }),
        }
    }

    /// Accumulate one cost event and return the resulting status.
    pub async fn track_budget(&self, cost: CostTelemetry) -> BudgetStatus {
        let (status, changed, spent_tokens) = {
            let mut inner = self.inner.write().await;
            inner.spent += BudgetAmounts::from(cost);
            let status = self.limits.status(inner.spent);
            let changed = status != inner.last_status;
            inner.last_status = status;
            (status, changed, inner.spent.tokens)
        };

        if changed {
            let severity = match status {
                BudgetStatus::Ok => KernelEventSeverity::Info,
                BudgetStatus::SoftExceeded => KernelEventSeverity::Warning,
                BudgetStatus::HardExhausted => KernelEventSeverity::Critical,
            };
            if status != BudgetStatus::Ok {
                warn!(?status, spent_tokens, "budget threshold crossed");
            }
            self.bus.publish(
                severity,
                KernelEventCategory::Budget,
                KernelEventPayload::BudgetThreshold { status, spent_tokens },
            );
        }
        status
    }

    /// Evaluate the current spend without recording anything.
    pub async fn check_budget_exhaustion(&self) -> BudgetStatus {
        let inner = self.inner.read().await;
        self.limits.status(inner.spent)
    }

    pub async fn spent(&self) -> BudgetAmounts {
        self.inner.read().await.spent
    }

    pub fn grant(&self) -> BudgetAmounts {
        self.limits.grant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ids::AgentId;

    fn authority(grant_tokens: u64) -> BudgetAuthority {
        let bus = Arc::new(KernelEventBus::new(AgentId::new(), 16));
        BudgetAuthority::new(BudgetLimits::new(BudgetAmounts::tokens(grant_tokens)), bus)
    }

    #[tokio::test]
    async fn accumulates_across_cost_events() {
        let authority = authority(1_000);
        authority.track_budget(CostTelemetry::tokens(100)).await;
        authority.track_budget(CostTelemetry::tokens(150)).await;
        assert_eq!(authority.spent().await.tokens, 250);
        assert_eq!(authority.check_budget_exhaustion().await, BudgetStatus::Ok);
    }

    #[tokio::test]
    async fn soft_then_hard_thresholds() {
        let authority = authority(100);
        assert_eq!(
            authority.track_budget(CostTelemetry::tokens(80)).await,
            BudgetStatus::SoftExceeded
        );
        assert_eq!(
            authority.track_budget(CostTelemetry::tokens(20)).await,
            BudgetStatus::HardExhausted
        );
    }

    #[tokio::test]
    async fn threshold_crossings_are_published_once() {
        let bus = Arc::new(KernelEventBus::new(AgentId::new(), 16));
        let authority =
            BudgetAuthority::new(BudgetLimits::new(BudgetAmounts::tokens(100)), Arc::clone(&bus));
        let mut rx = bus.subscribe();

        authority.track_budget(CostTelemetry::tokens(85)).await;
        authority.track_budget(CostTelemetry::tokens(1)).await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.payload,
            KernelEventPayload::BudgetThreshold { status: BudgetStatus::SoftExceeded, .. }
        ));
        // The second track stayed at the same status: no second event.
        assert!(rx.try_recv().is_err());
    }
}
