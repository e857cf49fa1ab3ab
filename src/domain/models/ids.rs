//! Stable identifiers for kernel entities.
//!
//! Instance identifiers (agents, epochs, DAGs, nodes, events) are random
//! 128-bit values. Cache keys are deterministic content-addressed digests
//! produced by the hashing module; the [`CacheKey`] newtype only carries
//! the hex form.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(
    /// One lifecycle-managed agent instance.
    AgentId
);
uuid_id!(
    /// The span between macro-objective activation and close.
    EpochId
);
uuid_id!(
    /// One compiled execution graph.
    DagId
);
uuid_id!(
    /// One node within a DAG.
    NodeId
);
uuid_id!(
    /// Correlation id threaded through contexts, spans, and tool calls.
    TraceId
);
uuid_id!(
    /// One observation event.
    EventId
);

/// Content-addressed cache key: hex SHA-256 over `(namespace, payload)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(pub String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_are_unique() {
        assert_ne!(AgentId::new(), AgentId::new());
        assert_ne!(DagId::new(), DagId::new());
    }

    #[test]
    fn ids_round_trip_through_serde() {
        let id = NodeId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
