//! WorldState: the agent's current belief set.
//!
//! Owned exclusively by the OODA engine. Lower tiers receive
//! [`WorldSnapshot`] values, which are immutable copies.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::EntityRecord;
use super::event::Observation;
use super::ids::{AgentId, DagId};
use super::task::SubTask;

/// The agent-scope goal whose completion defines epoch close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroObjective {
    pub text: String,
    pub complete: bool,
}

impl MacroObjective {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), complete: false }
    }
}

/// The belief set owned by one OODA instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldState {
    pub agent_id: AgentId,
    pub objective: MacroObjective,
    /// Current decomposition of the objective.
    pub task_tree: Vec<SubTask>,
    /// Known entities keyed by entity id.
    pub entities: HashMap<Uuid, EntityRecord>,
    /// The most recent observations, oldest first.
    observations: VecDeque<Observation>,
    observation_cap: usize,
    pub open_dags: HashSet<DagId>,
    /// Monotonic clock tick, incremented once per OODA cycle.
    pub tick: u64,
}

impl WorldState {
    pub fn new(agent_id: AgentId, objective: MacroObjective, observation_cap: usize) -> Self {
        Self {
            agent_id,
            objective,
            task_tree: Vec::new(),
            entities: HashMap::new(),
            observations: VecDeque::with_capacity(observation_cap),
            observation_cap,
            open_dags: HashSet::new(),
            tick: 0,
        }
    }

    /// Record an observation, evicting the oldest at capacity.
    pub fn record_observation(&mut self, obs: Observation) {
        if self.observations.len() == self.observation_cap {
            self.observations.pop_front();
        }
        self.observations.push_back(obs);
    }

    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    pub fn advance_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn upsert_entity(&mut self, entity: EntityRecord) {
        self.entities.insert(entity.id, entity);
    }

    /// Names of entities currently known, lowercased for matching.
    pub fn known_entity_names(&self) -> HashSet<String> {
        self.entities
            .values()
            .map(|e| e.name.to_lowercase())
            .collect()
    }

    /// Produce the immutable view handed to lower tiers.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            agent_id: self.agent_id,
            objective: self.objective.clone(),
            task_tree: self.task_tree.clone(),
            entities: self.entities.clone(),
            recent_observations: self.observations.iter().cloned().collect(),
            open_dags: self.open_dags.clone(),
            tick: self.tick,
        }
    }
}

/// Immutable copy of [`WorldState`] shared with T1/T2/T3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub agent_id: AgentId,
    pub objective: MacroObjective,
    pub task_tree: Vec<SubTask>,
    pub entities: HashMap<Uuid, EntityRecord>,
    pub recent_observations: Vec<Observation>,
    pub open_dags: HashSet<DagId>,
    pub tick: u64,
}

impl WorldSnapshot {
    pub fn known_entity_names(&self) -> HashSet<String> {
        self.entities
            .values()
            .map(|e| e.name.to_lowercase())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::event::ObservationPayload;

    fn user_message(text: &str) -> Observation {
        Observation::new(ObservationPayload::UserMessage { text: text.to_string() })
    }

    #[test]
    fn observation_ring_evicts_oldest() {
        let mut world = WorldState::new(AgentId::new(), MacroObjective::new("test"), 2);
        world.record_observation(user_message("one"));
        world.record_observation(user_message("two"));
        world.record_observation(user_message("three"));

        let texts: Vec<_> = world
            .observations()
            .filter_map(|o| match &o.payload {
                ObservationPayload::UserMessage { text } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn snapshot_is_detached_from_state() {
        let mut world = WorldState::new(AgentId::new(), MacroObjective::new("test"), 4);
        let snap = world.snapshot();
        world.advance_tick();
        world.record_observation(user_message("later"));
        assert_eq!(snap.tick, 0);
        assert!(snap.recent_observations.is_empty());
    }

    #[test]
    fn tick_is_monotonic() {
        let mut world = WorldState::new(AgentId::new(), MacroObjective::new("test"), 4);
        assert_eq!(world.advance_tick(), 1);
        assert_eq!(world.advance_tick(), 2);
    }
}
