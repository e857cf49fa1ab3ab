//! Curiosity engine (T2): gap detection and investigation routing.
//!
//! Walks the sub-task tree looking for required inputs whose source is
//! neither a known entity nor an upstream task's declared output,
//! formulates an investigation query per gap, and routes each query to
//! a strategy channel.

use std::collections::HashSet;

use tracing::debug;

use crate::domain::models::schema::ValueSchema;
use crate::domain::models::task::{ExplorationTask, StrategyChannel, SubTask};
use crate::domain::models::world::WorldSnapshot;

/// The T2 curiosity engine.
pub struct CuriosityEngine;

impl CuriosityEngine {
    pub fn new() -> Self {
        Self
    }

    /// Detect missing variables across `tasks` and produce one
    /// exploration task per gap.
    pub fn explore_gaps(
        &self,
        snapshot: &WorldSnapshot,
        tasks: &[SubTask],
    ) -> Vec<ExplorationTask> {
        let known_entities = snapshot.known_entity_names();
        let mut explorations = Vec::new();
        let mut seen_gaps: HashSet<String> = HashSet::new();

        for task in tasks {
            let upstream_outputs = upstream_output_fields(task, tasks);
            for field in required_fields(&task.input_schema) {
                let satisfied = known_entities.contains(&field.to_lowercase())
                    || upstream_outputs.contains(&field);
                if satisfied || !seen_gaps.insert(field.clone()) {
                    continue;
                }

                let channel = route_channel(&field, &task.description, &known_entities);
                let query = format!(
                    "find a value for `{field}` needed by: {}",
                    task.description
                );
                debug!(gap = %field, channel = ?channel, "curiosity gap detected");
                explorations.push(ExplorationTask::new(field, query, channel));
            }
        }
        explorations
    }
}

impl Default for CuriosityEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Required field names of a record input schema.
fn required_fields(schema: &ValueSchema) -> Vec<String> {
    match schema {
        ValueSchema::Record { required, .. } => required.clone(),
        _ => Vec::new(),
    }
}

/// Fields produced by this task's declared dependencies.
fn upstream_output_fields(task: &SubTask, all: &[SubTask]) -> HashSet<String> {
    task.depends_on
        .iter()
        .filter_map(|dep_id| all.iter().find(|t| t.id == *dep_id))
        .flat_map(|dep| match &dep.output_schema {
            ValueSchema::Record { fields, .. } => fields.keys().cloned().collect::<Vec<_>>(),
            _ => Vec::new(),
        })
        .collect()
}

/// Route a gap to the cheapest strategy likely to fill it.
fn route_channel(field: &str, description: &str, known: &HashSet<String>) -> StrategyChannel {
    let haystack = format!("{field} {description}").to_lowercase();
    if ["file", "path", "log", "directory", "disk"].iter().any(|t| haystack.contains(t)) {
        StrategyChannel::Filesystem
    } else if known.iter().any(|entity| haystack.contains(entity.as_str())) {
        // A partially-known subject: local retrieval first.
        StrategyChannel::Rag
    } else {
        StrategyChannel::Web
    }
}
