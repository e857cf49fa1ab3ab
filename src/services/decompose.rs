//! Goal decomposition engine (T2).
//!
//! Splits a macro-objective into ordered sub-tasks: assess complexity
//! through the T1 primitives, split into logical sub-goals, build the
//! dependency array from the ordering connectives, and map each
//! sub-goal to a required skill tag.

use regex::Regex;
use tracing::debug;

use crate::domain::errors::{KernelError, KernelResult};
use crate::domain::models::schema::ValueSchema;
use crate::domain::models::task::{SkillTag, SubTask};
use crate::domain::models::world::WorldSnapshot;

use super::extract::{EntityExtractor, ScoringPrimitives};

/// Keyword-to-skill mapping table.
const SKILL_TABLE: &[(&[&str], &str)] = &[
    (&["label", "classify", "categorize"], "text.classify"),
    (&["summarize", "report", "write up", "describe"], "text.summarize"),
    (&["poll", "job", "wait for"], "job.poll"),
    (&["delete", "remove", "purge", "drop", "truncate"], "fs.delete"),
    (&["preserve", "backup", "archive", "keep", "retain"], "fs.backup"),
    (&["scan", "list files", "walk"], "fs.scan"),
    (&["compute", "calculate", "sum", "average", "aggregate"], "numeric.eval"),
    (&["scrape", "crawl", "download"], "web.scrape"),
    (&["search", "find", "look up", "research", "fetch"], "web.search"),
];

const FALLBACK_SKILL: &str = "web.search";

/// The T2 decomposition engine.
pub struct DecompositionEngine {
    extractor: EntityExtractor,
}

impl DecompositionEngine {
    pub fn new() -> Self {
        Self { extractor: EntityExtractor::with_default_schema() }
    }

    /// Decompose the snapshot's macro-objective into sub-tasks with a
    /// dependency graph.
    ///
    /// The returned list is topologically ordered: every sub-task
    /// appears after everything it depends on.
    pub fn decompose_goal(&self, snapshot: &WorldSnapshot) -> KernelResult<Vec<SubTask>> {
        let objective = snapshot.objective.text.trim();
        if objective.is_empty() {
            return Err(KernelError::InputRejected {
                gate: "decompose".into(),
                message: "empty macro-objective".into(),
            });
        }

        // Complexity assessment feeds the split granularity.
        let (intent, intent_strength) = ScoringPrimitives::detect_intent(objective);
        let entity_count = self.extractor.extract_entities(objective).len();
        debug!(intent, intent_strength, entity_count, "assessing objective complexity");

        let segments = split_segments(objective);
        let mut tasks: Vec<SubTask> = Vec::with_capacity(segments.len());

        for segment in segments {
            let skill = map_skill(&segment.text);
            let mut task = SubTask::new(segment.text.clone(), skill.clone());
            task.output_schema = output_schema_for(&skill);

            // Ordered connectives produce a chain; unordered segments stay
            // parallelizable siblings.
            if segment.ordered_after_previous {
                if let Some(previous) = tasks.last() {
                    let prev_id = previous.id;
                    task = task.depends_on([prev_id]);
                    task.input_schema = previous.output_schema.clone();
                }
            }
            tasks.push(task);
        }

        // Every sub-task must declare a skill; the table guarantees it,
        // and the chain construction guarantees acyclicity.
        debug_assert!(tasks.iter().all(|t| !t.skill.as_str().is_empty()));
        Ok(tasks)
    }
}

impl Default for DecompositionEngine {
    fn default() -> Self {
        Self::new()
    }
}

struct Segment {
    text: String,
    ordered_after_previous: bool,
}

/// Split an objective into sub-goal segments, remembering which splits
/// imply ordering.
fn split_segments(objective: &str) -> Vec<Segment> {
    // Ordered connectives first: "then", "after that", "afterwards".
    let ordered = Regex::new(
        r"(?i)\s*,?\s*(?:\band\s+)?\bthen\s+|\s*;\s*\bafter that\s*,?\s*|\s*,\s*\bafterwards\s*,?\s*",
    )
    .expect("static regex");
    let mut segments = Vec::new();

    for (i, ordered_part) in ordered.split(objective).enumerate() {
        // Unordered conjunctions inside each ordered part.
        let unordered = Regex::new(r"(?i)\s*,?\s*\band also\s+|\s*;\s*").expect("static regex");
        for (j, piece) in unordered.split(ordered_part).enumerate() {
            let text = piece.trim().trim_end_matches('.').to_string();
            if text.is_empty() {
                continue;
            }
            segments.push(Segment {
                text,
                ordered_after_previous: i > 0 && j == 0 && !segments.is_empty(),
            });
        }
    }

    if segments.is_empty() {
        segments.push(Segment { text: objective.to_string(), ordered_after_previous: false });
    }
    segments
}

/// Output contract per skill: classification yields a label record,
/// everything else a generic result record.
fn output_schema_for(skill: &SkillTag) -> ValueSchema {
    match skill.as_str() {
        "text.classify" => ValueSchema::record(
            [
                ("label".to_string(), ValueSchema::text()),
                ("confidence".to_string(), ValueSchema::float()),
                ("urgency".to_string(), ValueSchema::float()),
            ],
            vec!["label".to_string()],
        ),
        _ => ValueSchema::record(
            [("result".to_string(), ValueSchema::any())],
            vec!["result".to_string()],
        ),
    }
}

fn map_skill(segment: &str) -> SkillTag {
    let lower = segment.to_lowercase();
    for (keywords, skill) in SKILL_TABLE {
        if keywords.iter().any(|k| lower.contains(k)) {
            return SkillTag::new(*skill);
        }
    }
    SkillTag::new(FALLBACK_SKILL)
}
