//! Sub-task and exploration-task domain models.
//!
//! Sub-tasks are the units the decomposition engine emits and the plan
//! synthesizer compiles into DAG nodes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::schema::ValueSchema;

/// A required capability for executing a sub-task.
///
/// Skill tags are resolved by the node assembler against the skill
/// registry; unknown tags are a synthesis error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillTag(pub String);

impl SkillTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SkillTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SkillTag {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Retry behavior for a node dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Multiplicative jitter fraction applied to each backoff, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 10_000,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// No retries at all; the first failure is final.
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Backoff for a 0-indexed retry attempt, before jitter.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        self.initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms)
    }
}

/// A unit of work produced by goal decomposition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub id: Uuid,
    pub description: String,
    pub skill: SkillTag,
    pub input_schema: ValueSchema,
    pub output_schema: ValueSchema,
    /// Ids of sub-tasks whose outputs this one consumes.
    #[serde(default)]
    pub depends_on: Vec<Uuid>,
    #[serde(default)]
    pub retry: RetryPolicy,
    pub timeout_ms: u64,
    /// True when this task has no data dependency on its siblings.
    pub parallelizable: bool,
}

impl SubTask {
    pub fn new(description: impl Into<String>, skill: impl Into<SkillTag>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            skill: skill.into(),
            input_schema: ValueSchema::any(),
            output_schema: ValueSchema::any(),
            depends_on: Vec::new(),
            retry: RetryPolicy::default(),
            timeout_ms: 30_000,
            parallelizable: true,
        }
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.depends_on.extend(ids);
        self.parallelizable = self.depends_on.is_empty();
        self
    }

    pub fn with_schemas(mut self, input: ValueSchema, output: ValueSchema) -> Self {
        self.input_schema = input;
        self.output_schema = output;
        self
    }
}

/// Which channel an investigation query is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyChannel {
    /// Local retrieval-augmented lookup.
    Rag,
    /// External web search.
    Web,
    /// Local filesystem scan.
    Filesystem,
}

impl StrategyChannel {
    /// Skill tag the channel maps to at compile time.
    pub fn skill(&self) -> SkillTag {
        match self {
            Self::Rag => SkillTag::new("rag.query"),
            Self::Web => SkillTag::new("web.search"),
            Self::Filesystem => SkillTag::new("fs.scan"),
        }
    }
}

/// An investigation task produced by the curiosity engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationTask {
    pub id: Uuid,
    /// The missing variable the investigation is meant to fill.
    pub gap_variable: String,
    pub query: String,
    pub channel: StrategyChannel,
}

impl ExplorationTask {
    pub fn new(gap: impl Into<String>, query: impl Into<String>, channel: StrategyChannel) -> Self {
        Self {
            id: Uuid::new_v4(),
            gap_variable: gap.into(),
            query: query.into(),
            channel,
        }
    }

    /// Convert into a sub-task the planner can prepend.
    pub fn into_subtask(self) -> SubTask {
        let mut task = SubTask::new(
            format!("resolve missing input `{}`: {}", self.gap_variable, self.query),
            self.channel.skill(),
        );
        task.id = self.id;
        task.output_schema = ValueSchema::record(
            [(self.gap_variable.clone(), ValueSchema::any())],
            vec![self.gap_variable],
        );
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ms(0), 250);
        assert_eq!(policy.backoff_ms(1), 500);
        assert_eq!(policy.backoff_ms(2), 1000);
        assert_eq!(policy.backoff_ms(10), 10_000);
    }

    #[test]
    fn depends_on_clears_parallelizable() {
        let a = SubTask::new("fetch prices", "web.search");
        let b = SubTask::new("summarize", "text.summarize").depends_on([a.id]);
        assert!(a.parallelizable);
        assert!(!b.parallelizable);
    }

    #[test]
    fn exploration_task_declares_gap_output() {
        let task = ExplorationTask::new("ticker", "resolve ticker symbol", StrategyChannel::Web)
            .into_subtask();
        assert_eq!(task.skill, SkillTag::new("web.search"));
        match &task.output_schema {
            ValueSchema::Record { required, .. } => {
                assert_eq!(required, &vec!["ticker".to_string()]);
            }
            other => panic!("expected record schema, got {other:?}"),
        }
    }
}
