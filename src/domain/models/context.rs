//! Cognitive context: the single message type carried through the tiers.
//!
//! A context bundles raw text (if any), opaque file handles for large
//! binary inputs, an optional embedding, and the primitive-label metadata
//! accumulated during Orient. Contexts are immutable once observed;
//! enrichment produces a new context tagged with the same trace id.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::TraceId;

/// A tagged raw input presented to the ingestion gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "modality", rename_all = "snake_case")]
pub enum RawInput {
    Text { content: String },
    Audio { path: PathBuf },
    Image { path: PathBuf },
    Video { path: PathBuf },
    Document { path: PathBuf },
}

impl RawInput {
    pub fn media_kind(&self) -> MediaKind {
        match self {
            Self::Text { .. } => MediaKind::Text,
            Self::Audio { .. } => MediaKind::Audio,
            Self::Image { .. } => MediaKind::Image,
            Self::Video { .. } => MediaKind::Video,
            Self::Document { .. } => MediaKind::Document,
        }
    }
}

/// Broad media classification for a file handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Text,
    Audio,
    Image,
    Video,
    Document,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileHandleInner {
    path: PathBuf,
    kind: MediaKind,
    byte_size: u64,
}

/// Refcounted opaque pointer to an on-disk artifact.
///
/// The kernel never loads the referenced bytes into its own address space;
/// decomposition and tool servers receive the path. When the last clone
/// drops, the handle is released (file retention is an external concern).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHandle {
    inner: Arc<FileHandleInner>,
}

impl FileHandle {
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind, byte_size: u64) -> Self {
        Self {
            inner: Arc::new(FileHandleInner { path: path.into(), kind, byte_size }),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.inner.path
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    pub fn byte_size(&self) -> u64 {
        self.inner.byte_size
    }

    /// Live references to this handle, including this one.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

/// A typed entity extracted from text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: Uuid,
    pub name: String,
    pub entity_type: EntityType,
    /// Free-form attributes matched from the expected schema.
    #[serde(default)]
    pub attributes: serde_json::Value,
    /// Extraction confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

/// Entity classification used by the extraction schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Artifact,
    Metric,
    Temporal,
    Identifier,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Artifact => "artifact",
            Self::Metric => "metric",
            Self::Temporal => "temporal",
            Self::Identifier => "identifier",
        }
    }
}

/// An absolute UTC time range resolved by the spatiotemporal anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A resolved geographic anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoAnchor {
    pub place: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Primitive labels accumulated on a context during Orient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextLabels {
    /// Winning intent label and its probability.
    pub intent: Option<(String, f64)>,
    /// Sentiment in `[0.0, 1.0]` where 0.5 is neutral.
    pub sentiment: Option<f64>,
    /// Urgency in `[0.0, 1.0]`.
    pub urgency: Option<f64>,
    pub time_range: Option<TimeRange>,
    pub geo: Option<GeoAnchor>,
    /// Ids of entities extracted from this context.
    #[serde(default)]
    pub entities: Vec<Uuid>,
}

/// The immutable message carried between tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitiveContext {
    pub trace_id: TraceId,
    pub text: Option<String>,
    #[serde(default)]
    pub files: Vec<FileHandle>,
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub labels: ContextLabels,
    /// Set when modality decomposition failed and only the handle is usable.
    pub ingest_error: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl CognitiveContext {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            trace_id: TraceId::new(),
            text: Some(text.into()),
            files: Vec::new(),
            embedding: None,
            labels: ContextLabels::default(),
            ingest_error: None,
            observed_at: Utc::now(),
        }
    }

    pub fn from_handle(handle: FileHandle) -> Self {
        Self {
            trace_id: TraceId::new(),
            text: None,
            files: vec![handle],
            embedding: None,
            labels: ContextLabels::default(),
            ingest_error: None,
            observed_at: Utc::now(),
        }
    }

    /// Produce an enriched copy carrying the same trace id.
    ///
    /// The original context is left untouched; callers replace their
    /// reference with the returned value.
    pub fn enriched(&self, f: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        f(&mut next);
        next.trace_id = self.trace_id;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrichment_preserves_trace_id() {
        let ctx = CognitiveContext::from_text("find the report");
        let enriched = ctx.enriched(|c| {
            c.labels.urgency = Some(0.3);
        });
        assert_eq!(ctx.trace_id, enriched.trace_id);
        assert_eq!(enriched.labels.urgency, Some(0.3));
        assert_eq!(ctx.labels.urgency, None);
    }

    #[test]
    fn file_handles_are_refcounted() {
        let handle = FileHandle::new("/tmp/report.pdf", MediaKind::Document, 4096);
        assert_eq!(handle.ref_count(), 1);
        let clone = handle.clone();
        assert_eq!(handle.ref_count(), 2);
        drop(clone);
        assert_eq!(handle.ref_count(), 1);
    }

    #[test]
    fn raw_input_media_kind() {
        let input = RawInput::Video { path: "/tmp/clip.mp4".into() };
        assert_eq!(input.media_kind(), MediaKind::Video);
    }
}
