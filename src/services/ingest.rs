//! Modality ingestion gateway (T1).
//!
//! Demultiplexes heterogeneous inputs into text, vector, and opaque
//! file-handle representations. Large binary inputs are never loaded
//! into the kernel's address space: a [`FileHandle`] is produced
//! immediately as a bypass result, and cognitive decomposition runs only
//! on demand when the Orient phase requests it.

use std::sync::Arc;

use tracing::warn;

use crate::domain::models::context::{CognitiveContext, FileHandle, MediaKind, RawInput};

use super::embedder::CachedEmbedder;

/// Largest document the gateway will decompose in-process. Anything
/// bigger stays behind its handle for an external tool to handle.
const MAX_INLINE_DOCUMENT_BYTES: u64 = 256 * 1024;

/// T1 ingestion gateway.
pub struct IngestionGateway {
    embedder: Arc<CachedEmbedder>,
}

impl IngestionGateway {
    pub fn new(embedder: Arc<CachedEmbedder>) -> Self {
        Self { embedder }
    }

    /// Ingest a raw input.
    ///
    /// Pure text embeds synchronously. Binary modalities return a
    /// handle-only context; if the file cannot be read at all the
    /// context carries an error code so higher tiers can route to an
    /// external tool instead.
    pub async fn ingest(&self, input: RawInput) -> CognitiveContext {
        match input {
            RawInput::Text { content } => {
                let mut ctx = CognitiveContext::from_text(content);
                match self.embedder.embed(ctx.text.as_deref().unwrap_or_default()).await {
                    Ok(vector) => ctx.embedding = Some(vector),
                    Err(err) => {
                        warn!(error = %err, "embedding failed during text ingest");
                        ctx.ingest_error = Some("embed_failed".to_string());
                    }
                }
                ctx
            }
            RawInput::Audio { path } => Self::bypass(path, MediaKind::Audio),
            RawInput::Image { path } => Self::bypass(path, MediaKind::Image),
            RawInput::Video { path } => Self::bypass(path, MediaKind::Video),
            RawInput::Document { path } => Self::bypass(path, MediaKind::Document),
        }
    }

    fn bypass(path: std::path::PathBuf, kind: MediaKind) -> CognitiveContext {
        match std::fs::metadata(&path) {
            Ok(meta) => {
                let handle = FileHandle::new(path, kind, meta.len());
                CognitiveContext::from_handle(handle)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable input, handle-only bypass");
                let handle = FileHandle::new(path, kind, 0);
                let mut ctx = CognitiveContext::from_handle(handle);
                ctx.ingest_error = Some("unreadable_input".to_string());
                ctx
            }
        }
    }

    /// On-demand decomposition, called from Orient only.
    ///
    /// Extracts a textual component for document handles small enough to
    /// read inline and embeds it. Other modalities (and oversized or
    /// unreadable documents) keep their handle and gain an error code;
    /// the planner may route them to an external extraction tool.
    pub async fn decompose(&self, ctx: &CognitiveContext) -> CognitiveContext {
        let Some(handle) = ctx.files.first().cloned() else {
            return ctx.clone();
        };

        if handle.kind() != MediaKind::Document || handle.byte_size() > MAX_INLINE_DOCUMENT_BYTES {
            return ctx.enriched(|c| {
                c.ingest_error = Some("decomposition_requires_tool".to_string());
            });
        }

        match tokio::fs::read_to_string(handle.path()).await {
            Ok(text) => {
                let embedding = self.embedder.embed(&text).await.ok();
                ctx.enriched(|c| {
                    c.text = Some(text);
                    c.embedding = embedding;
                    c.ingest_error = None;
                })
            }
            Err(err) => {
                warn!(path = %handle.path().display(), error = %err, "document decomposition failed");
                ctx.enriched(|c| {
                    c.ingest_error = Some("unsupported_format".to_string());
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::CacheConfig;
    use crate::domain::ports::embedding::NullEmbedding;
    use crate::services::cache::CacheHierarchy;
    use std::io::Write;

    fn gateway() -> IngestionGateway {
        IngestionGateway::new(Arc::new(CachedEmbedder::new(
            Arc::new(NullEmbedding::default()),
            Arc::new(CacheHierarchy::new(&CacheConfig::default())),
        )))
    }

    #[tokio::test]
    async fn text_ingest_embeds_synchronously() {
        let ctx = gateway().ingest(RawInput::Text { content: "hello world".into() }).await;
        assert!(ctx.embedding.is_some());
        assert_eq!(ctx.text.as_deref(), Some("hello world"));
        assert!(ctx.files.is_empty());
    }

    #[tokio::test]
    async fn binary_ingest_bypasses_with_handle_only() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"fake image bytes").unwrap();

        let ctx = gateway()
            .ingest(RawInput::Image { path: file.path().to_path_buf() })
            .await;
        assert!(ctx.text.is_none());
        assert!(ctx.embedding.is_none());
        assert_eq!(ctx.files.len(), 1);
        assert_eq!(ctx.files[0].kind(), MediaKind::Image);
        assert_eq!(ctx.files[0].byte_size(), 16);
    }

    #[tokio::test]
    async fn missing_file_sets_error_code() {
        let ctx = gateway()
            .ingest(RawInput::Video { path: "/definitely/not/here.mp4".into() })
            .await;
        assert_eq!(ctx.ingest_error.as_deref(), Some("unreadable_input"));
        assert_eq!(ctx.files.len(), 1);
    }

    #[tokio::test]
    async fn document_decomposition_extracts_text_on_demand() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"quarterly revenue rose four percent").unwrap();

        let gateway = gateway();
        let ctx = gateway
            .ingest(RawInput::Document { path: file.path().to_path_buf() })
            .await;
        // Ingest itself must not extract.
        assert!(ctx.text.is_none());

        let decomposed = gateway.decompose(&ctx).await;
        assert_eq!(decomposed.text.as_deref(), Some("quarterly revenue rose four percent"));
        assert!(decomposed.embedding.is_some());
        assert_eq!(decomposed.trace_id, ctx.trace_id);
    }

    #[tokio::test]
    async fn video_decomposition_defers_to_tools() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let gateway = gateway();
        let ctx = gateway
            .ingest(RawInput::Video { path: file.path().to_path_buf() })
            .await;
        let decomposed = gateway.decompose(&ctx).await;
        assert_eq!(decomposed.ingest_error.as_deref(), Some("decomposition_requires_tool"));
    }
}
