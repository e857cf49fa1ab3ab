//! Ports: trait seams for the kernel's external collaborators.
//!
//! Production adapters live in the infrastructure layer; tests supply
//! scripted in-process implementations.

pub mod embedding;
pub mod tool_host;
pub mod vault;

pub use embedding::{EmbeddingBackend, NullEmbedding};
pub use tool_host::{ToolCall, ToolHost, ToolResponse, ToolStatus};
pub use vault::VaultStore;
