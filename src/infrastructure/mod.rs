//! Infrastructure layer: configuration, logging, hashing, hardware
//! probing, and HTTP adapters for the external ports.

pub mod config;
pub mod hardware;
pub mod hashing;
pub mod http;
pub mod logging;

pub use config::ConfigLoader;
pub use hashing::{canonical_json_bytes, content_hash, generate_cache_key};
