//! Domain layer: schema types, identifiers, and ports.
//!
//! Everything in this module is pure data or trait definitions. No I/O,
//! no clocks beyond explicitly passed timestamps, and nothing here may
//! depend on the service, application, or infrastructure layers.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ErrorEnvelope, ErrorKind, KernelError, KernelResult};
