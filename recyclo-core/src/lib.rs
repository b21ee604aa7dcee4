//! Core types and pipeline wiring for the Recyclo recycling assistant.

/// Shaping of classification and lookup results for display.
pub mod aggregate;
/// Exclusive ownership of a capture stream.
pub mod capture;
/// Model lifecycle and inference on captured frames.
pub mod classifier;
/// Configuration file and environment overrides.
pub mod config;
/// Cycle tickets used to drop results of abandoned cycles.
pub mod cycle;
/// Domain models and identifiers.
pub mod model;
/// Traits describing the backend interfaces.
pub mod ports;
/// Label to fee and collection center resolution.
pub mod resolver;
/// High-level service facade used by clients.
pub mod service;
/// Fallback matching policy.
pub mod synonyms;

#[cfg(test)]
mod testing;

pub use aggregate::*;
pub use capture::*;
pub use classifier::*;
pub use cycle::*;
pub use model::*;
pub use ports::*;
pub use resolver::*;
pub use service::*;
pub use synonyms::*;
