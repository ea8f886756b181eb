//! Adaptive math-fact fluency engine.
//!
//! Tracks a learner's mastery of individual arithmetic facts, partitions
//! them into five proficiency banks, advances an ordered curriculum of
//! sub-levels, and composes balanced practice, diagnostic, and assessment
//! fact sets. Persistence and presentation are the caller's concern; the
//! engine exposes a small async facade over an in-memory record store.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;

pub use config::EngineConfig;
pub use engine::FluencyEngine;
pub use error::EngineError;
