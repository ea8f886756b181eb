use thiserror::Error;

use crate::engine::types::Operation;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown fact id: {fact_id}")]
    UnknownFact { fact_id: String },

    #[error("diagnostic analysis requires at least one result")]
    EmptyDiagnostic,

    #[error("no problem banks found for learner {learner_id} ({operation})")]
    BanksNotFound {
        learner_id: String,
        operation: Operation,
    },

    #[error("version conflict saving record for learner {learner_id}")]
    VersionConflict { learner_id: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
