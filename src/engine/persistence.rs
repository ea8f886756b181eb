//! Per-learner record persistence.
//!
//! One document per learner and operation holds the banks, curriculum state,
//! and rolling session history. Saves are optimistic: the caller presents
//! the version it loaded and a mismatch is a conflict, which keeps
//! concurrent sessions for the same learner from racing on bank mutation.
//! A real database plugs in by replacing `MemoryStore` with the same
//! surface.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::engine::banks::ProblemBanks;
use crate::engine::curriculum::CurriculumState;
use crate::engine::session::SessionSummary;
use crate::engine::types::Operation;
use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerRecord {
    pub learner_id: String,
    pub operation: Operation,
    pub banks: ProblemBanks,
    pub curriculum: CurriculumState,
    pub sessions: VecDeque<SessionSummary>,
    pub version: u64,
    pub updated_at_ms: i64,
}

impl LearnerRecord {
    pub fn new(
        learner_id: &str,
        operation: Operation,
        banks: ProblemBanks,
        curriculum: CurriculumState,
    ) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            operation,
            banks,
            curriculum,
            sessions: VecDeque::new(),
            version: 0,
            updated_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Appends a session summary, evicting the oldest beyond `cap`.
    pub fn push_session(&mut self, summary: SessionSummary, cap: usize) {
        self.sessions.push_back(summary);
        while self.sessions.len() > cap {
            self.sessions.pop_front();
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(String, Operation), LearnerRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&self, learner_id: &str, operation: Operation) -> Option<LearnerRecord> {
        let records = self.records.read().await;
        records.get(&(learner_id.to_string(), operation)).cloned()
    }

    /// Saves a record if its version still matches the stored one, bumping
    /// the version. Returns the new version.
    pub async fn save(&self, record: &LearnerRecord) -> Result<u64, EngineError> {
        let mut records = self.records.write().await;
        let key = (record.learner_id.clone(), record.operation);
        if let Some(existing) = records.get(&key) {
            if existing.version != record.version {
                return Err(EngineError::VersionConflict {
                    learner_id: record.learner_id.clone(),
                });
            }
        }
        let mut stored = record.clone();
        stored.version = record.version + 1;
        stored.updated_at_ms = chrono::Utc::now().timestamp_millis();
        let version = stored.version;
        records.insert(key, stored);
        Ok(version)
    }

    pub async fn operations_for(&self, learner_id: &str) -> Vec<Operation> {
        let records = self.records.read().await;
        records
            .keys()
            .filter(|(id, _)| id == learner_id)
            .map(|(_, op)| *op)
            .collect()
    }
}
