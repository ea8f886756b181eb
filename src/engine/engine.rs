//! Engine facade: the external interface the surrounding application calls.
//!
//! Core algorithms stay pure and synchronous; this layer owns the async
//! boundary around the record store. Mutating operations follow an
//! optimistic read-modify-write discipline with bounded retry, since
//! attempt application is not commutative across out-of-order replays.

use chrono::NaiveDate;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::EngineConfig;
use crate::engine::assessment::{
    distribute, expected_cpm, select_facts, target_cpm, AssessmentMetrics, BandCounts,
};
use crate::engine::banks::{AttemptOutcome, ProblemBanks};
use crate::engine::curriculum::{
    detect_gaps_and_backfill, evaluate_advancement, AdvancementInfo, Curriculum, CurriculumState,
};
use crate::engine::facts::{default_universe, OperandBounds};
use crate::engine::placement::{analyze, sample_diagnostic, PlacementAnalysis, PlacementResult};
use crate::engine::session::{compose_session, ChallengePool, PracticeSession, SessionSummary};
use crate::engine::types::{AttemptRecord, Band, Fact, Operation};
use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFinish {
    pub summary: SessionSummary,
    pub advancement: AdvancementInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentPlan {
    pub facts: Vec<Fact>,
    pub counts: BandCounts,
    pub metrics: AssessmentMetrics,
}

pub struct FluencyEngine {
    config: EngineConfig,
    store: Arc<crate::engine::persistence::MemoryStore>,
    rng: Mutex<ChaCha8Rng>,
}

impl FluencyEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_store(config, Arc::new(crate::engine::persistence::MemoryStore::new()))
    }

    pub fn with_store(
        config: EngineConfig,
        store: Arc<crate::engine::persistence::MemoryStore>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Ok(Self {
            config,
            store,
            rng: Mutex::new(rng),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<crate::engine::persistence::MemoryStore> {
        Arc::clone(&self.store)
    }

    fn catalog(&self, operation: Operation) -> Curriculum {
        Curriculum::for_operation(operation, OperandBounds::default_for(operation))
    }

    pub async fn load_banks(
        &self,
        learner_id: &str,
        operation: Operation,
    ) -> Result<ProblemBanks, EngineError> {
        self.load_record(learner_id, operation)
            .await
            .map(|r| r.banks)
    }

    /// Replaces a learner's banks, creating the record on first save.
    pub async fn save_banks(
        &self,
        learner_id: &str,
        operation: Operation,
        banks: ProblemBanks,
    ) -> Result<(), EngineError> {
        let mut record = match self.store.load(learner_id, operation).await {
            Some(record) => record,
            None => crate::engine::persistence::LearnerRecord::new(
                learner_id,
                operation,
                ProblemBanks::new(),
                CurriculumState::new(&self.catalog(operation)),
            ),
        };
        record.banks = banks;
        self.store.save(&record).await?;
        Ok(())
    }

    /// Facts to present in a placement diagnostic, stratified by category.
    pub async fn diagnostic_facts(&self, operation: Operation) -> Vec<Fact> {
        let universe = default_universe(operation);
        let mut rng = self.rng.lock().await;
        sample_diagnostic(&universe, self.config.placement.sample_size, &mut rng)
    }

    /// Analyzes collected diagnostic results and writes the learner's
    /// initial banks and curriculum state.
    pub async fn run_diagnostic(
        &self,
        learner_id: &str,
        operation: Operation,
        results: &[PlacementResult],
    ) -> Result<PlacementAnalysis, EngineError> {
        let universe = default_universe(operation);
        let today = chrono::Utc::now().date_naive();
        let analysis = {
            let mut rng = self.rng.lock().await;
            analyze(
                results,
                &universe,
                &self.config.placement,
                &self.config.classifier,
                &mut rng,
                today,
            )?
        };

        let catalog = self.catalog(operation);
        let mut record = crate::engine::persistence::LearnerRecord::new(
            learner_id,
            operation,
            analysis.initial_banks.clone(),
            CurriculumState::new(&catalog),
        );
        if let Some(existing) = self.store.load(learner_id, operation).await {
            record.version = existing.version;
            record.sessions = existing.sessions;
        }
        self.store.save(&record).await?;
        Ok(analysis)
    }

    /// Prepares the day's three-round practice session. Gap-fill runs first
    /// and its persistence failure never blocks composition.
    pub async fn start_session(
        &self,
        learner_id: &str,
        operation: Operation,
    ) -> Result<PracticeSession, EngineError> {
        let mut record = self.load_record(learner_id, operation).await?;
        let catalog = self.catalog(operation);
        let today = chrono::Utc::now().date_naive();

        let added = detect_gaps_and_backfill(&mut record.banks, &record.curriculum, &catalog, today);
        if !added.is_empty() {
            if let Err(err) = self.store.save(&record).await {
                tracing::warn!(
                    learner_id,
                    error = %err,
                    "gap-fill save failed, session proceeds; retried next visit"
                );
            }
        }

        let challenge = self.challenge_pool(learner_id, &record.curriculum, &catalog).await;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut rng = self.rng.lock().await;
        Ok(compose_session(
            &record.banks,
            &record.curriculum,
            &catalog,
            Some(&challenge),
            &self.config.session,
            &mut rng,
            learner_id,
            now_ms,
        ))
    }

    /// Challenge candidates: the next sub-level when one exists, otherwise
    /// strong facts from another operation the learner has studied.
    async fn challenge_pool(
        &self,
        learner_id: &str,
        state: &CurriculumState,
        catalog: &Curriculum,
    ) -> ChallengePool {
        let next_level = catalog
            .next_after(&state.current_level)
            .map(|level| catalog.facts_for(level))
            .unwrap_or_default();

        let mut cross_operation = Vec::new();
        if next_level.is_empty() {
            for other in self.store.operations_for(learner_id).await {
                if other == catalog.operation() {
                    continue;
                }
                if let Some(record) = self.store.load(learner_id, other).await {
                    cross_operation.extend(
                        record
                            .banks
                            .bank(Band::Proficient)
                            .iter()
                            .chain(record.banks.bank(Band::Mastered))
                            .map(|p| p.fact.clone()),
                    );
                }
            }
        }

        ChallengePool {
            next_level,
            cross_operation,
        }
    }

    /// Records one timed attempt, dated today.
    pub async fn record_attempt(
        &self,
        learner_id: &str,
        fact_id: &str,
        record: AttemptRecord,
    ) -> Result<AttemptOutcome, EngineError> {
        self.record_attempt_on(learner_id, fact_id, record, chrono::Utc::now().date_naive())
            .await
    }

    /// Records an attempt against an explicit date. The single bank
    /// mutation path; retried on optimistic conflicts.
    pub async fn record_attempt_on(
        &self,
        learner_id: &str,
        fact_id: &str,
        record: AttemptRecord,
        today: NaiveDate,
    ) -> Result<AttemptOutcome, EngineError> {
        let operation = operation_of_fact(fact_id)?;
        let mut last_err = None;
        for _ in 0..=self.config.save_retries {
            let mut learner = self.load_record(learner_id, operation).await?;
            let outcome =
                learner
                    .banks
                    .apply_attempt(fact_id, record, today, &self.config.classifier)?;
            match self.store.save(&learner).await {
                Ok(_) => return Ok(outcome),
                Err(EngineError::VersionConflict { .. }) => {
                    last_err = Some(EngineError::VersionConflict {
                        learner_id: learner_id.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or(EngineError::VersionConflict {
            learner_id: learner_id.to_string(),
        }))
    }

    /// Finalizes a session: persists its summary and evaluates curriculum
    /// advancement.
    pub async fn finish_session(
        &self,
        learner_id: &str,
        mut session: PracticeSession,
    ) -> Result<SessionFinish, EngineError> {
        let operation = session.operation;
        session.finalize(chrono::Utc::now().timestamp_millis());
        let summary = session.summarize();
        let catalog = self.catalog(operation);

        let mut last_err = None;
        for _ in 0..=self.config.save_retries {
            let mut record = self.load_record(learner_id, operation).await?;
            let advancement = evaluate_advancement(
                &record.banks,
                &mut record.curriculum,
                &catalog,
                &self.config.curriculum,
            );
            record.push_session(summary.clone(), self.config.session_history_cap);
            match self.store.save(&record).await {
                Ok(_) => {
                    return Ok(SessionFinish {
                        summary,
                        advancement,
                    })
                }
                Err(EngineError::VersionConflict { .. }) => {
                    last_err = Some(EngineError::VersionConflict {
                        learner_id: learner_id.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or(EngineError::VersionConflict {
            learner_id: learner_id.to_string(),
        }))
    }

    /// Builds a printed/offline assessment for the given program week.
    pub async fn generate_assessment(
        &self,
        learner_id: &str,
        operation: Operation,
        week: u32,
        total_facts: usize,
    ) -> Result<AssessmentPlan, EngineError> {
        let record = self.load_record(learner_id, operation).await?;
        let counts = distribute(&record.banks, week, total_facts);
        let facts = {
            let mut rng = self.rng.lock().await;
            select_facts(&record.banks, &counts, &mut rng)
        };
        let metrics = AssessmentMetrics {
            expected_cpm: expected_cpm(&counts, &self.config.assessment),
            target_cpm: target_cpm(operation, week, &self.config.assessment),
            shortfall: counts.shortfall,
        };
        Ok(AssessmentPlan {
            facts,
            counts,
            metrics,
        })
    }

    async fn load_record(
        &self,
        learner_id: &str,
        operation: Operation,
    ) -> Result<crate::engine::persistence::LearnerRecord, EngineError> {
        self.store
            .load(learner_id, operation)
            .await
            .ok_or_else(|| EngineError::BanksNotFound {
                learner_id: learner_id.to_string(),
                operation,
            })
    }
}

fn operation_of_fact(fact_id: &str) -> Result<Operation, EngineError> {
    fact_id
        .split('-')
        .next()
        .and_then(Operation::parse)
        .ok_or_else(|| EngineError::UnknownFact {
            fact_id: fact_id.to_string(),
        })
}
