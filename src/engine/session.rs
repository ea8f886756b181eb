//! Daily practice session composition.
//!
//! Three rounds: learning (new facts), mixed practice (current sub-level
//! plus maintenance and optional challenge facts), and a short stratified
//! assessment. Sampling is without replacement, never errors on short
//! banks, and runs off an injected seedable RNG so compositions are
//! reproducible.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::SessionParams;
use crate::engine::banks::ProblemBanks;
use crate::engine::curriculum::{level_snapshot, Curriculum, CurriculumState, SubLevelConfig};
use crate::engine::types::{Band, Fact, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoundKind {
    Learning,
    MixedPractice,
    Assessment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RoundState {
    #[default]
    Pending,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactOutcome {
    pub correct: bool,
    pub response_time_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub kind: RoundKind,
    pub state: RoundState,
    pub targeted: Vec<String>,
    pub completed: Vec<String>,
    pub outcomes: Vec<(String, FactOutcome)>,
    pub accuracy: f64,
    pub time_spent_ms: i64,
}

impl Round {
    fn new(kind: RoundKind, targeted: Vec<String>) -> Self {
        Self {
            kind,
            state: RoundState::Pending,
            targeted,
            completed: Vec::new(),
            outcomes: Vec::new(),
            accuracy: 0.0,
            time_spent_ms: 0,
        }
    }

    pub fn begin(&mut self) {
        if self.state == RoundState::Pending {
            self.state = RoundState::InProgress;
        }
    }

    /// Records one answered fact. Ignores facts outside the round's targets.
    pub fn record(&mut self, fact_id: &str, outcome: FactOutcome) {
        if !self.targeted.iter().any(|id| id == fact_id) {
            return;
        }
        self.begin();
        if !self.completed.iter().any(|id| id == fact_id) {
            self.completed.push(fact_id.to_string());
        }
        self.outcomes.push((fact_id.to_string(), outcome));
        self.time_spent_ms += outcome.response_time_ms;
        let correct = self.outcomes.iter().filter(|(_, o)| o.correct).count();
        self.accuracy = correct as f64 / self.outcomes.len() as f64;
    }

    pub fn finish(&mut self) {
        self.state = RoundState::Complete;
    }

    pub fn is_complete(&self) -> bool {
        self.state == RoundState::Complete
    }
}

/// Observability record of how round 2 was put together.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RoundComposition {
    pub by_band: [usize; 5],
    pub maintenance: usize,
    pub challenge: usize,
    pub fast_tracked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeSession {
    pub id: String,
    pub learner_id: String,
    pub operation: Operation,
    pub sub_level: String,
    pub rounds: Vec<Round>,
    pub composition: RoundComposition,
    pub started_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<i64>,
    pub complete: bool,
}

impl PracticeSession {
    pub fn round(&self, kind: RoundKind) -> Option<&Round> {
        self.rounds.iter().find(|r| r.kind == kind)
    }

    pub fn round_mut(&mut self, kind: RoundKind) -> Option<&mut Round> {
        self.rounds.iter_mut().find(|r| r.kind == kind)
    }

    pub fn finalize(&mut self, now_ms: i64) {
        for round in &mut self.rounds {
            if round.state == RoundState::InProgress {
                round.finish();
            }
        }
        self.complete = self.rounds.iter().all(Round::is_complete);
        self.finished_at_ms = Some(now_ms);
    }

    pub fn summarize(&self) -> SessionSummary {
        let (mut answered, mut correct, mut time_ms) = (0usize, 0usize, 0i64);
        for round in &self.rounds {
            answered += round.outcomes.len();
            correct += round.outcomes.iter().filter(|(_, o)| o.correct).count();
            time_ms += round.time_spent_ms;
        }
        SessionSummary {
            session_id: self.id.clone(),
            operation: self.operation,
            started_at_ms: self.started_at_ms,
            rounds_completed: self.rounds.iter().filter(|r| r.is_complete()).count(),
            facts_answered: answered,
            accuracy: if answered == 0 {
                0.0
            } else {
                correct as f64 / answered as f64
            },
            time_spent_ms: time_ms,
            complete: self.complete,
        }
    }
}

/// Rolling per-session record kept on the learner document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub operation: Operation,
    pub started_at_ms: i64,
    pub rounds_completed: usize,
    pub facts_answered: usize,
    pub accuracy: f64,
    pub time_spent_ms: i64,
    pub complete: bool,
}

/// Challenge candidates for round 2: the next curriculum sub-level, or a
/// previously studied operation.
#[derive(Debug, Clone, Default)]
pub struct ChallengePool {
    pub next_level: Vec<Fact>,
    pub cross_operation: Vec<Fact>,
}

fn sample_ids<'a>(
    pool: impl Iterator<Item = &'a crate::engine::types::FactProgress>,
    count: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<String> {
    let mut ids: Vec<String> = pool.map(|p| p.fact_id().to_string()).collect();
    ids.shuffle(rng);
    ids.truncate(count);
    ids
}

/// Builds the three-round session from a bank snapshot. Requested counts
/// exceeding bank sizes take whatever is available.
pub fn compose_session(
    banks: &ProblemBanks,
    state: &CurriculumState,
    catalog: &Curriculum,
    challenge: Option<&ChallengePool>,
    params: &SessionParams,
    rng: &mut ChaCha8Rng,
    learner_id: &str,
    now_ms: i64,
) -> PracticeSession {
    let level = catalog.level(&state.current_level);
    let in_level = |p: &&crate::engine::types::FactProgress| {
        level.map(|l| l.contains(&p.fact)).unwrap_or(false)
    };
    let in_completed = |p: &&crate::engine::types::FactProgress| {
        state
            .completed
            .iter()
            .filter_map(|id| catalog.level(id))
            .any(|l| l.contains(&p.fact))
    };

    // Round 1: new facts from the current sub-level.
    let learning = sample_ids(
        banks.bank(Band::DoesNotKnow).iter().filter(in_level),
        params.learning_count,
        rng,
    );

    // Round 2: working facts, a maintenance slice, and challenge facts when
    // the learner is fast-tracking.
    let base = sample_ids(
        [Band::Emerging, Band::Approaching, Band::Proficient]
            .iter()
            .flat_map(|b| banks.bank(*b))
            .filter(in_level),
        params.practice_count,
        rng,
    );
    let maintenance = sample_ids(
        banks.iter_all().filter(in_completed),
        params.maintenance_count,
        rng,
    );

    let fast_tracked = level
        .map(|l| level_snapshot(banks, l).aggregate_pct >= params.fast_track_threshold)
        .unwrap_or(false);
    let challenge_ids: Vec<String> = if fast_tracked {
        match challenge {
            Some(pool) => {
                let source: &[Fact] = if !pool.next_level.is_empty() {
                    &pool.next_level
                } else {
                    &pool.cross_operation
                };
                if source.is_empty() {
                    tracing::warn!(learner_id, "no challenge facts available, composing without");
                    Vec::new()
                } else {
                    let mut facts: Vec<&Fact> = source.iter().collect();
                    facts.shuffle(rng);
                    facts
                        .into_iter()
                        .take(params.challenge_count)
                        .map(|f| f.id.clone())
                        .collect()
                }
            }
            None => {
                tracing::warn!(learner_id, "challenge source missing, composing without");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let mut composition = RoundComposition {
        maintenance: maintenance.len(),
        challenge: challenge_ids.len(),
        fast_tracked,
        ..Default::default()
    };
    let mut practice: Vec<String> = base;
    practice.extend(maintenance);
    practice.extend(challenge_ids);
    for id in &practice {
        if let Some(band) = banks.band_of(id) {
            composition.by_band[band.rank() as usize] += 1;
        }
    }
    practice.shuffle(rng);

    // Round 3: stratified assessment biased toward working facts.
    let mut assessment = sample_ids(
        banks.bank(Band::Emerging).iter().filter(in_level),
        params.assessment_emerging,
        rng,
    );
    assessment.extend(sample_ids(
        banks.bank(Band::Proficient).iter().filter(in_level),
        params.assessment_proficient,
        rng,
    ));
    assessment.extend(sample_ids(
        banks.bank(Band::Mastered).iter().filter(in_level),
        params.assessment_mastered,
        rng,
    ));
    assessment.shuffle(rng);

    tracing::debug!(
        learner_id,
        ?composition,
        learning = learning.len(),
        practice = practice.len(),
        assessment = assessment.len(),
        "composed session"
    );

    PracticeSession {
        id: uuid::Uuid::new_v4().to_string(),
        learner_id: learner_id.to_string(),
        operation: catalog.operation(),
        sub_level: state.current_level.clone(),
        rounds: vec![
            Round::new(RoundKind::Learning, learning),
            Round::new(RoundKind::MixedPractice, practice),
            Round::new(RoundKind::Assessment, assessment),
        ],
        composition,
        started_at_ms: now_ms,
        finished_at_ms: None,
        complete: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::curriculum::detect_gaps_and_backfill;
    use crate::engine::facts::OperandBounds;
    use crate::engine::types::{AttemptRecord, AttemptSource, FactProgress};
    use chrono::NaiveDate;
    use rand::SeedableRng;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn seeded() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    fn catalog() -> Curriculum {
        Curriculum::for_operation(
            Operation::Addition,
            OperandBounds::default_for(Operation::Addition),
        )
    }

    fn fresh_banks(catalog: &Curriculum, state: &CurriculumState) -> ProblemBanks {
        let mut banks = ProblemBanks::new();
        detect_gaps_and_backfill(&mut banks, state, catalog, date());
        banks
    }

    fn promote(banks: &mut ProblemBanks, id: &str, days: u32) {
        let params = crate::config::ClassifierParams::default();
        for day in 0..days {
            let when = date() + chrono::Days::new(day as u64);
            let record = AttemptRecord::new(day as i64, true, 2000, AttemptSource::Practice);
            banks.apply_attempt(id, record, when, &params).unwrap();
        }
    }

    #[test]
    fn round_counts_never_exceed_requests() {
        let catalog = catalog();
        let state = CurriculumState::new(&catalog);
        let banks = fresh_banks(&catalog, &state);
        let params = SessionParams::default();

        let session = compose_session(
            &banks, &state, &catalog, None, &params, &mut seeded(), "learner", 0,
        );
        let learning = session.round(RoundKind::Learning).unwrap();
        assert!(learning.targeted.len() <= params.learning_count);
        // Fresh banks hold only doesNotKnow facts, so rounds 2 and 3 are empty.
        assert!(session.round(RoundKind::MixedPractice).unwrap().targeted.is_empty());
        assert!(session.round(RoundKind::Assessment).unwrap().targeted.is_empty());
    }

    #[test]
    fn short_banks_yield_whole_bank() {
        let catalog = catalog();
        let state = CurriculumState::new(&catalog);
        let mut banks = ProblemBanks::new();
        let fact = crate::engine::types::Fact::new(Operation::Addition, 3, 4);
        banks.insert(FactProgress::new(fact, Band::DoesNotKnow, date()));

        let session = compose_session(
            &banks,
            &state,
            &catalog,
            None,
            &SessionParams::default(),
            &mut seeded(),
            "learner",
            0,
        );
        assert_eq!(session.round(RoundKind::Learning).unwrap().targeted.len(), 1);
    }

    #[test]
    fn same_seed_reproduces_composition() {
        let catalog = catalog();
        let state = CurriculumState::new(&catalog);
        let banks = fresh_banks(&catalog, &state);
        let params = SessionParams::default();

        let a = compose_session(&banks, &state, &catalog, None, &params, &mut seeded(), "l", 0);
        let b = compose_session(&banks, &state, &catalog, None, &params, &mut seeded(), "l", 0);
        for kind in [RoundKind::Learning, RoundKind::MixedPractice, RoundKind::Assessment] {
            assert_eq!(
                a.round(kind).unwrap().targeted,
                b.round(kind).unwrap().targeted
            );
        }
    }

    #[test]
    fn fast_track_adds_challenge_facts() {
        let catalog = catalog();
        let mut state = CurriculumState::new(&catalog);
        let mut banks = fresh_banks(&catalog, &state);

        // Push every current-level fact up so the fast-track condition holds.
        let ids: Vec<String> = banks.iter_all().map(|p| p.fact_id().to_string()).collect();
        for id in &ids {
            promote(&mut banks, id, 5);
        }
        state.completed.insert("add-0-placeholder".to_string());

        let next = catalog.level("add-2").unwrap();
        let pool = ChallengePool {
            next_level: catalog.facts_for(next),
            cross_operation: Vec::new(),
        };
        let params = SessionParams::default();
        let session = compose_session(
            &banks, &state, &catalog, Some(&pool), &params, &mut seeded(), "learner", 0,
        );
        assert!(session.composition.fast_tracked);
        assert_eq!(session.composition.challenge, params.challenge_count);
    }

    #[test]
    fn missing_challenge_source_degrades_softly() {
        let catalog = catalog();
        let state = CurriculumState::new(&catalog);
        let mut banks = fresh_banks(&catalog, &state);
        let ids: Vec<String> = banks.iter_all().map(|p| p.fact_id().to_string()).collect();
        for id in &ids {
            promote(&mut banks, id, 5);
        }

        let session = compose_session(
            &banks,
            &state,
            &catalog,
            None,
            &SessionParams::default(),
            &mut seeded(),
            "learner",
            0,
        );
        assert!(session.composition.fast_tracked);
        assert_eq!(session.composition.challenge, 0);
    }

    #[test]
    fn round_state_machine_tracks_outcomes() {
        let mut round = Round::new(
            RoundKind::Learning,
            vec!["add-3-4".to_string(), "add-4-5".to_string()],
        );
        assert_eq!(round.state, RoundState::Pending);

        round.record("add-3-4", FactOutcome { correct: true, response_time_ms: 2000 });
        assert_eq!(round.state, RoundState::InProgress);
        round.record("add-9-9", FactOutcome { correct: true, response_time_ms: 100 });
        assert_eq!(round.outcomes.len(), 1);

        round.record("add-4-5", FactOutcome { correct: false, response_time_ms: 4000 });
        round.finish();
        assert!(round.is_complete());
        assert!((round.accuracy - 0.5).abs() < f64::EPSILON);
        assert_eq!(round.time_spent_ms, 6000);
    }

    #[test]
    fn finalize_marks_session_complete_only_when_all_rounds_done() {
        let catalog = catalog();
        let state = CurriculumState::new(&catalog);
        let banks = fresh_banks(&catalog, &state);
        let mut session = compose_session(
            &banks,
            &state,
            &catalog,
            None,
            &SessionParams::default(),
            &mut seeded(),
            "learner",
            0,
        );

        session.rounds[0].begin();
        session.finalize(1000);
        // Pending rounds were never started, so the session stays incomplete.
        assert!(!session.complete);
        assert_eq!(session.finished_at_ms, Some(1000));

        for round in &mut session.rounds {
            round.begin();
            round.finish();
        }
        session.finalize(2000);
        assert!(session.complete);
    }
}
