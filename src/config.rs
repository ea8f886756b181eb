use serde::{Deserialize, Serialize};

/// Tunables for the proficiency classifier. The response-time cutoffs and the
/// mastery streak requirement vary between deployments, so they live here
/// rather than as constants next to the classification rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierParams {
    /// Average correct-response time at or below which a fact counts as fast.
    pub fast_ms: i64,
    /// Average correct-response time above which a fact is still shaky.
    pub slow_ms: i64,
    /// Correct answers (out of a full 5-attempt window) needed for proficient.
    pub proficient_min_correct: usize,
    /// Consecutive correct days required before a perfect window masters.
    pub mastered_min_streak_days: u32,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            fast_ms: 3000,
            slow_ms: 6000,
            proficient_min_correct: 4,
            mastered_min_streak_days: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionParams {
    /// Round 1: new facts introduced per session.
    pub learning_count: usize,
    /// Round 2: base mixed-practice draw from the current sub-level.
    pub practice_count: usize,
    /// Round 2: maintenance facts drawn from completed sub-levels.
    pub maintenance_count: usize,
    /// Round 2: challenge facts added under the fast-track condition.
    pub challenge_count: usize,
    /// In-level proficient+mastered share required to fast-track.
    pub fast_track_threshold: f64,
    /// Round 3 stratified draw.
    pub assessment_emerging: usize,
    pub assessment_proficient: usize,
    pub assessment_mastered: usize,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            learning_count: 3,
            practice_count: 8,
            maintenance_count: 2,
            challenge_count: 2,
            fast_track_threshold: 0.9,
            assessment_emerging: 5,
            assessment_proficient: 3,
            assessment_mastered: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementParams {
    /// Facts actually tested in a diagnostic run.
    pub sample_size: usize,
    /// Share of untested similar facts that inherit a tested fact's band.
    pub inherit_ratio: f64,
    /// Overall accuracy floors for each level.
    pub advanced_accuracy: f64,
    pub proficient_accuracy: f64,
    pub developing_accuracy: f64,
    /// Basic-category accuracy below this forces a foundational placement.
    pub basic_accuracy_floor: f64,
    /// Average response time ceiling for an advanced placement.
    pub advanced_max_avg_ms: i64,
}

impl Default for PlacementParams {
    fn default() -> Self {
        Self {
            sample_size: 20,
            inherit_ratio: 0.35,
            advanced_accuracy: 0.9,
            proficient_accuracy: 0.75,
            developing_accuracy: 0.5,
            basic_accuracy_floor: 0.6,
            advanced_max_avg_ms: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumParams {
    /// Share of sub-level facts at proficient or better to advance.
    pub advance_aggregate: f64,
    /// Share of sub-level facts mastered to advance.
    pub advance_mastery: f64,
}

impl Default for CurriculumParams {
    fn default() -> Self {
        Self {
            advance_aggregate: 0.8,
            advance_mastery: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentParams {
    /// Assumed correct-per-minute speed per band, doesNotKnow..mastered.
    pub band_cpm: [f64; 5],
    /// Weekly ramp toward the operation's final target rate.
    pub weekly_ramp: f64,
    /// Floor of the weekly ramp (week 0 fraction).
    pub ramp_base: f64,
}

impl Default for AssessmentParams {
    fn default() -> Self {
        Self {
            band_cpm: [4.0, 8.0, 12.0, 20.0, 30.0],
            weekly_ramp: 0.05,
            ramp_base: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub classifier: ClassifierParams,
    pub session: SessionParams,
    pub placement: PlacementParams,
    pub curriculum: CurriculumParams,
    pub assessment: AssessmentParams,
    /// Rolling session summaries kept on the learner record.
    pub session_history_cap: usize,
    /// Retries for optimistic save conflicts before giving up.
    pub save_retries: u32,
    /// Fixed RNG seed; None draws from entropy.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierParams::default(),
            session: SessionParams::default(),
            placement: PlacementParams::default(),
            curriculum: CurriculumParams::default(),
            assessment: AssessmentParams::default(),
            session_history_cap: 30,
            save_retries: 3,
            seed: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FLUENCY_FAST_MS") {
            if let Ok(ms) = val.parse() {
                config.classifier.fast_ms = ms;
            }
        }
        if let Ok(val) = std::env::var("FLUENCY_SLOW_MS") {
            if let Ok(ms) = val.parse() {
                config.classifier.slow_ms = ms;
            }
        }
        if let Ok(val) = std::env::var("FLUENCY_MASTERY_STREAK_DAYS") {
            if let Ok(days) = val.parse() {
                config.classifier.mastered_min_streak_days = days;
            }
        }
        if let Ok(val) = std::env::var("FLUENCY_DIAGNOSTIC_SAMPLE") {
            if let Ok(n) = val.parse() {
                config.placement.sample_size = n;
            }
        }
        if let Ok(val) = std::env::var("FLUENCY_SEED") {
            config.seed = val.parse().ok();
        }

        config
    }

    pub fn validate(&self) -> Result<(), crate::error::EngineError> {
        if self.classifier.fast_ms >= self.classifier.slow_ms {
            return Err(crate::error::EngineError::InvalidConfig(format!(
                "fast_ms ({}) must be below slow_ms ({})",
                self.classifier.fast_ms, self.classifier.slow_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.placement.inherit_ratio) {
            return Err(crate::error::EngineError::InvalidConfig(
                "inherit_ratio must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}
