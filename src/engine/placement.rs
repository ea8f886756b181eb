//! Placement diagnostic: stratified sampling, result analysis, and
//! similarity extrapolation into an initial set of problem banks.
//!
//! A small sample of real trials is stretched over the whole fact universe:
//! untested facts near a tested one (same category or fact family) partly
//! inherit its observed band, and the remainder falls to level-specific
//! percentage splits. The output is calibrated, not placeholder data.

use chrono::NaiveDate;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::{ClassifierParams, PlacementParams};
use crate::engine::banks::ProblemBanks;
use crate::engine::types::{
    AttemptRecord, AttemptSource, Band, Category, Fact, FactProgress,
};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlacementLevel {
    Foundational,
    Developing,
    Proficient,
    Advanced,
}

impl PlacementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Foundational => "foundational",
            Self::Developing => "developing",
            Self::Proficient => "proficient",
            Self::Advanced => "advanced",
        }
    }

    /// Percentage split (doesNotKnow..mastered) applied to facts that have
    /// no tested neighbor. Each vector sums to 100.
    pub fn band_split(&self) -> [u32; 5] {
        match self {
            Self::Foundational => [60, 25, 10, 5, 0],
            Self::Developing => [35, 30, 20, 10, 5],
            Self::Proficient => [15, 20, 30, 25, 10],
            Self::Advanced => [5, 10, 20, 35, 30],
        }
    }
}

/// Raw outcome of one diagnostic trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementResult {
    pub fact_id: String,
    pub correct: bool,
    pub response_time_ms: i64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub tested: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub avg_response_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementAnalysis {
    pub level: PlacementLevel,
    pub overall_accuracy: f64,
    pub avg_response_ms: f64,
    pub per_category: BTreeMap<Category, CategoryStats>,
    #[serde(skip)]
    pub initial_banks: ProblemBanks,
}

/// Stratified diagnostic sample: roughly `sample_size / categories` facts per
/// category, topped up from the remaining universe when a category runs
/// short.
pub fn sample_diagnostic(
    universe: &[Fact],
    sample_size: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<Fact> {
    let mut by_category: BTreeMap<Category, Vec<&Fact>> = BTreeMap::new();
    for fact in universe {
        by_category.entry(fact.category).or_default().push(fact);
    }
    if by_category.is_empty() || sample_size == 0 {
        return Vec::new();
    }

    let per_category = sample_size.div_ceil(by_category.len());
    let mut chosen: Vec<Fact> = Vec::new();
    let mut taken: HashSet<&str> = HashSet::new();
    for facts in by_category.values_mut() {
        facts.shuffle(rng);
        for fact in facts.iter().take(per_category) {
            if taken.insert(fact.id.as_str()) {
                chosen.push((*fact).clone());
            }
        }
    }

    if chosen.len() < sample_size {
        let mut leftovers: Vec<&Fact> = universe
            .iter()
            .filter(|f| !taken.contains(f.id.as_str()))
            .collect();
        leftovers.shuffle(rng);
        for fact in leftovers {
            if chosen.len() >= sample_size {
                break;
            }
            chosen.push(fact.clone());
        }
    }

    chosen.truncate(sample_size);
    chosen
}

/// Band a single diagnostic trial maps to.
fn band_from_trial(result: &PlacementResult, classifier: &ClassifierParams) -> Band {
    if !result.correct {
        return Band::DoesNotKnow;
    }
    if result.response_time_ms <= classifier.fast_ms {
        Band::Proficient
    } else if result.response_time_ms <= classifier.slow_ms {
        Band::Approaching
    } else {
        Band::Emerging
    }
}

fn derive_level(
    overall_accuracy: f64,
    avg_response_ms: f64,
    per_category: &BTreeMap<Category, CategoryStats>,
    params: &PlacementParams,
) -> PlacementLevel {
    // Weak basics dominate: a learner who cannot clear the basic categories
    // places foundational no matter the aggregate.
    let (basic_correct, basic_tested) = per_category
        .iter()
        .filter(|(c, _)| c.is_basic())
        .fold((0usize, 0usize), |(c, t), (_, s)| (c + s.correct, t + s.tested));
    if basic_tested > 0 {
        let basic_accuracy = basic_correct as f64 / basic_tested as f64;
        if basic_accuracy < params.basic_accuracy_floor {
            return PlacementLevel::Foundational;
        }
    }

    if overall_accuracy >= params.advanced_accuracy
        && avg_response_ms <= params.advanced_max_avg_ms as f64
    {
        PlacementLevel::Advanced
    } else if overall_accuracy >= params.proficient_accuracy {
        PlacementLevel::Proficient
    } else if overall_accuracy >= params.developing_accuracy {
        PlacementLevel::Developing
    } else {
        PlacementLevel::Foundational
    }
}

/// Analyzes diagnostic results and extrapolates an initial bank assignment
/// for the entire universe. Zero results is invalid input.
pub fn analyze(
    results: &[PlacementResult],
    universe: &[Fact],
    params: &PlacementParams,
    classifier: &ClassifierParams,
    rng: &mut ChaCha8Rng,
    today: NaiveDate,
) -> Result<PlacementAnalysis, EngineError> {
    if results.is_empty() {
        return Err(EngineError::EmptyDiagnostic);
    }

    let facts_by_id: HashMap<&str, &Fact> =
        universe.iter().map(|f| (f.id.as_str(), f)).collect();
    for result in results {
        if !facts_by_id.contains_key(result.fact_id.as_str()) {
            return Err(EngineError::UnknownFact {
                fact_id: result.fact_id.clone(),
            });
        }
    }

    let correct = results.iter().filter(|r| r.correct).count();
    let overall_accuracy = correct as f64 / results.len() as f64;
    let avg_response_ms = results.iter().map(|r| r.response_time_ms).sum::<i64>() as f64
        / results.len() as f64;

    let mut per_category: BTreeMap<Category, CategoryStats> = BTreeMap::new();
    for result in results {
        let fact = facts_by_id[result.fact_id.as_str()];
        let stats = per_category.entry(fact.category).or_default();
        stats.tested += 1;
        if result.correct {
            stats.correct += 1;
        }
        stats.avg_response_ms += result.response_time_ms as f64;
    }
    for stats in per_category.values_mut() {
        stats.accuracy = stats.correct as f64 / stats.tested as f64;
        stats.avg_response_ms /= stats.tested as f64;
    }

    let level = derive_level(overall_accuracy, avg_response_ms, &per_category, params);

    // Tested facts carry their trial into the window directly.
    let mut progress: Vec<FactProgress> = Vec::with_capacity(universe.len());
    let mut tested_bands: HashMap<&str, Band> = HashMap::new();
    for result in results {
        let fact = facts_by_id[result.fact_id.as_str()];
        let band = band_from_trial(result, classifier);
        tested_bands.insert(fact.id.as_str(), band);
        let mut entry = FactProgress::new(fact.clone(), band, today);
        entry.window.push(AttemptRecord::new(
            result.timestamp_ms,
            result.correct,
            result.response_time_ms,
            AttemptSource::Diagnostic,
        ));
        entry.total_attempts = 1;
        if result.correct {
            entry.total_correct = 1;
            entry.last_correct_date = Some(today);
            entry.consecutive_correct_days = 1;
        }
        progress.push(entry);
    }

    // Untested facts with a tested neighbor partly inherit its band.
    let mut similar: Vec<&Fact> = Vec::new();
    let mut unrelated: Vec<&Fact> = Vec::new();
    for fact in universe {
        if tested_bands.contains_key(fact.id.as_str()) {
            continue;
        }
        let has_neighbor = results.iter().any(|r| {
            let tested = facts_by_id[r.fact_id.as_str()];
            tested.category == fact.category || tested.family == fact.family
        });
        if has_neighbor {
            similar.push(fact);
        } else {
            unrelated.push(fact);
        }
    }

    similar.shuffle(rng);
    let inherit_count = (similar.len() as f64 * params.inherit_ratio).round() as usize;
    let mut remainder: Vec<&Fact> = Vec::new();
    for (i, fact) in similar.into_iter().enumerate() {
        if i < inherit_count {
            let band = neighbor_band(fact, results, &facts_by_id, &tested_bands);
            progress.push(FactProgress::new(fact.clone(), band, today));
        } else {
            remainder.push(fact);
        }
    }
    remainder.extend(unrelated);

    // The rest is spread by the level's percentage split.
    remainder.shuffle(rng);
    let split = level.band_split();
    let total = remainder.len();
    let mut counts = [0usize; 5];
    for (i, pct) in split.iter().enumerate() {
        counts[i] = total * *pct as usize / 100;
    }
    let assigned: usize = counts.iter().sum();
    if let Some(dominant) = split
        .iter()
        .enumerate()
        .max_by_key(|(_, pct)| **pct)
        .map(|(i, _)| i)
    {
        counts[dominant] += total - assigned;
    }

    let mut it = remainder.into_iter();
    for (i, band) in Band::ALL.iter().enumerate() {
        for _ in 0..counts[i] {
            if let Some(fact) = it.next() {
                progress.push(FactProgress::new(fact.clone(), *band, today));
            }
        }
    }
    // Rounding stragglers land in the lowest band.
    for fact in it {
        progress.push(FactProgress::new(fact.clone(), Band::DoesNotKnow, today));
    }

    let initial_banks = ProblemBanks::from_progress(progress);
    tracing::info!(
        level = level.as_str(),
        accuracy = overall_accuracy,
        facts = initial_banks.len(),
        "placement analysis complete"
    );

    Ok(PlacementAnalysis {
        level,
        overall_accuracy,
        avg_response_ms,
        per_category,
        initial_banks,
    })
}

/// Majority band among a fact's tested neighbors.
fn neighbor_band(
    fact: &Fact,
    results: &[PlacementResult],
    facts_by_id: &HashMap<&str, &Fact>,
    tested_bands: &HashMap<&str, Band>,
) -> Band {
    let mut votes: BTreeMap<Band, usize> = BTreeMap::new();
    for result in results {
        let tested = facts_by_id[result.fact_id.as_str()];
        if tested.category == fact.category || tested.family == fact.family {
            if let Some(band) = tested_bands.get(tested.id.as_str()) {
                *votes.entry(*band).or_default() += 1;
            }
        }
    }
    votes
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(band, _)| band)
        .unwrap_or(Band::DoesNotKnow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::facts::default_universe;
    use crate::engine::types::Operation;
    use rand::SeedableRng;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn seeded() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(11)
    }

    #[test]
    fn sample_is_stratified_and_deduplicated() {
        let universe = default_universe(Operation::Addition);
        let sample = sample_diagnostic(&universe, 20, &mut seeded());
        assert_eq!(sample.len(), 20);

        let ids: HashSet<&str> = sample.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids.len(), 20);

        let categories: HashSet<Category> = sample.iter().map(|f| f.category).collect();
        assert!(categories.len() >= 4, "sample covers categories");
    }

    #[test]
    fn sample_larger_than_universe_returns_universe() {
        let universe = default_universe(Operation::Division);
        let sample = sample_diagnostic(&universe, universe.len() + 50, &mut seeded());
        assert_eq!(sample.len(), universe.len());
    }

    #[test]
    fn empty_results_fail_fast() {
        let universe = default_universe(Operation::Addition);
        let err = analyze(
            &[],
            &universe,
            &PlacementParams::default(),
            &ClassifierParams::default(),
            &mut seeded(),
            date(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::EmptyDiagnostic));
    }

    #[test]
    fn weak_basics_force_foundational_level() {
        let universe = default_universe(Operation::Addition);
        let sample = sample_diagnostic(&universe, 20, &mut seeded());
        let facts_by_id: HashMap<&str, &Fact> =
            universe.iter().map(|f| (f.id.as_str(), f)).collect();

        // Exactly half correct overall, but basic categories mostly wrong.
        let mut results = Vec::new();
        let mut correct_budget = 10;
        for fact in &sample {
            let is_basic = facts_by_id[fact.id.as_str()].category.is_basic();
            let correct = if is_basic {
                false
            } else if correct_budget > 0 {
                correct_budget -= 1;
                true
            } else {
                false
            };
            results.push(PlacementResult {
                fact_id: fact.id.clone(),
                correct,
                response_time_ms: 3000,
                timestamp_ms: 0,
            });
        }

        let analysis = analyze(
            &results,
            &universe,
            &PlacementParams::default(),
            &ClassifierParams::default(),
            &mut seeded(),
            date(),
        )
        .unwrap();
        assert_eq!(analysis.level, PlacementLevel::Foundational);
    }

    #[test]
    fn extrapolation_covers_the_whole_universe() {
        let universe = default_universe(Operation::Addition);
        let sample = sample_diagnostic(&universe, 20, &mut seeded());
        let results: Vec<PlacementResult> = sample
            .iter()
            .map(|f| PlacementResult {
                fact_id: f.id.clone(),
                correct: true,
                response_time_ms: 2500,
                timestamp_ms: 0,
            })
            .collect();

        let analysis = analyze(
            &results,
            &universe,
            &PlacementParams::default(),
            &ClassifierParams::default(),
            &mut seeded(),
            date(),
        )
        .unwrap();
        assert_eq!(analysis.initial_banks.len(), universe.len());
        assert!(analysis.initial_banks.is_partitioned());
    }

    #[test]
    fn split_vectors_sum_to_one_hundred() {
        for level in [
            PlacementLevel::Foundational,
            PlacementLevel::Developing,
            PlacementLevel::Proficient,
            PlacementLevel::Advanced,
        ] {
            assert_eq!(level.band_split().iter().sum::<u32>(), 100);
        }
    }

    #[test]
    fn all_correct_fast_trials_place_advanced() {
        let universe = default_universe(Operation::Multiplication);
        let sample = sample_diagnostic(&universe, 20, &mut seeded());
        let results: Vec<PlacementResult> = sample
            .iter()
            .map(|f| PlacementResult {
                fact_id: f.id.clone(),
                correct: true,
                response_time_ms: 2000,
                timestamp_ms: 0,
            })
            .collect();

        let analysis = analyze(
            &results,
            &universe,
            &PlacementParams::default(),
            &ClassifierParams::default(),
            &mut seeded(),
            date(),
        )
        .unwrap();
        assert_eq!(analysis.level, PlacementLevel::Advanced);
        // Tested facts landed in proficient with their trial on record.
        let tested = analysis.initial_banks.find(&sample[0].id).unwrap();
        assert_eq!(tested.band, Band::Proficient);
        assert_eq!(tested.window.len(), 1);
    }

    #[test]
    fn unknown_result_id_is_an_error() {
        let universe = default_universe(Operation::Addition);
        let results = vec![PlacementResult {
            fact_id: "mul-99-99".to_string(),
            correct: true,
            response_time_ms: 1000,
            timestamp_ms: 0,
        }];
        let err = analyze(
            &results,
            &universe,
            &PlacementParams::default(),
            &ClassifierParams::default(),
            &mut seeded(),
            date(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::UnknownFact { .. }));
    }
}
