//! Ordered sub-level curriculum per operation, gap detection, and
//! advancement.
//!
//! Sub-levels group the fact universe by category. Gap-filling makes the
//! store self-healing against incomplete historical data: any fact a learner
//! should already have seen is inserted fresh at `doesNotKnow`, keyed by fact
//! id so repeated runs add nothing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::CurriculumParams;
use crate::engine::banks::ProblemBanks;
use crate::engine::facts::{generate, OperandBounds};
use crate::engine::types::{Band, Category, Fact, FactProgress, Operation};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubLevelConfig {
    pub id: String,
    pub operation: Operation,
    pub order: usize,
    pub label: String,
    pub categories: Vec<Category>,
    pub expected_facts: usize,
}

impl SubLevelConfig {
    pub fn contains(&self, fact: &Fact) -> bool {
        self.categories.contains(&fact.category)
    }
}

/// Static ordered catalog of sub-levels for one operation.
#[derive(Debug, Clone)]
pub struct Curriculum {
    operation: Operation,
    bounds: OperandBounds,
    levels: Vec<SubLevelConfig>,
}

fn level_plan(operation: Operation) -> Vec<(&'static str, Vec<Category>)> {
    match operation {
        Operation::Addition => vec![
            ("Sums within 10", vec![Category::SumsTo10]),
            ("Doubles and near doubles", vec![Category::Doubles, Category::NearDoubles]),
            ("Crossing 10", vec![Category::Crossing10]),
            ("Sums to 20", vec![Category::SumsTo20]),
        ],
        Operation::Subtraction => vec![
            ("Within 10", vec![Category::SubWithin10]),
            ("From the teens", vec![Category::SubFromTeens]),
            ("Crossing down through 10", vec![Category::SubCrossing10]),
        ],
        Operation::Multiplication => vec![
            ("Tables of 2, 5 and 10", vec![Category::TimesTwoFiveTen]),
            ("Square facts", vec![Category::Squares]),
            ("Tables of 3, 4 and 6", vec![Category::TimesCore]),
            ("Hard tables", vec![Category::TimesHard]),
        ],
        Operation::Division => vec![
            ("Dividing by 2, 5 and 10", vec![Category::DivByTwoFiveTen]),
            ("Dividing by 3, 4 and 6", vec![Category::DivByCore]),
            ("Hard divisors", vec![Category::DivByHard]),
        ],
    }
}

impl Curriculum {
    pub fn for_operation(operation: Operation, bounds: OperandBounds) -> Self {
        let universe = generate(operation, bounds);
        let levels = level_plan(operation)
            .into_iter()
            .enumerate()
            .map(|(order, (label, categories))| {
                let expected_facts = universe
                    .iter()
                    .filter(|f| categories.contains(&f.category))
                    .count();
                SubLevelConfig {
                    id: format!("{}-{}", operation.code(), order + 1),
                    operation,
                    order,
                    label: label.to_string(),
                    categories,
                    expected_facts,
                }
            })
            .collect();
        Self {
            operation,
            bounds,
            levels,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn levels(&self) -> &[SubLevelConfig] {
        &self.levels
    }

    pub fn level(&self, id: &str) -> Option<&SubLevelConfig> {
        self.levels.iter().find(|l| l.id == id)
    }

    pub fn first(&self) -> &SubLevelConfig {
        &self.levels[0]
    }

    pub fn next_after(&self, id: &str) -> Option<&SubLevelConfig> {
        let order = self.level(id)?.order;
        self.levels.iter().find(|l| l.order == order + 1)
    }

    /// All universe facts belonging to one sub-level.
    pub fn facts_for(&self, level: &SubLevelConfig) -> Vec<Fact> {
        generate(self.operation, self.bounds)
            .into_iter()
            .filter(|f| level.contains(f))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LevelSnapshot {
    /// Share of sub-level facts at proficient or better.
    pub aggregate_pct: f64,
    /// Share of sub-level facts mastered.
    pub mastery_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumState {
    pub current_level: String,
    pub completed: BTreeSet<String>,
    pub snapshots: BTreeMap<String, LevelSnapshot>,
}

impl CurriculumState {
    pub fn new(catalog: &Curriculum) -> Self {
        Self {
            current_level: catalog.first().id.clone(),
            completed: BTreeSet::new(),
            snapshots: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancementInfo {
    pub advanced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_level: Option<String>,
    pub current_level: String,
    pub snapshot: LevelSnapshot,
}

/// Proficiency snapshot of one sub-level from the current banks.
pub fn level_snapshot(banks: &ProblemBanks, level: &SubLevelConfig) -> LevelSnapshot {
    let mut total = 0usize;
    let mut at_least_proficient = 0usize;
    let mut mastered = 0usize;
    for progress in banks.iter_all().filter(|p| level.contains(&p.fact)) {
        total += 1;
        if progress.band >= Band::Proficient {
            at_least_proficient += 1;
        }
        if progress.band == Band::Mastered {
            mastered += 1;
        }
    }
    if total == 0 {
        return LevelSnapshot::default();
    }
    LevelSnapshot {
        aggregate_pct: at_least_proficient as f64 / total as f64,
        mastery_pct: mastered as f64 / total as f64,
    }
}

/// Inserts a fresh `doesNotKnow` entry for every fact missing from any
/// sub-level at or before the learner's current position. Returns the ids
/// added; running it again adds nothing.
pub fn detect_gaps_and_backfill(
    banks: &mut ProblemBanks,
    state: &CurriculumState,
    catalog: &Curriculum,
    today: NaiveDate,
) -> Vec<String> {
    let current_order = catalog
        .level(&state.current_level)
        .map(|l| l.order)
        .unwrap_or(0);

    let mut added = Vec::new();
    for level in catalog.levels().iter().filter(|l| l.order <= current_order) {
        let known = banks.iter_all().filter(|p| level.contains(&p.fact)).count();
        if known >= level.expected_facts {
            continue;
        }
        for fact in catalog.facts_for(level) {
            if banks.contains(&fact.id) {
                continue;
            }
            let id = fact.id.clone();
            banks.insert(FactProgress::new(fact, Band::DoesNotKnow, today));
            added.push(id);
        }
    }

    if !added.is_empty() {
        tracing::info!(
            operation = %catalog.operation(),
            count = added.len(),
            "backfilled curriculum gaps"
        );
    }
    added
}

/// Refreshes the current sub-level snapshot and advances the learner when
/// the configured thresholds are met. The final sub-level can complete
/// without a successor.
pub fn evaluate_advancement(
    banks: &ProblemBanks,
    state: &mut CurriculumState,
    catalog: &Curriculum,
    params: &CurriculumParams,
) -> AdvancementInfo {
    let Some(level) = catalog.level(&state.current_level) else {
        return AdvancementInfo {
            advanced: false,
            completed_level: None,
            current_level: state.current_level.clone(),
            snapshot: LevelSnapshot::default(),
        };
    };

    let snapshot = level_snapshot(banks, level);
    state.snapshots.insert(level.id.clone(), snapshot);

    let ready = snapshot.aggregate_pct >= params.advance_aggregate
        && snapshot.mastery_pct >= params.advance_mastery
        && banks.iter_all().any(|p| level.contains(&p.fact));

    if !ready {
        return AdvancementInfo {
            advanced: false,
            completed_level: None,
            current_level: state.current_level.clone(),
            snapshot,
        };
    }

    let completed = level.id.clone();
    state.completed.insert(completed.clone());
    if let Some(next) = catalog.next_after(&completed) {
        state.current_level = next.id.clone();
    }
    tracing::info!(level = %completed, next = %state.current_level, "sub-level completed");

    AdvancementInfo {
        advanced: true,
        completed_level: Some(completed),
        current_level: state.current_level.clone(),
        snapshot,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::AttemptRecord;
    use crate::engine::types::AttemptSource;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn addition_catalog() -> Curriculum {
        Curriculum::for_operation(Operation::Addition, OperandBounds::default_for(Operation::Addition))
    }

    #[test]
    fn catalog_orders_levels_and_counts_facts() {
        let catalog = addition_catalog();
        assert_eq!(catalog.levels().len(), 4);
        for (i, level) in catalog.levels().iter().enumerate() {
            assert_eq!(level.order, i);
            assert!(level.expected_facts > 0, "empty level {}", level.id);
            assert_eq!(catalog.facts_for(level).len(), level.expected_facts);
        }
        assert_eq!(catalog.first().id, "add-1");
        assert_eq!(catalog.next_after("add-1").unwrap().id, "add-2");
        assert!(catalog.next_after("add-4").is_none());
    }

    #[test]
    fn backfill_fills_current_and_earlier_levels_only() {
        let catalog = addition_catalog();
        let mut state = CurriculumState::new(&catalog);
        state.current_level = "add-2".to_string();

        let mut banks = ProblemBanks::new();
        let added = detect_gaps_and_backfill(&mut banks, &state, &catalog, date());

        let expected: usize = catalog
            .levels()
            .iter()
            .filter(|l| l.order <= 1)
            .map(|l| l.expected_facts)
            .sum();
        assert_eq!(added.len(), expected);
        assert_eq!(banks.len(), expected);
        assert!(banks.iter_all().all(|p| p.band == Band::DoesNotKnow));
    }

    #[test]
    fn backfill_is_idempotent() {
        let catalog = addition_catalog();
        let state = CurriculumState::new(&catalog);
        let mut banks = ProblemBanks::new();

        let first = detect_gaps_and_backfill(&mut banks, &state, &catalog, date());
        assert!(!first.is_empty());
        let second = detect_gaps_and_backfill(&mut banks, &state, &catalog, date());
        assert!(second.is_empty());
        assert!(banks.is_partitioned());
    }

    #[test]
    fn advancement_requires_thresholds() {
        let catalog = addition_catalog();
        let mut state = CurriculumState::new(&catalog);
        let mut banks = ProblemBanks::new();
        detect_gaps_and_backfill(&mut banks, &state, &catalog, date());

        let info = evaluate_advancement(&banks, &mut state, &catalog, &CurriculumParams::default());
        assert!(!info.advanced);
        assert_eq!(state.current_level, "add-1");
    }

    #[test]
    fn advancement_moves_to_next_level() {
        let catalog = addition_catalog();
        let mut state = CurriculumState::new(&catalog);
        let mut banks = ProblemBanks::new();
        detect_gaps_and_backfill(&mut banks, &state, &catalog, date());

        // Master every fact of the first sub-level.
        let params = crate::config::ClassifierParams::default();
        let level_one = catalog.level("add-1").unwrap().clone();
        let ids: Vec<String> = banks
            .iter_all()
            .filter(|p| level_one.contains(&p.fact))
            .map(|p| p.fact_id().to_string())
            .collect();
        for id in &ids {
            for day in 2..=7 {
                let record = AttemptRecord::new(day as i64, true, 2000, AttemptSource::Practice);
                let when = NaiveDate::from_ymd_opt(2026, 3, day).unwrap();
                banks.apply_attempt(id, record, when, &params).unwrap();
            }
        }

        let info = evaluate_advancement(&banks, &mut state, &catalog, &CurriculumParams::default());
        assert!(info.advanced);
        assert_eq!(info.completed_level.as_deref(), Some("add-1"));
        assert_eq!(state.current_level, "add-2");
        assert!(state.completed.contains("add-1"));
        assert!(info.snapshot.mastery_pct >= 0.4);
    }
}
