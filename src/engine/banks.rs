//! Per-learner partition of known facts into proficiency banks.
//!
//! Every known fact lives in exactly one band sequence. `apply_attempt` is
//! the single authoritative mutation point: it feeds the ring buffer, reruns
//! the classifier, and moves the fact between banks on a band change. All
//! other components only read.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::config::ClassifierParams;
use crate::engine::classifier::{classify, trend_of};
use crate::engine::types::{AttemptRecord, Band, ErrorPattern, Fact, FactProgress, Trend};
use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemBanks {
    banks: BTreeMap<Band, Vec<FactProgress>>,
}

impl Default for ProblemBanks {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of recording one attempt against the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptOutcome {
    pub fact_id: String,
    pub previous_band: Band,
    pub new_band: Band,
    pub trend: Trend,
    /// Band rank increased.
    pub advanced: bool,
    /// Band rank decreased.
    pub regressed: bool,
}

impl ProblemBanks {
    pub fn new() -> Self {
        let mut banks = BTreeMap::new();
        for band in Band::ALL {
            banks.insert(band, Vec::new());
        }
        Self { banks }
    }

    /// Builds banks from existing progress entries, deduplicated by fact id
    /// (first occurrence wins).
    pub fn from_progress(entries: impl IntoIterator<Item = FactProgress>) -> Self {
        let mut banks = Self::new();
        for progress in entries {
            banks.insert(progress);
        }
        banks
    }

    /// Adds a progress entry under its current band. Returns false if the
    /// fact is already known.
    pub fn insert(&mut self, progress: FactProgress) -> bool {
        if self.contains(progress.fact_id()) {
            return false;
        }
        self.banks
            .entry(progress.band)
            .or_default()
            .push(progress);
        true
    }

    pub fn contains(&self, fact_id: &str) -> bool {
        self.find(fact_id).is_some()
    }

    pub fn find(&self, fact_id: &str) -> Option<&FactProgress> {
        self.banks
            .values()
            .flatten()
            .find(|p| p.fact_id() == fact_id)
    }

    pub fn band_of(&self, fact_id: &str) -> Option<Band> {
        self.banks
            .iter()
            .find(|(_, entries)| entries.iter().any(|p| p.fact_id() == fact_id))
            .map(|(band, _)| *band)
    }

    pub fn bank(&self, band: Band) -> &[FactProgress] {
        self.banks.get(&band).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, band: Band) -> usize {
        self.bank(band).len()
    }

    pub fn band_sizes(&self) -> [usize; 5] {
        let mut sizes = [0; 5];
        for (i, band) in Band::ALL.iter().enumerate() {
            sizes[i] = self.count(*band);
        }
        sizes
    }

    pub fn len(&self) -> usize {
        self.banks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter_all(&self) -> impl Iterator<Item = &FactProgress> {
        self.banks.values().flatten()
    }

    pub fn known_fact_ids(&self) -> HashSet<String> {
        self.iter_all().map(|p| p.fact_id().to_string()).collect()
    }

    /// Partition invariant: no fact id appears in two bands.
    pub fn is_partitioned(&self) -> bool {
        self.known_fact_ids().len() == self.len()
    }

    /// Records one attempt: appends to the fact's window (oldest evicted),
    /// reclassifies, and relocates the entry if its band changed. Unknown
    /// fact ids are a caller error.
    pub fn apply_attempt(
        &mut self,
        fact_id: &str,
        record: AttemptRecord,
        today: NaiveDate,
        params: &ClassifierParams,
    ) -> Result<AttemptOutcome, EngineError> {
        let previous_band = self.band_of(fact_id).ok_or_else(|| EngineError::UnknownFact {
            fact_id: fact_id.to_string(),
        })?;

        let entries = self.banks.entry(previous_band).or_default();
        let idx = entries
            .iter()
            .position(|p| p.fact_id() == fact_id)
            .ok_or_else(|| EngineError::UnknownFact {
                fact_id: fact_id.to_string(),
            })?;
        let progress = &mut entries[idx];

        progress.window.push(record);
        progress.total_attempts += 1;
        if record.correct {
            progress.total_correct += 1;
            progress.consecutive_correct_days = match progress.last_correct_date {
                Some(d) if d == today => progress.consecutive_correct_days.max(1),
                Some(d) if (today - d).num_days() == 1 => progress.consecutive_correct_days + 1,
                _ => 1,
            };
            progress.last_correct_date = Some(today);
        } else {
            progress.consecutive_correct_days = 0;
            tag_error_pattern(progress, &record);
        }

        let new_band = classify(&progress.window, progress.consecutive_correct_days, params);
        progress.trend = trend_of(&progress.window);
        let trend = progress.trend;

        if new_band == previous_band {
            progress.days_in_band = (today - progress.current_band_since).num_days().max(0) as u32;
            return Ok(AttemptOutcome {
                fact_id: fact_id.to_string(),
                previous_band,
                new_band,
                trend,
                advanced: false,
                regressed: false,
            });
        }

        let regressed = new_band.rank() < previous_band.rank();
        progress.band = new_band;
        progress.band_entered.entry(new_band).or_insert(today);
        progress.current_band_since = today;
        progress.days_in_band = 0;
        if regressed {
            progress.regression_count += 1;
            progress.flagged_for_review = true;
        }

        let moved = entries.remove(idx);
        self.banks.entry(new_band).or_default().push(moved);

        Ok(AttemptOutcome {
            fact_id: fact_id.to_string(),
            previous_band,
            new_band,
            trend,
            advanced: !regressed,
            regressed,
        })
    }
}

/// Tags recognizable mistakes so the curriculum can route the fact into
/// strategy instruction. Repeating the same pattern sets the flag.
fn tag_error_pattern(progress: &mut FactProgress, record: &AttemptRecord) {
    let Some(given) = record.answer_given else {
        return;
    };
    let pattern = detect_pattern(&progress.fact, given);
    if progress.error_pattern == Some(pattern) && pattern != ErrorPattern::Unknown {
        progress.needs_strategy_instruction = true;
    }
    progress.error_pattern = Some(pattern);
}

fn detect_pattern(fact: &Fact, given: i64) -> ErrorPattern {
    let answer = fact.answer as i64;
    if (given - answer).abs() == 1 {
        return ErrorPattern::OffByOne;
    }

    let a = fact.a as i64;
    let b = fact.b as i64;
    let mut alternates = vec![a + b, a * b];
    if a >= b {
        alternates.push(a - b);
    }
    if b != 0 && a % b == 0 {
        alternates.push(a / b);
    }
    if alternates.iter().any(|alt| *alt == given && *alt != answer) {
        return ErrorPattern::OperationConfusion;
    }

    ErrorPattern::Unknown
}
