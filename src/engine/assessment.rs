//! Week-indexed assessment distribution.
//!
//! A printed assessment of `total` facts is split across bands by a
//! five-phase weekly schedule. Targets are floored, capped by bank
//! availability, and any shortfall is redistributed in a fixed priority
//! order; an under-filled assessment is reported, never an error.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::AssessmentParams;
use crate::engine::banks::ProblemBanks;
use crate::engine::types::{Band, Fact, Operation};

/// Redistribution order when a band cannot fill its target.
const REDISTRIBUTION_PRIORITY: [Band; 5] = [
    Band::Approaching,
    Band::Proficient,
    Band::Emerging,
    Band::Mastered,
    Band::DoesNotKnow,
];

/// Target percentages per band (doesNotKnow..mastered) for each phase of the
/// program. Every vector sums to 100.
pub fn phase_percentages(week: u32) -> [u32; 5] {
    match week {
        0..=2 => [20, 40, 25, 10, 5],
        3..=4 => [10, 30, 30, 20, 10],
        5..=6 => [5, 20, 30, 30, 15],
        7..=8 => [5, 10, 25, 35, 25],
        _ => [0, 10, 20, 35, 35],
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BandCounts {
    /// Facts drawn per band, doesNotKnow..mastered.
    pub counts: [usize; 5],
    pub requested: usize,
    /// Requested facts that no bank had capacity for.
    pub shortfall: usize,
}

impl BandCounts {
    pub fn count(&self, band: Band) -> usize {
        self.counts[band.rank() as usize]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Computes per-band counts for a `total`-fact assessment in `week`.
pub fn distribute(banks: &ProblemBanks, week: u32, total: usize) -> BandCounts {
    let percentages = phase_percentages(week);
    let sizes = banks.band_sizes();

    let mut counts = [0usize; 5];
    for (i, pct) in percentages.iter().enumerate() {
        counts[i] = (total * *pct as usize / 100).min(sizes[i]);
    }

    let mut remaining = total.saturating_sub(counts.iter().sum());
    for band in REDISTRIBUTION_PRIORITY {
        if remaining == 0 {
            break;
        }
        let i = band.rank() as usize;
        let capacity = sizes[i].saturating_sub(counts[i]);
        let take = capacity.min(remaining);
        counts[i] += take;
        remaining -= take;
    }

    if remaining > 0 {
        tracing::debug!(week, total, shortfall = remaining, "assessment under-filled");
    }

    BandCounts {
        counts,
        requested: total,
        shortfall: remaining,
    }
}

/// Draws the concrete facts matching a distribution, shuffled for printing.
pub fn select_facts(banks: &ProblemBanks, counts: &BandCounts, rng: &mut ChaCha8Rng) -> Vec<Fact> {
    let mut facts = Vec::with_capacity(counts.total());
    for band in Band::ALL {
        let mut pool: Vec<&Fact> = banks.bank(band).iter().map(|p| &p.fact).collect();
        pool.shuffle(rng);
        facts.extend(pool.into_iter().take(counts.count(band)).cloned());
    }
    facts.shuffle(rng);
    facts
}

/// Expected correct-per-minute over an assessment, from the weighted average
/// of per-band assumed speeds.
pub fn expected_cpm(counts: &BandCounts, params: &AssessmentParams) -> f64 {
    let total = counts.total();
    if total == 0 {
        return 0.0;
    }
    let weighted: f64 = counts
        .counts
        .iter()
        .zip(params.band_cpm.iter())
        .map(|(n, cpm)| *n as f64 * cpm)
        .sum();
    weighted / total as f64
}

/// Final fluency rate an operation builds toward.
pub fn final_target_cpm(operation: Operation) -> f64 {
    match operation {
        Operation::Addition => 40.0,
        Operation::Subtraction => 35.0,
        Operation::Multiplication => 30.0,
        Operation::Division => 25.0,
    }
}

/// Week-indexed fraction of the operation's final target rate.
pub fn target_cpm(operation: Operation, week: u32, params: &AssessmentParams) -> f64 {
    let fraction = (params.ramp_base + params.weekly_ramp * week as f64).min(1.0);
    final_target_cpm(operation) * fraction
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentMetrics {
    pub expected_cpm: f64,
    pub target_cpm: f64,
    pub shortfall: usize,
}
