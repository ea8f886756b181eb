//! Property-based tests for the store and distribution invariants:
//! - Partition: every known fact sits in exactly one band sequence.
//! - Ring bound: attempt windows never exceed five entries, FIFO eviction.
//! - Classifier determinism over arbitrary windows.
//! - Assessment distribution never exceeds bank capacity and accounts for
//!   every requested fact as either drawn or shortfall.

use chrono::NaiveDate;
use proptest::prelude::*;

use fluency_engine::config::ClassifierParams;
use fluency_engine::engine::assessment::distribute;
use fluency_engine::engine::banks::ProblemBanks;
use fluency_engine::engine::classifier::{classify, trend_of};
use fluency_engine::engine::facts::default_universe;
use fluency_engine::engine::types::{
    AttemptRecord, AttemptSource, AttemptWindow, Band, FactProgress, Operation,
};

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
}

/// (correct, response_time_ms, day_offset) triples.
fn arb_attempts() -> impl Strategy<Value = Vec<(bool, i64, u64)>> {
    proptest::collection::vec((any::<bool>(), 500i64..12_000, 0u64..40), 0..40)
}

fn arb_band_sizes() -> impl Strategy<Value = [usize; 5]> {
    [0usize..40, 0usize..40, 0usize..40, 0usize..40, 0usize..40]
}

fn banks_with_sizes(sizes: [usize; 5]) -> ProblemBanks {
    let universe: Vec<_> = Operation::ALL
        .iter()
        .flat_map(|op| default_universe(*op))
        .collect();
    let mut banks = ProblemBanks::new();
    let mut it = universe.into_iter();
    for (i, band) in Band::ALL.iter().enumerate() {
        for _ in 0..sizes[i] {
            let fact = it.next().expect("combined universe large enough");
            banks.insert(FactProgress::new(fact, *band, base_date()));
        }
    }
    banks
}

proptest! {
    #[test]
    fn partition_and_ring_bound_hold_under_any_attempt_stream(
        attempts in arb_attempts(),
        fact_picks in proptest::collection::vec(0usize..6, 0..40),
    ) {
        let universe = default_universe(Operation::Multiplication);
        let mut banks = ProblemBanks::new();
        for fact in universe.iter().take(6) {
            banks.insert(FactProgress::new(fact.clone(), Band::DoesNotKnow, base_date()));
        }
        let total = banks.len();
        let params = ClassifierParams::default();

        for (i, (correct, ms, day)) in attempts.iter().enumerate() {
            let pick = fact_picks.get(i % fact_picks.len().max(1)).copied().unwrap_or(0);
            let fact_id = universe[pick % 6].id.clone();
            let record = AttemptRecord::new(i as i64, *correct, *ms, AttemptSource::Practice);
            let when = base_date() + chrono::Days::new(*day);
            banks.apply_attempt(&fact_id, record, when, &params).unwrap();
        }

        prop_assert!(banks.is_partitioned());
        prop_assert_eq!(banks.len(), total);
        for progress in banks.iter_all() {
            prop_assert!(progress.window.len() <= AttemptWindow::CAPACITY);
            prop_assert_eq!(progress.band, banks.band_of(progress.fact_id()).unwrap());
        }
    }

    #[test]
    fn classifier_is_deterministic(attempts in arb_attempts()) {
        let mut window = AttemptWindow::new();
        for (i, (correct, ms, _)) in attempts.iter().enumerate() {
            window.push(AttemptRecord::new(i as i64, *correct, *ms, AttemptSource::Practice));
        }
        let params = ClassifierParams::default();
        prop_assert_eq!(classify(&window, 3, &params), classify(&window, 3, &params));
        prop_assert_eq!(trend_of(&window), trend_of(&window));
    }

    #[test]
    fn distribution_respects_capacity_and_accounts_for_everything(
        sizes in arb_band_sizes(),
        week in 0u32..30,
        total in 0usize..120,
    ) {
        let banks = banks_with_sizes(sizes);
        let counts = distribute(&banks, week, total);

        let bank_sizes = banks.band_sizes();
        for (i, count) in counts.counts.iter().enumerate() {
            prop_assert!(*count <= bank_sizes[i]);
        }
        prop_assert_eq!(counts.total() + counts.shortfall, total);
        prop_assert!(counts.total() <= banks.len());
    }

    #[test]
    fn window_evicts_fifo(times in proptest::collection::vec(0i64..100_000, 6..30)) {
        let mut window = AttemptWindow::new();
        for t in &times {
            window.push(AttemptRecord::new(*t, true, 1000, AttemptSource::Practice));
        }
        prop_assert_eq!(window.len(), AttemptWindow::CAPACITY);
        let kept: Vec<i64> = window.iter().map(|a| a.timestamp_ms).collect();
        let expected: Vec<i64> = times[times.len() - 5..].to_vec();
        prop_assert_eq!(kept, expected);
    }
}
