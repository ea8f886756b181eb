//! Fact universe generation.
//!
//! Enumerates the canonical, deduplicated fact set per operation: one
//! representative per commutative pair, trivial facts excluded, exact
//! quotients only. Pure and deterministic so universes are reproducible.

use std::collections::BTreeMap;

use crate::engine::types::{Fact, Operation};

/// Inclusive operand range for generation. Sums are additionally capped at
/// [`SUM_CAP`] for addition and subtraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandBounds {
    pub min: u32,
    pub max: u32,
}

impl OperandBounds {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Conventional bounds for an operation's curriculum.
    pub fn default_for(operation: Operation) -> Self {
        match operation {
            Operation::Addition | Operation::Subtraction => Self::new(2, 20),
            Operation::Multiplication | Operation::Division => Self::new(2, 12),
        }
    }
}

/// Sum ceiling for addition facts and minuend ceiling for subtraction.
pub const SUM_CAP: u32 = 20;

/// Generates the full deduplicated fact universe for `operation` within
/// `bounds`, sorted by canonical id. Same inputs always yield the same set.
pub fn generate(operation: Operation, bounds: OperandBounds) -> Vec<Fact> {
    let mut by_id: BTreeMap<String, Fact> = BTreeMap::new();
    let mut insert = |fact: Fact| {
        by_id.entry(fact.id.clone()).or_insert(fact);
    };

    match operation {
        Operation::Addition => {
            // Operands below 2 are trivial; one representative per pair.
            let min = bounds.min.max(2);
            for a in min..=bounds.max {
                for b in a..=bounds.max {
                    if a + b <= SUM_CAP {
                        insert(Fact::new(operation, a, b));
                    }
                }
            }
        }
        Operation::Subtraction => {
            // Minuend capped like addition sums; self-subtraction excluded.
            let min = bounds.min.max(2);
            let cap = bounds.max.min(SUM_CAP);
            for minuend in min..=cap {
                for subtrahend in min..minuend {
                    insert(Fact::new(operation, minuend, subtrahend));
                }
            }
        }
        Operation::Multiplication => {
            for a in bounds.min..=bounds.max {
                for b in a..=bounds.max {
                    insert(Fact::new(operation, a, b));
                }
            }
        }
        Operation::Division => {
            // Divisor 1 and dividend 0 are trivial; exact quotients only, by
            // construction from (divisor, quotient) pairs.
            let divisor_min = bounds.min.max(2);
            for divisor in divisor_min..=bounds.max {
                for quotient in 1..=bounds.max {
                    insert(Fact::new(operation, divisor * quotient, divisor));
                }
            }
        }
    }

    by_id.into_values().collect()
}

/// Universe under the conventional bounds for `operation`.
pub fn default_universe(operation: Operation) -> Vec<Fact> {
    generate(operation, OperandBounds::default_for(operation))
}
