use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Addition,
    Subtraction,
    Multiplication,
    Division,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Self::Addition,
        Self::Subtraction,
        Self::Multiplication,
        Self::Division,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Addition => "addition",
            Self::Subtraction => "subtraction",
            Self::Multiplication => "multiplication",
            Self::Division => "division",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Addition => "add",
            Self::Subtraction => "sub",
            Self::Multiplication => "mul",
            Self::Division => "div",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Addition => "+",
            Self::Subtraction => "−",
            Self::Multiplication => "×",
            Self::Division => "÷",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "addition" | "add" => Some(Self::Addition),
            "subtraction" | "sub" => Some(Self::Subtraction),
            "multiplication" | "mul" => Some(Self::Multiplication),
            "division" | "div" => Some(Self::Division),
            _ => None,
        }
    }

    /// Whether operand order is interchangeable (one canonical representative
    /// is kept per pair).
    pub fn commutative(&self) -> bool {
        matches!(self, Self::Addition | Self::Multiplication)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "camelCase")]
pub enum Band {
    #[default]
    DoesNotKnow,
    Emerging,
    Approaching,
    Proficient,
    Mastered,
}

impl Band {
    pub const ALL: [Band; 5] = [
        Self::DoesNotKnow,
        Self::Emerging,
        Self::Approaching,
        Self::Proficient,
        Self::Mastered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DoesNotKnow => "doesNotKnow",
            Self::Emerging => "emerging",
            Self::Approaching => "approaching",
            Self::Proficient => "proficient",
            Self::Mastered => "mastered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "doesNotKnow" => Some(Self::DoesNotKnow),
            "emerging" => Some(Self::Emerging),
            "approaching" => Some(Self::Approaching),
            "proficient" => Some(Self::Proficient),
            "mastered" => Some(Self::Mastered),
            _ => None,
        }
    }

    /// Ordinal position, doesNotKnow lowest.
    pub fn rank(&self) -> u8 {
        match self {
            Self::DoesNotKnow => 0,
            Self::Emerging => 1,
            Self::Approaching => 2,
            Self::Proficient => 3,
            Self::Mastered => 4,
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    #[default]
    Stable,
    Declining,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Declining => "declining",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttemptSource {
    #[default]
    Practice,
    Diagnostic,
    Assessment,
}

/// Difficulty category of a fact within its operation. Drives diagnostic
/// stratification, similarity extrapolation, and sub-level membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    // addition
    SumsTo10,
    Doubles,
    NearDoubles,
    Crossing10,
    SumsTo20,
    // subtraction
    SubWithin10,
    SubFromTeens,
    SubCrossing10,
    // multiplication
    TimesTwoFiveTen,
    Squares,
    TimesCore,
    TimesHard,
    // division
    DivByTwoFiveTen,
    DivByCore,
    DivByHard,
}

impl Category {
    /// Basic categories anchor the placement priority rule: weak accuracy
    /// here forces a foundational level no matter the aggregate score.
    pub fn is_basic(&self) -> bool {
        matches!(
            self,
            Self::SumsTo10 | Self::Doubles | Self::SubWithin10 | Self::TimesTwoFiveTen | Self::DivByTwoFiveTen
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SumsTo10 => "sumsTo10",
            Self::Doubles => "doubles",
            Self::NearDoubles => "nearDoubles",
            Self::Crossing10 => "crossing10",
            Self::SumsTo20 => "sumsTo20",
            Self::SubWithin10 => "subWithin10",
            Self::SubFromTeens => "subFromTeens",
            Self::SubCrossing10 => "subCrossing10",
            Self::TimesTwoFiveTen => "timesTwoFiveTen",
            Self::Squares => "squares",
            Self::TimesCore => "timesCore",
            Self::TimesHard => "timesHard",
            Self::DivByTwoFiveTen => "divByTwoFiveTen",
            Self::DivByCore => "divByCore",
            Self::DivByHard => "divByHard",
        }
    }
}

/// One arithmetic question, shared read-only across learners. Commutative
/// pairs are normalized (`a <= b`) before the id is derived, so 3+5 and 5+3
/// map to the same fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub id: String,
    pub operation: Operation,
    pub a: u32,
    pub b: u32,
    pub answer: u32,
    pub category: Category,
    pub family: String,
}

impl Fact {
    pub fn new(operation: Operation, a: u32, b: u32) -> Self {
        let (a, b) = if operation.commutative() && a > b {
            (b, a)
        } else {
            (a, b)
        };
        let answer = match operation {
            Operation::Addition => a + b,
            Operation::Subtraction => a - b,
            Operation::Multiplication => a * b,
            Operation::Division => a / b,
        };
        let category = categorize(operation, a, b);
        let family = family_of(operation, a, b);
        Self {
            id: format!("{}-{}-{}", operation.code(), a, b),
            operation,
            a,
            b,
            answer,
            category,
            family,
        }
    }

    pub fn display(&self) -> String {
        format!("{} {} {}", self.a, self.operation.symbol(), self.b)
    }
}

fn categorize(operation: Operation, a: u32, b: u32) -> Category {
    match operation {
        Operation::Addition => {
            let sum = a + b;
            if sum <= 10 {
                Category::SumsTo10
            } else if a == b {
                Category::Doubles
            } else if b == a + 1 {
                Category::NearDoubles
            } else if b < 10 {
                Category::Crossing10
            } else {
                Category::SumsTo20
            }
        }
        Operation::Subtraction => {
            if a <= 10 {
                Category::SubWithin10
            } else if b <= a % 10 {
                Category::SubFromTeens
            } else {
                Category::SubCrossing10
            }
        }
        Operation::Multiplication => {
            if [a, b].iter().any(|n| matches!(n, 2 | 5 | 10)) {
                Category::TimesTwoFiveTen
            } else if a == b {
                Category::Squares
            } else if [a, b].iter().any(|n| matches!(n, 3 | 4 | 6)) {
                Category::TimesCore
            } else {
                Category::TimesHard
            }
        }
        Operation::Division => {
            if matches!(b, 2 | 5 | 10) {
                Category::DivByTwoFiveTen
            } else if matches!(b, 3 | 4 | 6) {
                Category::DivByCore
            } else {
                Category::DivByHard
            }
        }
    }
}

/// Fact-family key linking structurally related facts: additions and
/// subtractions over the same total, multiplications and divisions over the
/// same table.
fn family_of(operation: Operation, a: u32, b: u32) -> String {
    match operation {
        Operation::Addition => format!("make{}", a + b),
        Operation::Subtraction => format!("make{a}"),
        Operation::Multiplication => format!("table{}", a.max(b)),
        Operation::Division => format!("table{b}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub timestamp_ms: i64,
    pub correct: bool,
    pub response_time_ms: i64,
    pub source: AttemptSource,
    /// Answer the learner gave, when the consumer reports it. Feeds the
    /// error-pattern tagger on incorrect attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_given: Option<i64>,
}

impl AttemptRecord {
    pub fn new(timestamp_ms: i64, correct: bool, response_time_ms: i64, source: AttemptSource) -> Self {
        Self {
            timestamp_ms,
            correct,
            response_time_ms,
            source,
            answer_given: None,
        }
    }
}

/// Fixed-capacity FIFO window over the most recent attempts at one fact.
/// Oldest entries are evicted once the window holds five.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptWindow {
    attempts: VecDeque<AttemptRecord>,
}

impl AttemptWindow {
    pub const CAPACITY: usize = 5;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: AttemptRecord) {
        self.attempts.push_back(record);
        while self.attempts.len() > Self::CAPACITY {
            self.attempts.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.attempts.len() == Self::CAPACITY
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.attempts.iter()
    }

    pub fn correct_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.correct).count()
    }

    /// Mean response time over correct attempts only; None when none are
    /// correct.
    pub fn avg_correct_time_ms(&self) -> Option<f64> {
        let times: Vec<i64> = self
            .attempts
            .iter()
            .filter(|a| a.correct)
            .map(|a| a.response_time_ms)
            .collect();
        if times.is_empty() {
            return None;
        }
        Some(times.iter().sum::<i64>() as f64 / times.len() as f64)
    }

    /// Splits the window into (older, newest `recent`) for trend analysis.
    pub fn split_recent(&self, recent: usize) -> (Vec<&AttemptRecord>, Vec<&AttemptRecord>) {
        let split = self.attempts.len().saturating_sub(recent);
        let older = self.attempts.iter().take(split).collect();
        let newest = self.attempts.iter().skip(split).collect();
        (older, newest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorPattern {
    OffByOne,
    OperationConfusion,
    Unknown,
}

impl ErrorPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OffByOne => "offByOne",
            Self::OperationConfusion => "operationConfusion",
            Self::Unknown => "unknown",
        }
    }
}

/// Per-learner, per-fact proficiency state. Mutated only through
/// `ProblemBanks::apply_attempt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactProgress {
    pub fact: Fact,
    pub window: AttemptWindow,
    pub band: Band,
    pub trend: Trend,
    pub consecutive_correct_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_correct_date: Option<NaiveDate>,
    /// Start of the current stint in `band`; reset on every transition,
    /// unlike the write-once `band_entered` dates.
    pub current_band_since: NaiveDate,
    pub days_in_band: u32,
    pub total_attempts: u64,
    pub total_correct: u64,
    /// First date each band was entered; write-once per band.
    pub band_entered: BTreeMap<Band, NaiveDate>,
    pub regression_count: u32,
    pub flagged_for_review: bool,
    pub needs_strategy_instruction: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_pattern: Option<ErrorPattern>,
}

impl FactProgress {
    pub fn new(fact: Fact, band: Band, today: NaiveDate) -> Self {
        let mut band_entered = BTreeMap::new();
        band_entered.insert(band, today);
        Self {
            fact,
            window: AttemptWindow::new(),
            band,
            trend: Trend::Stable,
            consecutive_correct_days: 0,
            last_correct_date: None,
            current_band_since: today,
            days_in_band: 0,
            total_attempts: 0,
            total_correct: 0,
            band_entered,
            regression_count: 0,
            flagged_for_review: false,
            needs_strategy_instruction: false,
            error_pattern: None,
        }
    }

    pub fn fact_id(&self) -> &str {
        &self.fact.id
    }

    pub fn accuracy(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        self.total_correct as f64 / self.total_attempts as f64
    }
}
