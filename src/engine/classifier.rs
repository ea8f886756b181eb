//! Proficiency classification over the rolling attempt window.
//!
//! Band placement is driven by correct-count and average correct-response
//! time against the configured cutoffs; the perfect-window mastery rule
//! additionally requires a sustained consecutive-day streak. Classification
//! is recomputed after every attempt, so demotion is an ordinary outcome.

use crate::config::ClassifierParams;
use crate::engine::types::{AttemptWindow, Band, Trend};

pub fn classify(window: &AttemptWindow, streak_days: u32, params: &ClassifierParams) -> Band {
    let total = window.len();
    if total == 0 {
        return Band::DoesNotKnow;
    }

    let correct = window.correct_count();
    // Majority incorrect (ties included) reads as not knowing the fact.
    if correct * 2 <= total {
        return Band::DoesNotKnow;
    }

    let avg_ms = match window.avg_correct_time_ms() {
        Some(avg) => avg,
        None => return Band::DoesNotKnow,
    };

    let fast = avg_ms <= params.fast_ms as f64;

    if window.is_full()
        && correct == total
        && fast
        && streak_days >= params.mastered_min_streak_days
    {
        return Band::Mastered;
    }

    if correct >= params.proficient_min_correct && fast {
        return Band::Proficient;
    }

    if avg_ms > params.slow_ms as f64 {
        Band::Emerging
    } else {
        Band::Approaching
    }
}

/// Compares the newest two attempts against the older remainder of the
/// window. Fewer than two on either side reads as stable.
pub fn trend_of(window: &AttemptWindow) -> Trend {
    let (older, recent) = window.split_recent(2);
    if recent.len() < 2 || older.is_empty() {
        return Trend::Stable;
    }

    let accuracy = |slice: &[&crate::engine::types::AttemptRecord]| {
        slice.iter().filter(|a| a.correct).count() as f64 / slice.len() as f64
    };
    let avg_time = |slice: &[&crate::engine::types::AttemptRecord]| {
        slice.iter().map(|a| a.response_time_ms).sum::<i64>() as f64 / slice.len() as f64
    };

    let recent_acc = accuracy(&recent);
    let older_acc = accuracy(&older);
    if recent_acc > older_acc {
        return Trend::Improving;
    }
    if recent_acc < older_acc {
        return Trend::Declining;
    }

    let recent_ms = avg_time(&recent);
    let older_ms = avg_time(&older);
    if recent_ms < older_ms * 0.9 {
        Trend::Improving
    } else if recent_ms > older_ms * 1.1 {
        Trend::Declining
    } else {
        Trend::Stable
    }
}
