//! Session metrics derived from history.
//!
//! Metrics are recomputed on demand and never stored. Display fields are
//! rounded to whole numbers; [`PreciseMetrics`] keeps full precision.

use serde::{Deserialize, Serialize};

use crate::history::HistoryItem;
use crate::problem::Level;

/// Fast-answer threshold used by [`derive_metrics`].
pub const DEFAULT_FAST_THRESHOLD_MS: u64 = 30_000;

/// Coarse accuracy grade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    /// Below 60%.
    #[default]
    Poor,
    /// 60% and up.
    Ok,
    /// 75% and up.
    Good,
    /// 90% and up.
    Excellent,
}

impl Grade {
    /// Grades an accuracy percentage.
    #[must_use]
    pub fn from_accuracy(accuracy: f64) -> Self {
        if accuracy >= 90.0 {
            Self::Excellent
        } else if accuracy >= 75.0 {
            Self::Good
        } else if accuracy >= 60.0 {
            Self::Ok
        } else {
            Self::Poor
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Poor => "poor",
            Self::Ok => "ok",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-way accuracy band used in summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PerformanceBand {
    /// 90% and up.
    Excellent,
    /// 75% and up.
    Good,
    /// Everything else.
    NeedsWork,
}

impl PerformanceBand {
    /// Bands an accuracy percentage.
    #[must_use]
    pub fn from_accuracy(accuracy: f64) -> Self {
        if accuracy >= 90.0 {
            Self::Excellent
        } else if accuracy >= 75.0 {
            Self::Good
        } else {
            Self::NeedsWork
        }
    }

    /// Kebab-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::NeedsWork => "needs-work",
        }
    }
}

/// Three-way speed band used in summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedBand {
    /// Speed score 70 and up.
    Fast,
    /// Speed score 40 and up.
    Moderate,
    /// Everything else.
    Slow,
}

impl SpeedBand {
    /// Bands a speed score.
    #[must_use]
    pub fn from_speed_score(score: f64) -> Self {
        if score >= 70.0 {
            Self::Fast
        } else if score >= 40.0 {
            Self::Moderate
        } else {
            Self::Slow
        }
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Moderate => "moderate",
            Self::Slow => "slow",
        }
    }
}

/// Accuracy per level, rounded. A level with no attempts reports 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerLevel {
    /// Easy accuracy.
    pub easy: u32,
    /// Medium accuracy.
    pub medium: u32,
    /// Hard accuracy.
    pub hard: u32,
}

impl PerLevel {
    /// Accuracy for `level`.
    #[must_use]
    pub const fn get(&self, level: Level) -> u32 {
        match level {
            Level::Easy => self.easy,
            Level::Medium => self.medium,
            Level::Hard => self.hard,
        }
    }
}

/// Full-precision values behind the rounded display fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreciseMetrics {
    /// Accuracy percentage.
    pub accuracy: f64,
    /// Fast-answer percentage.
    pub fast_rate: f64,
    /// Mean elapsed time in milliseconds.
    pub avg_time_ms: f64,
    /// `max(0, 100 - mean seconds)`.
    pub speed_score: f64,
}

/// Aggregate statistics for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// Number of attempts.
    pub attempts: usize,
    /// Accuracy percentage, rounded.
    pub accuracy: u32,
    /// Percentage of answers at or under the fast threshold, rounded.
    pub fast_rate: u32,
    /// Mean elapsed time in milliseconds, rounded.
    pub avg_time_ms: u64,
    /// Accuracy per level.
    pub per_level: PerLevel,
    /// Trailing run of correct answers.
    pub streak: usize,
    /// Linear speed score in `0..=100`, rounded.
    ///
    /// Saturates at 0 once the mean time reaches 100 seconds and is 100 for
    /// instantaneous answers. It is not a distribution statistic.
    pub speed_score: u32,
    /// Grade from full-precision accuracy.
    pub grade: Grade,
    /// Second half more accurate than the first. `None` below four attempts.
    pub improved: Option<bool>,
    /// Unrounded values.
    pub precise: PreciseMetrics,
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_u32(value: f64) -> u32 {
    value.round().max(0.0) as u32
}

fn accuracy_of<'a>(items: impl IntoIterator<Item = &'a HistoryItem>) -> f64 {
    let (correct, total) = items
        .into_iter()
        .fold((0, 0), |(c, t), h| (c + usize::from(h.correct), t + 1));
    percent(correct, total)
}

/// Derives metrics with the default 30 second fast-answer threshold.
pub fn derive_metrics(history: &[HistoryItem]) -> Metrics {
    derive_metrics_with_threshold(history, DEFAULT_FAST_THRESHOLD_MS)
}

/// Derives metrics using `fast_threshold_ms` for the fast-answer rate.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn derive_metrics_with_threshold(history: &[HistoryItem], fast_threshold_ms: u64) -> Metrics {
    if history.is_empty() {
        return Metrics::default();
    }

    let n = history.len();
    let accuracy = accuracy_of(history);
    let fast = history.iter().filter(|h| h.time_ms <= fast_threshold_ms).count();
    let fast_rate = percent(fast, n);
    let total_ms: u64 = history.iter().map(|h| h.time_ms).sum();
    let avg_time_ms = total_ms as f64 / n as f64;
    let speed_score = (100.0 - avg_time_ms / 1000.0).max(0.0);

    let level_accuracy =
        |level: Level| round_u32(accuracy_of(history.iter().filter(|h| h.level_at_time == level)));
    let per_level = PerLevel {
        easy: level_accuracy(Level::Easy),
        medium: level_accuracy(Level::Medium),
        hard: level_accuracy(Level::Hard),
    };

    let streak = history.iter().rev().take_while(|h| h.correct).count();

    let improved = (n >= 4).then(|| {
        let (first, second) = history.split_at(n / 2);
        accuracy_of(second) > accuracy_of(first)
    });

    Metrics {
        attempts: n,
        accuracy: round_u32(accuracy),
        fast_rate: round_u32(fast_rate),
        avg_time_ms: avg_time_ms.round() as u64,
        per_level,
        streak,
        speed_score: round_u32(speed_score),
        grade: Grade::from_accuracy(accuracy),
        improved,
        precise: PreciseMetrics {
            accuracy,
            fast_rate,
            avg_time_ms,
            speed_score,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::tests::item;

    fn outcomes(results: &[bool]) -> Vec<HistoryItem> {
        results.iter().map(|&c| item(Level::Medium, c, 10_000)).collect()
    }

    #[test]
    fn test_empty_history_is_all_zero() {
        let metrics = derive_metrics(&[]);
        assert_eq!(metrics.accuracy, 0);
        assert_eq!(metrics.fast_rate, 0);
        assert_eq!(metrics.avg_time_ms, 0);
        assert_eq!(metrics.streak, 0);
        assert_eq!(metrics.speed_score, 0);
        assert_eq!(metrics.per_level, PerLevel::default());
        assert_eq!(metrics.grade, Grade::Poor);
        assert_eq!(metrics.improved, None);
    }

    #[test]
    fn test_accuracy_rounds_but_keeps_precision() {
        let metrics = derive_metrics(&outcomes(&[true, true, false]));
        assert_eq!(metrics.accuracy, 67);
        assert!((metrics.precise.accuracy - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.grade, Grade::Ok);
    }

    #[test]
    fn test_grade_uses_unrounded_accuracy() {
        let mut history = outcomes(&[true; 8]);
        history.extend(outcomes(&[false; 1]));
        let mut padded = history.clone();
        padded.extend(outcomes(&[true; 4]));
        // 8/9 = 88.9% rounds to 89 and grades good.
        assert_eq!(derive_metrics(&history).grade, Grade::Good);
        // 12/13 = 92.3%.
        assert_eq!(derive_metrics(&padded).grade, Grade::Excellent);

        // 89.5% would round to 90 for display but is still graded good.
        assert_eq!(Grade::from_accuracy(89.5), Grade::Good);
    }

    #[test]
    fn test_grade_thresholds() {
        assert_eq!(Grade::from_accuracy(90.0), Grade::Excellent);
        assert_eq!(Grade::from_accuracy(75.0), Grade::Good);
        assert_eq!(Grade::from_accuracy(60.0), Grade::Ok);
        assert_eq!(Grade::from_accuracy(59.9), Grade::Poor);
    }

    #[test]
    fn test_fast_rate_threshold_is_inclusive() {
        let history = vec![
            item(Level::Easy, true, 30_000),
            item(Level::Easy, true, 30_001),
        ];
        assert_eq!(derive_metrics(&history).fast_rate, 50);
        assert_eq!(derive_metrics_with_threshold(&history, 40_000).fast_rate, 100);
    }

    #[test]
    fn test_average_time_and_speed_score() {
        let history = vec![item(Level::Easy, true, 10_000), item(Level::Easy, true, 20_000)];
        let metrics = derive_metrics(&history);
        assert_eq!(metrics.avg_time_ms, 15_000);
        assert_eq!(metrics.speed_score, 85);
    }

    #[test]
    fn test_speed_score_saturates_at_zero() {
        let history = vec![item(Level::Easy, true, 250_000)];
        assert_eq!(derive_metrics(&history).speed_score, 0);
    }

    #[test]
    fn test_speed_score_instant_answers() {
        let history = vec![item(Level::Easy, true, 0)];
        assert_eq!(derive_metrics(&history).speed_score, 100);
    }

    #[test]
    fn test_per_level_breakdown() {
        let history = vec![
            item(Level::Easy, true, 1000),
            item(Level::Easy, false, 1000),
            item(Level::Hard, true, 1000),
        ];
        let metrics = derive_metrics(&history);
        assert_eq!(metrics.per_level.easy, 50);
        assert_eq!(metrics.per_level.medium, 0);
        assert_eq!(metrics.per_level.hard, 100);
        assert_eq!(metrics.per_level.get(Level::Hard), 100);
    }

    #[test]
    fn test_streak_counts_only_trailing_run() {
        assert_eq!(derive_metrics(&outcomes(&[true, true, false, true])).streak, 1);
        assert_eq!(derive_metrics(&outcomes(&[false, true, true, true])).streak, 3);
        assert_eq!(derive_metrics(&outcomes(&[true, false])).streak, 0);
    }

    #[test]
    fn test_improvement_needs_four_items() {
        assert_eq!(derive_metrics(&outcomes(&[false, true, true])).improved, None);
    }

    #[test]
    fn test_improvement_second_half_better() {
        let metrics = derive_metrics(&outcomes(&[false, false, true, true]));
        assert_eq!(metrics.improved, Some(true));
    }

    #[test]
    fn test_equal_halves_not_improved() {
        let metrics = derive_metrics(&outcomes(&[true, false, true, false]));
        assert_eq!(metrics.improved, Some(false));
    }

    #[test]
    fn test_odd_length_second_half_gets_extra_item() {
        // first = [F, T] (50%), second = [T, F, T] (66.7%)
        let metrics = derive_metrics(&outcomes(&[false, true, true, false, true]));
        assert_eq!(metrics.improved, Some(true));
    }

    #[test]
    fn test_bands() {
        assert_eq!(PerformanceBand::from_accuracy(90.0), PerformanceBand::Excellent);
        assert_eq!(PerformanceBand::from_accuracy(80.0), PerformanceBand::Good);
        assert_eq!(PerformanceBand::from_accuracy(74.9), PerformanceBand::NeedsWork);
        assert_eq!(SpeedBand::from_speed_score(70.0), SpeedBand::Fast);
        assert_eq!(SpeedBand::from_speed_score(40.0), SpeedBand::Moderate);
        assert_eq!(SpeedBand::from_speed_score(10.0), SpeedBand::Slow);
    }

    #[test]
    fn test_metrics_serialize_camel_case() {
        let json = serde_json::to_value(derive_metrics(&outcomes(&[true]))).unwrap_or_default();
        assert_eq!(json["fastRate"], 100);
        assert_eq!(json["grade"], "excellent");
        assert!(json["improved"].is_null());
    }
}
