//! Weak-area and insight analysis over a session's attempts.

use quotient_engine::Topic;
use serde::{Deserialize, Serialize};

use crate::Attempt;

/// Topics listed at most in the weak-area summary.
const MAX_WEAK_AREAS: usize = 3;

const NO_DATA: &str = "No data available for analysis";
const NO_WEAK_AREAS: &str = "No major weak areas detected - great job!";
const GENERIC_WEAK_AREAS: [&str; 2] = ["Focus on accuracy over speed", "Review basic fraction concepts"];

/// Strengths and improvement suggestions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insights {
    /// What went well.
    pub strengths: Vec<String>,
    /// What to work on.
    pub improvements: Vec<String>,
}

/// Topics ranked by how many wrong answers they account for.
///
/// Ties keep the order in which the topics first went wrong. When fewer than
/// two topics are listed, two generic suggestions are appended.
#[must_use]
pub fn weak_areas(attempts: &[Attempt]) -> Vec<String> {
    if attempts.is_empty() {
        return vec![NO_DATA.to_string()];
    }

    let mut errors: Vec<(Topic, usize)> = Vec::new();
    for attempt in attempts.iter().filter(|a| !a.item.correct) {
        match errors.iter_mut().find(|(topic, _)| *topic == attempt.topic) {
            Some((_, count)) => *count += 1,
            None => errors.push((attempt.topic, 1)),
        }
    }
    let total_wrong: usize = errors.iter().map(|(_, count)| count).sum();
    if total_wrong == 0 {
        return vec![NO_WEAK_AREAS.to_string()];
    }

    errors.sort_by(|a, b| b.1.cmp(&a.1));
    let mut areas: Vec<String> = errors
        .iter()
        .take(MAX_WEAK_AREAS)
        .map(|(topic, count)| {
            format!(
                "{} problems ({}% of errors)",
                topic.display_name(),
                percent(*count, total_wrong).round()
            )
        })
        .collect();

    if areas.len() < 2 {
        areas.extend(GENERIC_WEAK_AREAS.iter().map(ToString::to_string));
    }
    areas
}

/// Strengths and improvements from accuracy, mean time and hint usage.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn insights(attempts: &[Attempt]) -> Insights {
    if attempts.is_empty() {
        return Insights {
            strengths: Vec::new(),
            improvements: vec![
                "Start practicing to see your strengths and areas for improvement".to_string(),
            ],
        };
    }

    let n = attempts.len();
    let correct = attempts.iter().filter(|a| a.item.correct).count();
    let hinted = attempts.iter().filter(|a| a.item.used_hint).count();
    let accuracy = percent(correct, n);
    let hint_rate = percent(hinted, n);
    let mean_ms = attempts.iter().map(|a| a.item.time_ms).sum::<u64>() as f64 / n as f64;

    let mut strengths = Vec::new();
    if accuracy >= 80.0 {
        strengths.push("High accuracy rate".to_string());
    }
    if mean_ms < 30_000.0 {
        strengths.push("Good problem-solving speed".to_string());
    }
    if hint_rate < 30.0 {
        strengths.push("Independent problem solving".to_string());
    }
    if strengths.is_empty() {
        strengths.push("Consistent effort in practice".to_string());
    }

    let mut improvements = Vec::new();
    if accuracy < 70.0 {
        improvements.push("Focus on accuracy over speed".to_string());
    }
    if mean_ms > 60_000.0 {
        improvements.push("Work on problem-solving speed".to_string());
    }
    if hint_rate > 50.0 {
        improvements.push("Try solving more problems without hints".to_string());
    }
    if improvements.is_empty() {
        improvements.push("Keep practicing to maintain your skills".to_string());
    }

    Insights {
        strengths,
        improvements,
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}
